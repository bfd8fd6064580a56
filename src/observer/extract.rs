use serde_json::Value;

use crate::host::PageState;
use crate::models::VideoFragment;

/// Extract a video fragment from the host page's internal state. Strategies
/// run in priority order: internal player config, embedded initial data,
/// address query parameter. The host structures are third-party and
/// unversioned, so every strategy fails closed on a shape mismatch.
pub fn detect(page: &PageState) -> Option<VideoFragment> {
    from_player_config(page)
        .or_else(|| from_initial_data(page))
        .or_else(|| from_address(page))
}

fn from_player_config(page: &PageState) -> Option<VideoFragment> {
    let args = page.player_config.as_ref()?.get("args")?;
    let video_id = non_empty(args.get("video_id")?.as_str()?)?;

    Some(VideoFragment {
        video_id: video_id.to_string(),
        title: args
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string),
        duration_secs: duration_from(args.get("length_seconds")),
        view_count: None,
    })
}

/// The initial-data structure carries title and view count but no id of its
/// own; the id is taken from the address, so this strategy only fires on a
/// recognizable watch url.
fn from_initial_data(page: &PageState) -> Option<VideoFragment> {
    let info = page.initial_data.as_ref()?.pointer(
        "/contents/twoColumnWatchNextResults/results/results/contents/0/videoPrimaryInfoRenderer",
    )?;
    let video_id = address_video_id(&page.url)?;

    Some(VideoFragment {
        video_id,
        title: info
            .pointer("/title/runs/0/text")
            .and_then(Value::as_str)
            .map(str::to_string),
        duration_secs: None,
        view_count: info
            .pointer("/viewCount/videoViewCountRenderer/viewCount/simpleText")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn from_address(page: &PageState) -> Option<VideoFragment> {
    address_video_id(&page.url).map(|video_id| VideoFragment {
        video_id,
        ..VideoFragment::default()
    })
}

/// Pull the `v` query parameter out of an address.
pub fn address_video_id(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "v")
        .and_then(|(_, value)| non_empty(value))
        .map(str::to_string)
}

/// The host occasionally reports numeric fields as strings.
fn duration_from(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
