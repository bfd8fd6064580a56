use std::sync::OnceLock;

use regex::Regex;

use crate::models::DerivedVideo;

/// Fallback title when the DOM has no rendered heading yet.
const UNKNOWN_TITLE: &str = "Unknown Video";

fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[?&]v=([^&#]+)").expect("video id pattern is valid"))
}

pub fn extract_video_id(url: &str) -> Option<String> {
    video_id_pattern()
        .captures(url)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Recognized video pages are exactly the `/watch` path.
pub fn is_watch_page(url: &str) -> bool {
    path_of(url) == "/watch"
}

fn path_of(url: &str) -> &str {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let path_start = match without_scheme.find('/') {
        Some(idx) => &without_scheme[idx..],
        None => return "/",
    };
    let end = path_start
        .find(['?', '#'])
        .unwrap_or(path_start.len());
    &path_start[..end]
}

/// Re-derive video identity from the visible address and DOM alone. This is
/// the bridge's redundancy path: it needs no access to host-internal state.
pub fn derive(url: &str, heading: Option<&str>) -> Option<DerivedVideo> {
    if !is_watch_page(url) {
        return None;
    }

    let video_id = extract_video_id(url)?;
    let title = heading
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();

    Some(DerivedVideo {
        video_id,
        title,
        url: url.to_string(),
    })
}
