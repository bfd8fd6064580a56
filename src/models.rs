use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tab identifier assigned by the hosting browser.
pub type TabId = u32;

/// The current video's identity record. Exactly one of these is "current"
/// system-wide at any time, or none. Owned by the coordinator and mirrored
/// to durable storage; everything else holds transient copies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoContext {
    pub video_id: String,
    pub video_title: String,
    pub url: String,
    pub detected_at: DateTime<Utc>,
}

impl VideoContext {
    pub fn from_derived(video: DerivedVideo, detected_at: DateTime<Utc>) -> Self {
        Self {
            video_id: video.video_id,
            video_title: video.title,
            url: video.url,
            detected_at,
        }
    }
}

/// What the page observer can pull out of the host page's internal state.
/// Only `video_id` is guaranteed; the rest depends on which extraction
/// strategy produced the fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoFragment {
    pub video_id: String,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
    pub view_count: Option<String>,
}

/// Video identity re-derived from the visible address and DOM, as forwarded
/// by the context bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedVideo {
    pub video_id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    pub role: ChatRole,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(content: impl Into<String>, role: ChatRole) -> Self {
        Self {
            content: content.into(),
            role,
            sent_at: Utc::now(),
        }
    }
}
