use tokio::sync::oneshot;

use crate::models::{DerivedVideo, TabId, VideoContext, VideoFragment};

/// Failure replies that cross a context boundary. These are structured and
/// recoverable; none of them should ever take down a long-lived context.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    /// The coordinator has no stored video to chat about.
    #[error("No video detected. Please go to a YouTube video first.")]
    NoStoredVideo,
    /// The bridge could not derive a video from the visible page.
    #[error("No video detected")]
    NoVideoOnPage,
    /// A second PROCESS_VIDEO arrived while one was still outstanding.
    #[error("Already processing a video")]
    AlreadyProcessing,
    /// The send had no live context to answer it. Distinct from an explicit
    /// error reply: the receiving context was torn down.
    #[error("{0} context is unreachable")]
    ContextUnreachable(&'static str),
    #[error("{0}")]
    Backend(String),
}

/// Messages accepted by the coordinator. Variants that expect a reply carry
/// the `oneshot::Sender` in their payload; fire-and-forget variants do not.
#[derive(Debug)]
pub enum CoordinatorMessage {
    VideoDetected {
        video: DerivedVideo,
        tab_id: TabId,
    },
    VideoRemoved {
        tab_id: TabId,
    },
    /// A tab finished navigating. Defensive badge cleanup, independent of
    /// explicit VideoRemoved signals.
    TabNavigated {
        tab_id: TabId,
        url: String,
    },
    GetVideoData {
        reply: oneshot::Sender<Option<VideoContext>>,
    },
    Chat {
        message: String,
        video_id: String,
        reply: oneshot::Sender<Result<String, RelayError>>,
    },
}

impl CoordinatorMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorMessage::VideoDetected { .. } => "VIDEO_DETECTED",
            CoordinatorMessage::VideoRemoved { .. } => "VIDEO_REMOVED",
            CoordinatorMessage::TabNavigated { .. } => "TAB_NAVIGATED",
            CoordinatorMessage::GetVideoData { .. } => "GET_VIDEO_DATA",
            CoordinatorMessage::Chat { .. } => "CHAT_MESSAGE",
        }
    }
}

/// Requests served by the context bridge.
#[derive(Debug)]
pub enum BridgeMessage {
    /// Synchronous re-derivation from the visible page, answered immediately.
    GetCurrentVideo {
        reply: oneshot::Sender<Result<DerivedVideo, RelayError>>,
    },
    /// Long-running, single-flight per tab. A second request while one is
    /// outstanding fails immediately rather than queuing.
    ProcessVideo {
        reply: oneshot::Sender<Result<String, RelayError>>,
    },
}

impl BridgeMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::GetCurrentVideo { .. } => "GET_CURRENT_VIDEO",
            BridgeMessage::ProcessVideo { .. } => "PROCESS_VIDEO",
        }
    }
}

/// Requests served by the page observer.
#[derive(Debug)]
pub enum ObserverMessage {
    /// Guaranteed-fresh read: re-runs detection on demand instead of waiting
    /// for the next push.
    GetCurrent {
        reply: oneshot::Sender<Option<VideoFragment>>,
    },
}

impl ObserverMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ObserverMessage::GetCurrent { .. } => "GET_CURRENT",
        }
    }
}
