use chrono::Utc;
use log::{info, warn};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::models::{ChatMessage, ChatRole, DerivedVideo, VideoContext};
use crate::protocol::{BridgeMessage, CoordinatorMessage, RelayError};

pub const EMPTY_TRANSCRIPT_HINT: &str = "Ask questions about this video!";
pub const PENDING_INDICATOR: &str = "Thinking...";
pub const NAVIGATE_PROMPT: &str = "Please navigate to a YouTube video first.";
pub const REFRESH_PROMPT: &str = "Please refresh the YouTube page and try again.";
pub const READY_STATUS: &str = "Video loaded! Ready to chat.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub level: StatusLevel,
}

/// Chat state owned by one popup opening. Never persisted; discarded and
/// recreated empty whenever the displayed video changes.
#[derive(Debug, Default)]
pub struct ChatSession {
    pub video_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub in_flight: bool,
}

impl ChatSession {
    fn for_video(video_id: &str) -> Self {
        Self {
            video_id: Some(video_id.to_string()),
            messages: Vec::new(),
            in_flight: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Dispatched,
    IgnoredEmpty,
    IgnoredBusy,
    IgnoredNoVideo,
}

/// Ephemeral chat front end. Queries the coordinator for the current video,
/// falling back to a live read from the bridge, and owns the transcript and
/// input gating for the active session.
pub struct Popup {
    session_id: String,
    coordinator_tx: mpsc::UnboundedSender<CoordinatorMessage>,
    bridge_tx: mpsc::UnboundedSender<BridgeMessage>,
    video: Option<VideoContext>,
    session: ChatSession,
    pending_reply: Option<oneshot::Receiver<Result<String, RelayError>>>,
    input_enabled: bool,
    status: Option<StatusLine>,
}

impl Popup {
    pub fn new(
        coordinator_tx: mpsc::UnboundedSender<CoordinatorMessage>,
        bridge_tx: mpsc::UnboundedSender<BridgeMessage>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            coordinator_tx,
            bridge_tx,
            video: None,
            session: ChatSession::default(),
            pending_reply: None,
            input_enabled: false,
            status: None,
        }
    }

    /// Load the current video: stored record first, live bridge read as the
    /// fallback, disabled "navigate to a video" state when both fail.
    pub async fn open(&mut self) {
        info!("popup session {} opening", self.session_id);

        match self.query_coordinator().await {
            Ok(Some(context)) => self.display_video(context),
            Ok(None) | Err(_) => match self.query_bridge().await {
                Ok(derived) => {
                    self.display_video(VideoContext::from_derived(derived, Utc::now()))
                }
                Err(err) => {
                    warn!("no current video available: {err}");
                    // An unreachable bridge is not the same as a non-video
                    // tab: reloading the page restores the former.
                    let text = match err {
                        RelayError::ContextUnreachable(_) => REFRESH_PROMPT,
                        _ => NAVIGATE_PROMPT,
                    };
                    self.video = None;
                    self.input_enabled = false;
                    self.status = Some(StatusLine {
                        text: text.to_string(),
                        level: StatusLevel::Error,
                    });
                }
            },
        }
    }

    async fn query_coordinator(&self) -> Result<Option<VideoContext>, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.coordinator_tx
            .send(CoordinatorMessage::GetVideoData { reply: reply_tx })
            .map_err(|_| RelayError::ContextUnreachable("coordinator"))?;
        reply_rx
            .await
            .map_err(|_| RelayError::ContextUnreachable("coordinator"))
    }

    async fn query_bridge(&self) -> Result<DerivedVideo, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.bridge_tx
            .send(BridgeMessage::GetCurrentVideo { reply: reply_tx })
            .map_err(|_| RelayError::ContextUnreachable("bridge"))?;
        reply_rx
            .await
            .map_err(|_| RelayError::ContextUnreachable("bridge"))?
    }

    fn display_video(&mut self, context: VideoContext) {
        // A different video means a fresh session; the transcript must be
        // empty before anything new is appended.
        if self.session.video_id.as_deref() != Some(context.video_id.as_str()) {
            self.session = ChatSession::for_video(&context.video_id);
        }

        self.input_enabled = true;
        self.status = Some(StatusLine {
            text: READY_STATUS.to_string(),
            level: StatusLevel::Success,
        });
        self.video = Some(context);
    }

    /// Dispatch a question. Empty input and in-flight sessions are no-ops;
    /// the transcript is untouched in both cases.
    pub fn send_message(&mut self, question: &str) -> SendOutcome {
        let question = question.trim().to_string();
        if question.is_empty() {
            return SendOutcome::IgnoredEmpty;
        }
        if self.session.in_flight {
            return SendOutcome::IgnoredBusy;
        }
        let Some(video) = self.video.clone() else {
            return SendOutcome::IgnoredNoVideo;
        };

        self.session
            .messages
            .push(ChatMessage::new(question.clone(), ChatRole::User));
        self.session.in_flight = true;
        self.input_enabled = false;

        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.coordinator_tx.send(CoordinatorMessage::Chat {
            message: question,
            video_id: video.video_id,
            reply: reply_tx,
        });

        match sent {
            Ok(()) => self.pending_reply = Some(reply_rx),
            Err(_) => self.finish_with(Err(RelayError::ContextUnreachable("coordinator"))),
        }

        SendOutcome::Dispatched
    }

    /// Resolve the outstanding chat request, if any. A dropped reply channel
    /// is a distinct failure from an explicit error payload, but both land in
    /// the transcript the same way: as an inline error message.
    pub async fn await_reply(&mut self) {
        let Some(reply_rx) = self.pending_reply.take() else {
            return;
        };

        let result = match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(RelayError::ContextUnreachable("coordinator")),
        };
        self.finish_with(result);
    }

    fn finish_with(&mut self, result: Result<String, RelayError>) {
        self.pending_reply = None;
        self.session.in_flight = false;
        self.input_enabled = true;

        let content = match result {
            Ok(text) => text,
            Err(err) => format!("Sorry, I encountered an error: {err}"),
        };
        self.session
            .messages
            .push(ChatMessage::new(content, ChatRole::Assistant));
    }

    /// Convenience wrapper: dispatch and wait for the reply.
    pub async fn ask(&mut self, question: &str) -> SendOutcome {
        let outcome = self.send_message(question);
        if outcome == SendOutcome::Dispatched {
            self.await_reply().await;
        }
        outcome
    }

    /// Kick off transcript processing for the current video on the bridge.
    pub async fn process_video(&mut self) -> Result<String, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.bridge_tx
            .send(BridgeMessage::ProcessVideo { reply: reply_tx })
            .map_err(|_| RelayError::ContextUnreachable("bridge"))?;
        reply_rx
            .await
            .map_err(|_| RelayError::ContextUnreachable("bridge"))?
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.session.messages
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn in_flight(&self) -> bool {
        self.session.in_flight
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn status(&self) -> Option<&StatusLine> {
        self.status.as_ref()
    }

    pub fn current_video(&self) -> Option<&VideoContext> {
        self.video.as_ref()
    }

    /// The transcript as displayed: placeholder while empty, pending
    /// indicator while a request is outstanding.
    pub fn rendered_lines(&self) -> Vec<String> {
        if self.session.messages.is_empty() && !self.session.in_flight {
            return vec![EMPTY_TRANSCRIPT_HINT.to_string()];
        }

        let mut lines: Vec<String> = self
            .session
            .messages
            .iter()
            .map(|message| format!("[{}] {}", message.role.as_str(), message.content))
            .collect();

        if self.session.in_flight {
            lines.push(PENDING_INDICATOR.to_string());
        }
        lines
    }
}
