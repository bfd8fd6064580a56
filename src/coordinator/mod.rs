use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{debug, error, info};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::AnswerBackend;
use crate::models::{TabId, VideoContext};
use crate::protocol::{CoordinatorMessage, RelayError};
use crate::store::VideoStore;

pub mod badge;

use badge::BadgeRegistry;

/// Owns the coordinator task. The host environment can recycle the task at
/// will: `stop` parks the inbox receiver so a later `start` resumes on the
/// same message port, with in-memory state gone and durable storage as the
/// only continuity. That is the contract the loop is written against.
pub struct CoordinatorController {
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
    parked_rx: Option<mpsc::UnboundedReceiver<CoordinatorMessage>>,
    handle: Option<JoinHandle<mpsc::UnboundedReceiver<CoordinatorMessage>>>,
    cancel_token: Option<CancellationToken>,
    badges: Arc<Mutex<BadgeRegistry>>,
    store: VideoStore,
    backend: Arc<dyn AnswerBackend>,
}

impl CoordinatorController {
    pub fn new(store: VideoStore, backend: Arc<dyn AnswerBackend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            parked_rx: Some(rx),
            handle: None,
            cancel_token: None,
            badges: Arc::new(Mutex::new(BadgeRegistry::new())),
            store,
            backend,
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<CoordinatorMessage> {
        self.tx.clone()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            bail!("coordinator already active");
        }

        let rx = self
            .parked_rx
            .take()
            .context("coordinator inbox is not parked")?;

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(coordinator_loop(
            rx,
            self.store.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.badges),
            token_clone,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            let rx = handle
                .await
                .context("coordinator loop task failed to join")?;
            self.parked_rx = Some(rx);
        }
        Ok(())
    }

    pub async fn badge_is_set(&self, tab_id: TabId) -> bool {
        self.badges.lock().await.is_present(tab_id)
    }

    pub async fn badge_text(&self, tab_id: TabId) -> &'static str {
        self.badges.lock().await.text(tab_id)
    }
}

/// Single inbox, applied in arrival order; nothing is reordered. The loop
/// treats itself as stateless between messages: every operation re-reads
/// authoritative state from storage, with the in-memory copy serving only as
/// a fallback when a storage read fails.
async fn coordinator_loop(
    mut rx: mpsc::UnboundedReceiver<CoordinatorMessage>,
    store: VideoStore,
    backend: Arc<dyn AnswerBackend>,
    badges: Arc<Mutex<BadgeRegistry>>,
    cancel: CancellationToken,
) -> mpsc::UnboundedReceiver<CoordinatorMessage> {
    let mut cached: Option<VideoContext> = match store.get_current_video().await {
        Ok(context) => {
            if let Some(ref context) = context {
                info!("recovered stored video {} on startup", context.video_id);
            }
            context
        }
        Err(err) => {
            error!("failed to read stored video on startup: {err:?}");
            None
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("coordinator shutting down");
                break;
            }
            message = rx.recv() => {
                let Some(message) = message else { break };
                debug!("coordinator message: {}", message.kind());
                handle_message(message, &store, &backend, &badges, &mut cached).await;
            }
        }
    }

    rx
}

async fn handle_message(
    message: CoordinatorMessage,
    store: &VideoStore,
    backend: &Arc<dyn AnswerBackend>,
    badges: &Arc<Mutex<BadgeRegistry>>,
    cached: &mut Option<VideoContext>,
) {
    match message {
        CoordinatorMessage::VideoDetected { video, tab_id } => {
            // Two detection paths feed this inbox; dedup against the
            // authoritative record, not against which path spoke last.
            let stored = read_current(store, cached).await;
            if stored.as_ref().map(|c| c.video_id.as_str()) == Some(video.video_id.as_str()) {
                debug!("duplicate detection of {}, no-op", video.video_id);
                return;
            }

            let context = VideoContext::from_derived(video, Utc::now());
            if let Err(err) = store.set_current_video(&context).await {
                error!("failed to persist video context: {err:?}");
            }
            badges.lock().await.set_present(tab_id);
            info!(
                "video detected: {} ({})",
                context.video_id, context.video_title
            );
            *cached = Some(context);
        }
        CoordinatorMessage::VideoRemoved { tab_id } => {
            if let Err(err) = store.clear_current_video().await {
                error!("failed to clear video context: {err:?}");
            }
            badges.lock().await.clear(tab_id);
            *cached = None;
        }
        CoordinatorMessage::TabNavigated { tab_id, url } => {
            // Guard against missed VIDEO_REMOVED messages.
            if !url.contains("youtube.com/watch") {
                badges.lock().await.clear(tab_id);
            }
        }
        CoordinatorMessage::GetVideoData { reply } => {
            let _ = reply.send(read_current(store, cached).await);
        }
        CoordinatorMessage::Chat {
            message,
            video_id: _,
            reply,
        } => {
            // The stored record is authoritative; the id the popup supplies
            // is only a hint of what it thinks it is showing.
            let _ = reply.send(answer_chat(&message, store, backend, cached).await);
        }
    }
}

async fn read_current(store: &VideoStore, cached: &Option<VideoContext>) -> Option<VideoContext> {
    match store.get_current_video().await {
        Ok(context) => context,
        Err(err) => {
            error!("failed to read stored video: {err:?}");
            cached.clone()
        }
    }
}

async fn answer_chat(
    question: &str,
    store: &VideoStore,
    backend: &Arc<dyn AnswerBackend>,
    cached: &Option<VideoContext>,
) -> Result<String, RelayError> {
    let Some(context) = read_current(store, cached).await else {
        return Err(RelayError::NoStoredVideo);
    };

    info!(
        "relaying question for video {}: {}",
        context.video_id, question
    );

    backend
        .ask(&context.video_id, question)
        .await
        .map_err(|err| RelayError::Backend(err.to_string()))
}
