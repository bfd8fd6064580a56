use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::backend::VideoProcessor;
use crate::config::Settings;
use crate::host::HostPage;
use crate::models::{DerivedVideo, VideoFragment};
use crate::protocol::{BridgeMessage, CoordinatorMessage, RelayError};

use super::derive;

/// The context bridge: the one component with a line to both the page and
/// the coordinator. It relays observer pushes, independently re-derives
/// video identity from the visible address as a redundancy path, and serves
/// popup requests. Nothing it holds is authoritative; it can be torn down
/// and restarted at any time.
pub async fn bridge_loop(
    page: HostPage,
    mut observer_rx: mpsc::UnboundedReceiver<VideoFragment>,
    mut requests_rx: mpsc::UnboundedReceiver<BridgeMessage>,
    coordinator_tx: mpsc::UnboundedSender<CoordinatorMessage>,
    processor: Arc<dyn VideoProcessor>,
    settings: Settings,
    cancel: CancellationToken,
) {
    let mut url_rx = page.subscribe_url();
    let mut last_forwarded: Option<String> = None;
    let processing = Arc::new(AtomicBool::new(false));

    info!("context bridge started for tab {}", page.tab_id());

    // Initial pass so a bridge (re)loaded mid-session picks up the page it
    // landed on. Detection only: removal is reserved for observed
    // navigations, otherwise a fresh bridge on a blank page would wipe a
    // record that is still valid.
    {
        let snapshot = page.snapshot();
        if derive::is_watch_page(&snapshot.url) {
            if let Some(video) = derive::derive(&snapshot.url, snapshot.heading.as_deref()) {
                forward_detection(&page, video, &mut last_forwarded, &coordinator_tx);
            }
        }
    }

    // Pending settle window after a navigation. Modeled as a deadline
    // selected alongside the other branches so requests keep being served
    // while the page settles; a newer navigation resets the deadline.
    let mut settle_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("context bridge shutting down");
                break;
            }
            changed = url_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                settle_deadline = Some(Instant::now() + settings.settle_delay());
            }
            _ = settle_elapsed(settle_deadline), if settle_deadline.is_some() => {
                settle_deadline = None;
                handle_address_change(&page, &mut last_forwarded, &coordinator_tx);
            }
            fragment = observer_rx.recv() => {
                let Some(fragment) = fragment else { break };
                handle_observer_push(&page, fragment, &mut last_forwarded, &coordinator_tx);
            }
            request = requests_rx.recv() => {
                let Some(request) = request else { break };
                debug!("bridge request: {}", request.kind());
                handle_request(&page, request, &processing, &processor);
            }
        }
    }
}

async fn settle_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Independent detection path: re-derive from the visible address and DOM,
/// forward only when the id actually changed, and signal removal whenever
/// navigation leaves the watch path.
fn handle_address_change(
    page: &HostPage,
    last_forwarded: &mut Option<String>,
    coordinator_tx: &mpsc::UnboundedSender<CoordinatorMessage>,
) {
    let snapshot = page.snapshot();

    if derive::is_watch_page(&snapshot.url) {
        let Some(video) = derive::derive(&snapshot.url, snapshot.heading.as_deref()) else {
            return;
        };
        forward_detection(page, video, last_forwarded, coordinator_tx);
    } else {
        *last_forwarded = None;
        if coordinator_tx
            .send(CoordinatorMessage::VideoRemoved {
                tab_id: page.tab_id(),
            })
            .is_err()
        {
            warn!("coordinator unreachable, dropping VIDEO_REMOVED");
        }
    }
}

/// Observer pushes carry host-internal metadata the address path cannot see;
/// fill in anything the fragment is missing from the visible page.
fn handle_observer_push(
    page: &HostPage,
    fragment: VideoFragment,
    last_forwarded: &mut Option<String>,
    coordinator_tx: &mpsc::UnboundedSender<CoordinatorMessage>,
) {
    let snapshot = page.snapshot();
    let title = fragment
        .title
        .or(snapshot.heading)
        .unwrap_or_else(|| "Unknown Video".to_string());

    let video = DerivedVideo {
        video_id: fragment.video_id,
        title,
        url: snapshot.url,
    };
    forward_detection(page, video, last_forwarded, coordinator_tx);
}

fn forward_detection(
    page: &HostPage,
    video: DerivedVideo,
    last_forwarded: &mut Option<String>,
    coordinator_tx: &mpsc::UnboundedSender<CoordinatorMessage>,
) {
    if last_forwarded.as_deref() == Some(video.video_id.as_str()) {
        return;
    }

    *last_forwarded = Some(video.video_id.clone());
    info!("forwarding VIDEO_DETECTED for {}", video.video_id);

    if coordinator_tx
        .send(CoordinatorMessage::VideoDetected {
            video,
            tab_id: page.tab_id(),
        })
        .is_err()
    {
        warn!("coordinator unreachable, dropping VIDEO_DETECTED");
    }
}

fn handle_request(
    page: &HostPage,
    request: BridgeMessage,
    processing: &Arc<AtomicBool>,
    processor: &Arc<dyn VideoProcessor>,
) {
    match request {
        BridgeMessage::GetCurrentVideo { reply } => {
            let snapshot = page.snapshot();
            let result = derive::derive(&snapshot.url, snapshot.heading.as_deref())
                .ok_or(RelayError::NoVideoOnPage);
            let _ = reply.send(result);
        }
        BridgeMessage::ProcessVideo { reply } => {
            // Single-flight per tab: a second request fails immediately
            // instead of queuing behind the first.
            if processing.swap(true, Ordering::SeqCst) {
                let _ = reply.send(Err(RelayError::AlreadyProcessing));
                return;
            }

            let snapshot = page.snapshot();
            let Some(video) = derive::derive(&snapshot.url, snapshot.heading.as_deref()) else {
                processing.store(false, Ordering::SeqCst);
                let _ = reply.send(Err(RelayError::NoVideoOnPage));
                return;
            };

            let processing = Arc::clone(processing);
            let processor = Arc::clone(processor);
            tokio::spawn(async move {
                let result = processor
                    .process(&video.video_id)
                    .await
                    .map_err(|err| RelayError::Backend(err.to_string()));

                // The guard clears on every outcome; a dropped caller just
                // means the reply is undeliverable.
                processing.store(false, Ordering::SeqCst);
                let _ = reply.send(result);
            });
        }
    }
}
