use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::host::HostPage;
use crate::models::VideoFragment;
use crate::protocol::ObserverMessage;

use super::extract;

/// Watches the host page's internal state for video changes. Two producers
/// feed the same check: address-change notifications (after a settle delay,
/// so the single-page-app navigation can finish updating internal state) and
/// a periodic fallback poll for navigations that never touch the address.
pub async fn observer_loop(
    page: HostPage,
    events_tx: mpsc::UnboundedSender<VideoFragment>,
    mut requests_rx: mpsc::UnboundedReceiver<ObserverMessage>,
    settings: Settings,
    cancel: CancellationToken,
) {
    let mut url_rx = page.subscribe_url();
    let mut last_seen: Option<String> = None;

    let mut poll = interval_at(
        Instant::now() + settings.initial_poll_delay(),
        settings.poll_interval(),
    );
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("page observer started for tab {}", page.tab_id());

    // Pending settle window after a navigation, selected alongside the other
    // branches so pulls keep being answered while the page settles.
    let mut settle_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("page observer shutting down");
                break;
            }
            changed = url_rx.changed() => {
                if changed.is_err() {
                    // The page handle is gone; nothing left to observe.
                    break;
                }
                settle_deadline = Some(Instant::now() + settings.settle_delay());
            }
            _ = settle_elapsed(settle_deadline), if settle_deadline.is_some() => {
                settle_deadline = None;
                check_for_video_change(&page, &mut last_seen, &events_tx);
            }
            _ = poll.tick() => {
                check_for_video_change(&page, &mut last_seen, &events_tx);
            }
            request = requests_rx.recv() => {
                let Some(request) = request else { break };
                debug!("observer request: {}", request.kind());
                match request {
                    ObserverMessage::GetCurrent { reply } => {
                        let _ = reply.send(extract::detect(&page.snapshot()));
                    }
                }
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

/// Idempotent: re-running with no underlying page change emits nothing.
fn check_for_video_change(
    page: &HostPage,
    last_seen: &mut Option<String>,
    events_tx: &mpsc::UnboundedSender<VideoFragment>,
) {
    // A detection miss is an absent video, not an error.
    let Some(fragment) = extract::detect(&page.snapshot()) else {
        return;
    };

    if last_seen.as_deref() == Some(fragment.video_id.as_str()) {
        return;
    }

    *last_seen = Some(fragment.video_id.clone());
    info!("video change detected: {}", fragment.video_id);
    let _ = events_tx.send(fragment);
}
