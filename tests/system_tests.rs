use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};

use tubechat::backend::{AnswerBackend, BackendError, VideoProcessor};
use tubechat::config::Settings;
use tubechat::host::HostPage;
use tubechat::models::{DerivedVideo, VideoContext};
use tubechat::observer::ObserverController;
use tubechat::protocol::{BridgeMessage, CoordinatorMessage, ObserverMessage, RelayError};
use tubechat::runtime::Runtime;
use tubechat::store::VideoStore;

/// Backend double that counts calls and answers deterministically, with an
/// optional artificial latency on processing.
struct RecordingBackend {
    asks: AtomicUsize,
    processes: AtomicUsize,
    process_delay: Duration,
}

impl RecordingBackend {
    fn new() -> Self {
        Self::with_process_delay(Duration::from_millis(0))
    }

    fn with_process_delay(process_delay: Duration) -> Self {
        Self {
            asks: AtomicUsize::new(0),
            processes: AtomicUsize::new(0),
            process_delay,
        }
    }
}

#[async_trait]
impl AnswerBackend for RecordingBackend {
    async fn ask(&self, video_id: &str, question: &str) -> Result<String, BackendError> {
        self.asks.fetch_add(1, Ordering::SeqCst);
        Ok(format!("answer for {video_id}: {question}"))
    }
}

#[async_trait]
impl VideoProcessor for RecordingBackend {
    async fn process(&self, video_id: &str) -> Result<String, BackendError> {
        self.processes.fetch_add(1, Ordering::SeqCst);
        sleep(self.process_delay).await;
        let _ = video_id;
        Ok("Video processed successfully".to_string())
    }
}

struct Fixture {
    runtime: Runtime,
    store: VideoStore,
    backend: Arc<RecordingBackend>,
    _dir: TempDir,
}

fn start_fixture(backend: Arc<RecordingBackend>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = VideoStore::new(dir.path().join("test.db")).unwrap();
    let runtime = Runtime::start(
        1,
        Settings::fast(),
        store.clone(),
        Arc::clone(&backend) as Arc<dyn AnswerBackend>,
        Arc::clone(&backend) as Arc<dyn VideoProcessor>,
    )
    .unwrap();

    Fixture {
        runtime,
        store,
        backend,
        _dir: dir,
    }
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Give the detection pipeline (settle delay plus channel hops) time to run.
async fn settle() {
    sleep(Duration::from_millis(100)).await;
}

async fn stored_video(
    tx: &mpsc::UnboundedSender<CoordinatorMessage>,
) -> Option<VideoContext> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(CoordinatorMessage::GetVideoData { reply: reply_tx })
        .unwrap();
    reply_rx.await.unwrap()
}

#[tokio::test]
async fn navigation_to_a_video_stores_it_and_sets_the_badge() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));

    fixture.runtime.page().navigate(&watch_url("abc123"));
    fixture.runtime.page().set_heading("Rust in 100 Seconds");
    settle().await;

    let stored = stored_video(&fixture.runtime.coordinator_sender())
        .await
        .expect("video should be stored after detection");
    assert_eq!(stored.video_id, "abc123");
    assert!(fixture.runtime.coordinator().badge_is_set(1).await);
    assert_eq!(fixture.runtime.coordinator().badge_text(1).await, "\u{25cf}");

    let durable = fixture.store.get_current_video().await.unwrap();
    assert_eq!(durable.map(|v| v.video_id), Some("abc123".to_string()));

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn leaving_the_watch_page_clears_video_and_badge() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));

    fixture.runtime.page().navigate(&watch_url("abc123"));
    settle().await;
    assert!(fixture.runtime.coordinator().badge_is_set(1).await);

    fixture
        .runtime
        .page()
        .navigate("https://www.youtube.com/feed/subscriptions");
    settle().await;

    assert!(stored_video(&fixture.runtime.coordinator_sender())
        .await
        .is_none());
    assert!(!fixture.runtime.coordinator().badge_is_set(1).await);
    assert!(fixture.store.get_current_video().await.unwrap().is_none());

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_detections_preserve_the_original_timestamp() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));
    let tx = fixture.runtime.coordinator_sender();

    let detection = |id: &str| CoordinatorMessage::VideoDetected {
        video: DerivedVideo {
            video_id: id.to_string(),
            title: "T".to_string(),
            url: watch_url(id),
        },
        tab_id: 1,
    };

    // v1, v2, v2, v3: exactly two stored transitions after v1.
    tx.send(detection("v1")).unwrap();
    settle().await;
    let first = stored_video(&tx).await.unwrap();
    assert_eq!(first.video_id, "v1");

    tx.send(detection("v2")).unwrap();
    settle().await;
    let second = stored_video(&tx).await.unwrap();
    assert_eq!(second.video_id, "v2");

    tx.send(detection("v2")).unwrap();
    settle().await;
    let duplicate = stored_video(&tx).await.unwrap();
    assert_eq!(duplicate.detected_at, second.detected_at);

    tx.send(detection("v3")).unwrap();
    settle().await;
    let third = stored_video(&tx).await.unwrap();
    assert_eq!(third.video_id, "v3");
    assert_ne!(third.detected_at, second.detected_at);

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn navigation_alone_clears_a_stale_badge() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));
    let tx = fixture.runtime.coordinator_sender();

    tx.send(CoordinatorMessage::VideoDetected {
        video: DerivedVideo {
            video_id: "v1".to_string(),
            title: "T".to_string(),
            url: watch_url("v1"),
        },
        tab_id: 1,
    })
    .unwrap();
    settle().await;
    assert!(fixture.runtime.coordinator().badge_is_set(1).await);

    // Even without a VideoRemoved, leaving the watch path drops the badge.
    tx.send(CoordinatorMessage::TabNavigated {
        tab_id: 1,
        url: "https://www.youtube.com/feed/subscriptions".to_string(),
    })
    .unwrap();
    settle().await;

    assert!(!fixture.runtime.coordinator().badge_is_set(1).await);
    // The stored record is untouched; only the projection was cleaned up.
    assert!(stored_video(&tx).await.is_some());

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn popup_loads_video_and_relays_chat() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));

    fixture.runtime.page().navigate(&watch_url("abc123"));
    fixture.runtime.page().set_heading("Rust in 100 Seconds");
    settle().await;

    let mut popup = fixture.runtime.open_popup();
    popup.open().await;
    assert!(popup.input_enabled());
    assert_eq!(
        popup.current_video().map(|v| v.video_id.as_str()),
        Some("abc123")
    );

    popup.ask("what is this about?").await;
    assert_eq!(popup.transcript().len(), 2);
    assert_eq!(
        popup.transcript()[1].content,
        "answer for abc123: what is this about?"
    );
    assert_eq!(fixture.backend.asks.load(Ordering::SeqCst), 1);

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn popup_without_any_video_is_disabled() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));

    let mut popup = fixture.runtime.open_popup();
    popup.open().await;

    assert!(!popup.input_enabled());
    assert_eq!(
        popup.status().unwrap().text,
        "Please navigate to a YouTube video first."
    );

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn chat_with_no_stored_video_is_rejected() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));
    let tx = fixture.runtime.coordinator_sender();

    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(CoordinatorMessage::Chat {
        message: "hello".to_string(),
        video_id: "ghost".to_string(),
        reply: reply_tx,
    })
    .unwrap();

    let reply = reply_rx.await.unwrap();
    assert_eq!(reply, Err(RelayError::NoStoredVideo));
    assert_eq!(
        reply.unwrap_err().to_string(),
        "No video detected. Please go to a YouTube video first."
    );
    assert_eq!(fixture.backend.asks.load(Ordering::SeqCst), 0);

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn popup_falls_back_to_a_live_page_read() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));

    fixture.runtime.page().navigate(&watch_url("live42"));
    fixture.runtime.page().set_heading("Live Title");
    settle().await;

    // Wipe the stored record so the popup has to ask the bridge directly.
    let tx = fixture.runtime.coordinator_sender();
    tx.send(CoordinatorMessage::VideoRemoved { tab_id: 1 }).unwrap();
    settle().await;
    assert!(stored_video(&tx).await.is_none());

    let mut popup = fixture.runtime.open_popup();
    popup.open().await;

    assert!(popup.input_enabled());
    assert_eq!(
        popup.current_video().map(|v| v.video_id.as_str()),
        Some("live42")
    );
    assert_eq!(
        popup.current_video().map(|v| v.video_title.as_str()),
        Some("Live Title")
    );

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn processing_is_single_flight() {
    let backend = Arc::new(RecordingBackend::with_process_delay(Duration::from_millis(
        300,
    )));
    let mut fixture = start_fixture(Arc::clone(&backend));

    fixture.runtime.page().navigate(&watch_url("abc123"));
    settle().await;

    let bridge = fixture.runtime.bridge_requests();
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    bridge
        .send(BridgeMessage::ProcessVideo { reply: first_tx })
        .unwrap();
    bridge
        .send(BridgeMessage::ProcessVideo { reply: second_tx })
        .unwrap();

    let second = timeout(Duration::from_millis(200), second_rx)
        .await
        .expect("rejection should not wait for the running job")
        .unwrap();
    assert_eq!(second, Err(RelayError::AlreadyProcessing));
    assert_eq!(
        second.unwrap_err().to_string(),
        "Already processing a video"
    );

    let first = first_rx.await.unwrap();
    assert_eq!(first, Ok("Video processed successfully".to_string()));
    assert_eq!(backend.processes.load(Ordering::SeqCst), 1);

    // The guard is released once the job finishes.
    let (third_tx, third_rx) = oneshot::channel();
    bridge
        .send(BridgeMessage::ProcessVideo { reply: third_tx })
        .unwrap();
    assert!(third_rx.await.unwrap().is_ok());
    assert_eq!(backend.processes.load(Ordering::SeqCst), 2);

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn processing_without_a_video_releases_the_guard() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));

    let bridge = fixture.runtime.bridge_requests();
    let (reply_tx, reply_rx) = oneshot::channel();
    bridge
        .send(BridgeMessage::ProcessVideo { reply: reply_tx })
        .unwrap();
    assert_eq!(reply_rx.await.unwrap(), Err(RelayError::NoVideoOnPage));

    // A later attempt on a real video must not see a stuck guard.
    fixture.runtime.page().navigate(&watch_url("abc123"));
    settle().await;
    let (reply_tx, reply_rx) = oneshot::channel();
    bridge
        .send(BridgeMessage::ProcessVideo { reply: reply_tx })
        .unwrap();
    assert!(reply_rx.await.unwrap().is_ok());

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn coordinator_restart_recovers_from_storage() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));
    let tx = fixture.runtime.coordinator_sender();

    fixture.runtime.page().navigate(&watch_url("abc123"));
    settle().await;
    assert!(stored_video(&tx).await.is_some());

    fixture.runtime.coordinator_mut().stop().await.unwrap();
    fixture.runtime.coordinator_mut().start().unwrap();

    // Same message port, fresh task, state rebuilt from storage.
    let recovered = stored_video(&tx).await.expect("stored video survives restart");
    assert_eq!(recovered.video_id, "abc123");

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn videos_survive_a_full_process_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");
    let backend = Arc::new(RecordingBackend::new());

    {
        let store = VideoStore::new(db_path.clone()).unwrap();
        let mut runtime = Runtime::start(
            1,
            Settings::fast(),
            store,
            Arc::clone(&backend) as Arc<dyn AnswerBackend>,
            Arc::clone(&backend) as Arc<dyn VideoProcessor>,
        )
        .unwrap();
        runtime.page().navigate(&watch_url("abc123"));
        settle().await;
        runtime.shutdown().await.unwrap();
    }

    let store = VideoStore::new(db_path).unwrap();
    let mut runtime = Runtime::start(
        1,
        Settings::fast(),
        store,
        Arc::clone(&backend) as Arc<dyn AnswerBackend>,
        backend as Arc<dyn VideoProcessor>,
    )
    .unwrap();

    let recovered = stored_video(&runtime.coordinator_sender()).await.unwrap();
    assert_eq!(recovered.video_id, "abc123");

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn bridge_answers_requests_during_the_settle_window() {
    let dir = TempDir::new().unwrap();
    let store = VideoStore::new(dir.path().join("test.db")).unwrap();
    let backend = Arc::new(RecordingBackend::new());
    let settings = Settings {
        settle_delay_ms: 500,
        ..Settings::fast()
    };
    let mut runtime = Runtime::start(
        1,
        settings,
        store,
        Arc::clone(&backend) as Arc<dyn AnswerBackend>,
        backend as Arc<dyn VideoProcessor>,
    )
    .unwrap();

    runtime.page().navigate(&watch_url("abc123"));
    sleep(Duration::from_millis(20)).await;

    // Mid-settle, the bridge must still serve requests; only the address
    // re-derivation waits out the delay.
    let (reply_tx, reply_rx) = oneshot::channel();
    runtime
        .bridge_requests()
        .send(BridgeMessage::GetCurrentVideo { reply: reply_tx })
        .unwrap();
    let video = timeout(Duration::from_millis(100), reply_rx)
        .await
        .expect("reply should not wait out the settle delay")
        .unwrap()
        .unwrap();
    assert_eq!(video.video_id, "abc123");

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn observer_answers_pulls_during_the_settle_window() {
    let page = HostPage::new(1);
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let settings = Settings {
        settle_delay_ms: 500,
        ..Settings::fast()
    };

    let mut observer = ObserverController::new();
    observer
        .start(page.clone(), events_tx, requests_rx, settings)
        .unwrap();

    page.navigate(&watch_url("abc123"));
    sleep(Duration::from_millis(20)).await;

    let (reply_tx, reply_rx) = oneshot::channel();
    requests_tx
        .send(ObserverMessage::GetCurrent { reply: reply_tx })
        .unwrap();
    let fragment = timeout(Duration::from_millis(100), reply_rx)
        .await
        .expect("pull should not wait out the settle delay")
        .unwrap()
        .expect("address strategy reads the new url");
    assert_eq!(fragment.video_id, "abc123");

    observer.stop().await.unwrap();
}

#[tokio::test]
async fn observer_pull_reads_fresh_page_state() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));

    fixture
        .runtime
        .page()
        .set_player_config(json!({"args": {"video_id": "xyz789", "title": "Fresh"}}));

    let (reply_tx, reply_rx) = oneshot::channel();
    fixture
        .runtime
        .observer_requests()
        .send(ObserverMessage::GetCurrent { reply: reply_tx })
        .unwrap();

    let fragment = reply_rx.await.unwrap().expect("player config is readable");
    assert_eq!(fragment.video_id, "xyz789");
    assert_eq!(fragment.title.as_deref(), Some("Fresh"));

    fixture.runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn observer_emits_one_event_per_video_change() {
    let page = HostPage::new(1);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (_requests_tx, requests_rx) = mpsc::unbounded_channel();

    let mut observer = ObserverController::new();
    observer
        .start(page.clone(), events_tx, requests_rx, Settings::fast())
        .unwrap();

    page.set_player_config(json!({"args": {"video_id": "abc123"}}));
    let fragment = timeout(Duration::from_millis(500), events_rx.recv())
        .await
        .expect("poll should pick up the video")
        .unwrap();
    assert_eq!(fragment.video_id, "abc123");

    // Several poll periods with no underlying change emit nothing.
    sleep(Duration::from_millis(200)).await;
    assert!(events_rx.try_recv().is_err());

    observer.stop().await.unwrap();
}

#[tokio::test]
async fn new_video_resets_the_chat_session() {
    let mut fixture = start_fixture(Arc::new(RecordingBackend::new()));

    fixture.runtime.page().navigate(&watch_url("v1"));
    settle().await;

    let mut popup = fixture.runtime.open_popup();
    popup.open().await;
    popup.ask("about v1?").await;
    assert_eq!(popup.transcript().len(), 2);

    fixture.runtime.page().navigate(&watch_url("v2"));
    settle().await;

    popup.open().await;
    assert!(popup.transcript().is_empty());
    assert_eq!(
        popup.current_video().map(|v| v.video_id.as_str()),
        Some("v2")
    );

    fixture.runtime.shutdown().await.unwrap();
}
