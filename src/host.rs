use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::watch;

use crate::models::TabId;

/// Snapshot of the host page as the extension contexts can see it: the
/// address bar, the page's internal client-side structures, and the visible
/// heading element.
///
/// The internal structures are third-party and unversioned; consumers must
/// fail closed on any shape mismatch.
#[derive(Debug, Clone)]
pub struct PageState {
    pub url: String,
    /// The host player's config object (`ytplayer.config` analog).
    pub player_config: Option<Value>,
    /// The embedded initial-data structure (`ytInitialData` analog).
    pub initial_data: Option<Value>,
    /// Text of the visible title element, if rendered.
    pub heading: Option<String>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            player_config: None,
            initial_data: None,
            heading: None,
        }
    }
}

/// Handle onto one tab's page. Mutations to the address bar fan out through a
/// watch channel, which stands in for the DOM mutation observation both the
/// page observer and the context bridge rely on.
///
/// Navigation deliberately does NOT touch the internal structures: in the real
/// host the internal state lags (or leads) the address during single-page-app
/// navigation, and the detection paths have to cope with that.
#[derive(Clone)]
pub struct HostPage {
    tab_id: TabId,
    state: Arc<RwLock<PageState>>,
    url_tx: Arc<watch::Sender<String>>,
}

impl HostPage {
    pub fn new(tab_id: TabId) -> Self {
        let state = PageState::default();
        let (url_tx, _url_rx) = watch::channel(state.url.clone());
        Self {
            tab_id,
            state: Arc::new(RwLock::new(state)),
            url_tx: Arc::new(url_tx),
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn snapshot(&self) -> PageState {
        self.state.read().expect("page state lock poisoned").clone()
    }

    /// Change the address bar and notify observers. Internal structures are
    /// left as-is; callers update them separately to model re-render lag.
    pub fn navigate(&self, url: &str) {
        {
            let mut state = self.state.write().expect("page state lock poisoned");
            state.url = url.to_string();
        }
        let _ = self.url_tx.send(url.to_string());
    }

    pub fn set_player_config(&self, config: Value) {
        let mut state = self.state.write().expect("page state lock poisoned");
        state.player_config = Some(config);
    }

    pub fn set_initial_data(&self, data: Value) {
        let mut state = self.state.write().expect("page state lock poisoned");
        state.initial_data = Some(data);
    }

    pub fn clear_internal_state(&self) {
        let mut state = self.state.write().expect("page state lock poisoned");
        state.player_config = None;
        state.initial_data = None;
    }

    pub fn set_heading(&self, heading: &str) {
        let mut state = self.state.write().expect("page state lock poisoned");
        state.heading = Some(heading.to_string());
    }

    /// Subscribe to address changes. The watch channel coalesces rapid
    /// navigations, which is the behavior the settle delay expects.
    pub fn subscribe_url(&self) -> watch::Receiver<String> {
        self.url_tx.subscribe()
    }
}
