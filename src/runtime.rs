use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{AnswerBackend, VideoProcessor};
use crate::bridge::BridgeController;
use crate::config::Settings;
use crate::coordinator::CoordinatorController;
use crate::host::HostPage;
use crate::models::TabId;
use crate::observer::ObserverController;
use crate::popup::Popup;
use crate::protocol::{BridgeMessage, CoordinatorMessage, ObserverMessage};
use crate::store::VideoStore;

/// Wires one tab's worth of contexts together: host page, observer, bridge,
/// coordinator, plus the navigation feed the host environment would deliver
/// on its own. Popups are opened against the live channel ends.
pub struct Runtime {
    page: HostPage,
    coordinator: CoordinatorController,
    observer: ObserverController,
    bridge: BridgeController,
    observer_tx: mpsc::UnboundedSender<ObserverMessage>,
    bridge_tx: mpsc::UnboundedSender<BridgeMessage>,
    nav_handle: Option<JoinHandle<()>>,
    nav_cancel: Option<CancellationToken>,
}

impl Runtime {
    pub fn start(
        tab_id: TabId,
        settings: Settings,
        store: VideoStore,
        backend: Arc<dyn AnswerBackend>,
        processor: Arc<dyn VideoProcessor>,
    ) -> Result<Self> {
        let page = HostPage::new(tab_id);

        let mut coordinator = CoordinatorController::new(store, backend);
        coordinator.start()?;
        let coordinator_tx = coordinator.sender();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (observer_tx, observer_rx) = mpsc::unbounded_channel();
        let (bridge_tx, bridge_rx) = mpsc::unbounded_channel();

        let mut observer = ObserverController::new();
        observer.start(page.clone(), events_tx, observer_rx, settings.clone())?;

        let mut bridge = BridgeController::new();
        bridge.start(
            page.clone(),
            events_rx,
            bridge_rx,
            coordinator_tx.clone(),
            processor,
            settings,
        )?;

        let nav_cancel = CancellationToken::new();
        let nav_handle = tokio::spawn(forward_navigations(
            page.clone(),
            coordinator_tx,
            nav_cancel.clone(),
        ));

        info!("runtime started for tab {tab_id}");

        Ok(Self {
            page,
            coordinator,
            observer,
            bridge,
            observer_tx,
            bridge_tx,
            nav_handle: Some(nav_handle),
            nav_cancel: Some(nav_cancel),
        })
    }

    pub fn page(&self) -> &HostPage {
        &self.page
    }

    pub fn open_popup(&self) -> Popup {
        Popup::new(self.coordinator.sender(), self.bridge_tx.clone())
    }

    pub fn observer_requests(&self) -> mpsc::UnboundedSender<ObserverMessage> {
        self.observer_tx.clone()
    }

    pub fn bridge_requests(&self) -> mpsc::UnboundedSender<BridgeMessage> {
        self.bridge_tx.clone()
    }

    pub fn coordinator_sender(&self) -> mpsc::UnboundedSender<CoordinatorMessage> {
        self.coordinator.sender()
    }

    pub fn coordinator(&self) -> &CoordinatorController {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut CoordinatorController {
        &mut self.coordinator
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(token) = self.nav_cancel.take() {
            token.cancel();
        }
        if let Some(handle) = self.nav_handle.take() {
            let _ = handle.await;
        }

        self.observer.stop().await?;
        self.bridge.stop().await?;
        self.coordinator.stop().await?;
        info!("runtime stopped for tab {}", self.page.tab_id());
        Ok(())
    }
}

/// Relays every address change to the coordinator as a tab navigation,
/// independently of whether the page holds a detectable video.
async fn forward_navigations(
    page: HostPage,
    coordinator_tx: mpsc::UnboundedSender<CoordinatorMessage>,
    cancel: CancellationToken,
) {
    let tab_id = page.tab_id();
    let mut url_rx = page.subscribe_url();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = url_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let url = url_rx.borrow_and_update().clone();
                if coordinator_tx
                    .send(CoordinatorMessage::TabNavigated { tab_id, url })
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}
