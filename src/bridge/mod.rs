use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::VideoProcessor;
use crate::config::Settings;
use crate::host::HostPage;
use crate::models::VideoFragment;
use crate::protocol::{BridgeMessage, CoordinatorMessage};

pub mod derive;
mod loop_worker;

use loop_worker::bridge_loop;

pub struct BridgeController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl BridgeController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        page: HostPage,
        observer_rx: mpsc::UnboundedReceiver<VideoFragment>,
        requests_rx: mpsc::UnboundedReceiver<BridgeMessage>,
        coordinator_tx: mpsc::UnboundedSender<CoordinatorMessage>,
        processor: Arc<dyn VideoProcessor>,
        settings: Settings,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("bridge already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(bridge_loop(
            page,
            observer_rx,
            requests_rx,
            coordinator_tx,
            processor,
            settings,
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
            handle
                .await
                .context("bridge loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for BridgeController {
    fn default() -> Self {
        Self::new()
    }
}
