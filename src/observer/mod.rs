use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::host::HostPage;
use crate::models::VideoFragment;
use crate::protocol::ObserverMessage;

pub mod extract;
mod loop_worker;

use loop_worker::observer_loop;

pub struct ObserverController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl ObserverController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(
        &mut self,
        page: HostPage,
        events_tx: mpsc::UnboundedSender<VideoFragment>,
        requests_rx: mpsc::UnboundedReceiver<ObserverMessage>,
        settings: Settings,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("observer already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(observer_loop(
            page,
            events_tx,
            requests_rx,
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
                .context("observer loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for ObserverController {
    fn default() -> Self {
        Self::new()
    }
}
