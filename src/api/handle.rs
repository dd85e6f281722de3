//! ApiHandle - Client interface for the ApiCoordinator

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::messages::{ApiMetrics, ApiRequest, ApiState, Dispatch};
use crate::events::{EditArgs, LabelEvent};

/// Handle for sending requests to the ApiCoordinator
///
/// Cloneable; every clone observes the same request state.
#[derive(Clone)]
pub struct ApiHandle {
    tx: mpsc::Sender<ApiRequest>,
    state_rx: watch::Receiver<ApiState>,
}

impl ApiHandle {
    pub(crate) fn new(tx: mpsc::Sender<ApiRequest>, state_rx: watch::Receiver<ApiState>) -> Self {
        Self { tx, state_rx }
    }

    /// Mailbox sender, used to forward bus subscriptions into the coordinator
    pub(crate) fn sender(&self) -> mpsc::Sender<ApiRequest> {
        self.tx.clone()
    }

    /// Send an event without waiting for it to be handled
    pub async fn send(&self, event: LabelEvent) -> Result<()> {
        debug!(event_type = event.event_type(), "ApiHandle::send: called");
        self.tx
            .send(ApiRequest::from(event))
            .await
            .map_err(|_| eyre!("ApiCoordinator channel closed"))
    }

    /// Send an event and wait for the coordinator to decide what to do with it
    pub async fn request(&self, event: LabelEvent) -> Result<Dispatch> {
        debug!(event_type = event.event_type(), "ApiHandle::request: called");
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(ApiRequest::Event {
                event,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| eyre!("ApiCoordinator channel closed"))?;

        ack_rx.await.map_err(|_| eyre!("ApiCoordinator dropped request"))
    }

    pub async fn edit(&self, action: &str, args: EditArgs) -> Result<Dispatch> {
        self.request(LabelEvent::Edit {
            action: action.to_string(),
            args,
        })
        .await
    }

    pub async fn undo(&self) -> Result<Dispatch> {
        self.request(LabelEvent::BackendUndo).await
    }

    pub async fn redo(&self) -> Result<Dispatch> {
        self.request(LabelEvent::BackendRedo).await
    }

    pub async fn upload(&self) -> Result<Dispatch> {
        self.request(LabelEvent::Upload).await
    }

    pub async fn download(&self) -> Result<Dispatch> {
        self.request(LabelEvent::Download).await
    }

    pub async fn set_frame(&self, frame: u32) -> Result<()> {
        self.send(LabelEvent::Frame { frame }).await
    }

    pub async fn set_feature(&self, feature: u32) -> Result<()> {
        self.send(LabelEvent::Feature { feature }).await
    }

    pub async fn set_channel(&self, channel: u32) -> Result<()> {
        self.send(LabelEvent::Channel { channel }).await
    }

    /// Current request state
    pub fn state(&self) -> ApiState {
        *self.state_rx.borrow()
    }

    /// Wait until no request is outstanding
    pub async fn wait_idle(&self) -> Result<()> {
        debug!("ApiHandle::wait_idle: called");
        let mut state_rx = self.state_rx.clone();
        state_rx
            .wait_for(|state| !state.is_busy())
            .await
            .map_err(|_| eyre!("ApiCoordinator stopped"))?;
        Ok(())
    }

    /// Get coordinator metrics
    pub async fn metrics(&self) -> Result<ApiMetrics> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ApiRequest::GetMetrics { reply_tx })
            .await
            .map_err(|_| eyre!("ApiCoordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("ApiCoordinator shutdown"))
    }

    /// Request shutdown
    pub async fn shutdown(&self) -> Result<()> {
        debug!("ApiHandle::shutdown: called");
        self.tx
            .send(ApiRequest::Shutdown)
            .await
            .map_err(|_| eyre!("ApiCoordinator channel closed"))
    }
}
