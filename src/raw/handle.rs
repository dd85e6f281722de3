//! RawHandle - Client interface for the RawCoordinator

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::channel::ChannelHandle;
use super::messages::{RawRequest, RawSnapshot, RawStatus};
use crate::events::LabelEvent;

/// Handle for sending requests to the RawCoordinator
#[derive(Clone)]
pub struct RawHandle {
    tx: mpsc::Sender<RawRequest>,
}

impl RawHandle {
    pub(crate) fn new(tx: mpsc::Sender<RawRequest>) -> Self {
        Self { tx }
    }

    /// Send an event to the coordinator
    pub async fn send(&self, event: LabelEvent) -> Result<()> {
        debug!(event_type = event.event_type(), "RawHandle::send: called");
        self.tx
            .send(RawRequest::Event(event))
            .await
            .map_err(|_| eyre!("RawCoordinator channel closed"))
    }

    pub async fn load_frame(&self, frame: u32) -> Result<()> {
        self.send(LabelEvent::LoadFrame { frame }).await
    }

    pub async fn load_channel(&self, channel: u32) -> Result<()> {
        self.send(LabelEvent::LoadChannel { channel }).await
    }

    pub async fn set_frame(&self, frame: u32) -> Result<()> {
        self.send(LabelEvent::Frame { frame }).await
    }

    pub async fn set_channel(&self, channel: u32) -> Result<()> {
        self.send(LabelEvent::Channel { channel }).await
    }

    pub async fn toggle_color_mode(&self) -> Result<()> {
        self.send(LabelEvent::ToggleColorMode).await
    }

    pub async fn toggle_invert(&self) -> Result<()> {
        self.send(LabelEvent::ToggleInvert).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(LabelEvent::Reset).await
    }

    pub async fn add_layer(&self) -> Result<()> {
        self.send(LabelEvent::AddLayer).await
    }

    /// Capture the active channel and display mode
    pub async fn save(&self) -> Result<RawSnapshot> {
        debug!("RawHandle::save: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RawRequest::Save { reply_tx })
            .await
            .map_err(|_| eyre!("RawCoordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("RawCoordinator shutdown"))
    }

    /// Reapply a snapshot; resolves once the coordinator acknowledges `RESTORED`
    pub async fn restore(&self, snapshot: RawSnapshot) -> Result<()> {
        debug!(?snapshot, "RawHandle::restore: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RawRequest::Restore { snapshot, reply_tx })
            .await
            .map_err(|_| eyre!("RawCoordinator channel closed"))?;

        match reply_rx.await.map_err(|_| eyre!("RawCoordinator shutdown"))? {
            LabelEvent::Restored => Ok(()),
            other => Err(eyre!("Unexpected restore reply: {}", other.event_type())),
        }
    }

    pub async fn status(&self) -> Result<RawStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RawRequest::GetStatus { reply_tx })
            .await
            .map_err(|_| eyre!("RawCoordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("RawCoordinator shutdown"))
    }

    /// Handle to one channel actor, for reading its cache
    pub async fn channel(&self, channel: u32) -> Result<Option<ChannelHandle>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RawRequest::GetChannel { channel, reply_tx })
            .await
            .map_err(|_| eyre!("RawCoordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("RawCoordinator shutdown"))
    }

    /// Request shutdown; channel actors stop with the coordinator
    pub async fn shutdown(&self) -> Result<()> {
        debug!("RawHandle::shutdown: called");
        self.tx
            .send(RawRequest::Shutdown)
            .await
            .map_err(|_| eyre!("RawCoordinator channel closed"))
    }
}
