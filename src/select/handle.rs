//! SelectHandle - Client interface for the SelectCoordinator

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::core::SelectRequest;
use super::machine::{SelectionSnapshot, SelectionState};
use crate::events::LabelEvent;

/// Handle for sending requests to the SelectCoordinator
#[derive(Clone)]
pub struct SelectHandle {
    tx: mpsc::Sender<SelectRequest>,
}

impl SelectHandle {
    pub(crate) fn new(tx: mpsc::Sender<SelectRequest>) -> Self {
        Self { tx }
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<SelectRequest> {
        self.tx.clone()
    }

    /// Send a selection gesture or an external update
    pub async fn send(&self, event: LabelEvent) -> Result<()> {
        debug!(event_type = event.event_type(), "SelectHandle::send: called");
        self.tx
            .send(SelectRequest::Event(event))
            .await
            .map_err(|_| eyre!("SelectCoordinator channel closed"))
    }

    /// Capture foreground and background
    pub async fn save(&self) -> Result<SelectionSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SelectRequest::Save { reply_tx })
            .await
            .map_err(|_| eyre!("SelectCoordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("SelectCoordinator shutdown"))
    }

    /// Reapply a snapshot; resolves once `RESTORED` is acknowledged
    pub async fn restore(&self, snapshot: SelectionSnapshot) -> Result<()> {
        debug!(?snapshot, "SelectHandle::restore: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SelectRequest::Restore { snapshot, reply_tx })
            .await
            .map_err(|_| eyre!("SelectCoordinator channel closed"))?;

        match reply_rx.await.map_err(|_| eyre!("SelectCoordinator shutdown"))? {
            LabelEvent::Restored => Ok(()),
            other => Err(eyre!("Unexpected restore reply: {}", other.event_type())),
        }
    }

    pub async fn state(&self) -> Result<SelectionState> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SelectRequest::GetState { reply_tx })
            .await
            .map_err(|_| eyre!("SelectCoordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("SelectCoordinator shutdown"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        debug!("SelectHandle::shutdown: called");
        self.tx
            .send(SelectRequest::Shutdown)
            .await
            .map_err(|_| eyre!("SelectCoordinator channel closed"))
    }
}
