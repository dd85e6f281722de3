//! Main SelectCoordinator task implementation

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::handle::SelectHandle;
use super::machine::{SelectMachine, SelectionSnapshot, SelectionState};
use crate::config::CoordinatorConfig;
use crate::events::{EventBus, LabelEvent};

/// Internal requests to the SelectCoordinator task
#[derive(Debug)]
pub(crate) enum SelectRequest {
    Event(LabelEvent),
    Save {
        reply_tx: oneshot::Sender<SelectionSnapshot>,
    },
    /// The reply is the `RESTORED` acknowledgment
    Restore {
        snapshot: SelectionSnapshot,
        reply_tx: oneshot::Sender<LabelEvent>,
    },
    GetState {
        reply_tx: oneshot::Sender<SelectionState>,
    },
    Shutdown,
}

impl From<LabelEvent> for SelectRequest {
    fn from(event: LabelEvent) -> Self {
        SelectRequest::Event(event)
    }
}

/// Owns the label selection and publishes every change
pub struct SelectCoordinator {
    machine: SelectMachine,
    bus: Arc<EventBus>,
    tx: mpsc::Sender<SelectRequest>,
    rx: mpsc::Receiver<SelectRequest>,
}

impl SelectCoordinator {
    /// Create a coordinator publishing on `bus`
    pub fn new(config: &CoordinatorConfig, bus: Arc<EventBus>) -> Self {
        debug!(bus = %bus.name(), "SelectCoordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        Self {
            machine: SelectMachine::new(),
            bus,
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> SelectHandle {
        SelectHandle::new(self.tx.clone())
    }

    /// Spawn the coordinator task
    pub fn spawn(self) -> (SelectHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    pub async fn run(mut self) {
        info!("SelectCoordinator started");
        let published = self.machine.start();
        self.publish(published);

        while let Some(req) = self.rx.recv().await {
            match req {
                SelectRequest::Event(event) => {
                    let published = self.machine.dispatch(event);
                    self.publish(published);
                }

                SelectRequest::Save { reply_tx } => {
                    let _ = reply_tx.send(self.machine.save());
                }

                SelectRequest::Restore { snapshot, reply_tx } => {
                    let published = self.machine.restore(snapshot);
                    self.publish(published);
                    let _ = reply_tx.send(LabelEvent::Restored);
                }

                SelectRequest::GetState { reply_tx } => {
                    let _ = reply_tx.send(self.machine.state().clone());
                }

                SelectRequest::Shutdown => {
                    info!("SelectCoordinator shutting down");
                    break;
                }
            }
        }

        info!("SelectCoordinator stopped");
    }

    fn publish(&self, events: Vec<LabelEvent>) {
        for event in events {
            self.bus.publish(event);
        }
    }
}
