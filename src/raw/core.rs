//! Main RawCoordinator task implementation

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channel::{ChannelActor, ChannelHandle};
use super::handle::RawHandle;
use super::machine::{MachineOutput, RawEffect, RawMachine};
use super::messages::{ChannelCommand, ChannelNotice, RawRequest};
use super::regions::RawReply;
use super::source::FrameSource;
use crate::config::CoordinatorConfig;
use crate::domain::ProjectContext;
use crate::events::{EventBus, LabelEvent};

/// Owns the channel actors and drives the raw data machine
pub struct RawCoordinator {
    project: ProjectContext,
    machine: RawMachine,
    channels: Vec<ChannelHandle>,
    channel_tasks: Vec<JoinHandle<()>>,
    raw_bus: Arc<EventBus>,
    parent: mpsc::UnboundedSender<LabelEvent>,
    tx: mpsc::Sender<RawRequest>,
    rx: mpsc::Receiver<RawRequest>,
    notice_rx: mpsc::UnboundedReceiver<ChannelNotice>,
}

impl RawCoordinator {
    /// Create the coordinator and spawn one actor per channel
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &CoordinatorConfig,
        project: ProjectContext,
        source: Arc<dyn FrameSource>,
        raw_bus: Arc<EventBus>,
        parent: mpsc::UnboundedSender<LabelEvent>,
    ) -> Self {
        debug!(project_id = %project.project_id, num_channels = project.num_channels, "RawCoordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let (channels, channel_tasks) = (0..project.num_channels)
            .map(|channel| {
                ChannelActor::new(
                    &project.project_id,
                    channel,
                    project.num_frames,
                    source.clone(),
                    config.channel_actor_buffer,
                    notice_tx.clone(),
                )
                .spawn()
            })
            .unzip();

        Self {
            machine: RawMachine::new(&project),
            project,
            channels,
            channel_tasks,
            raw_bus,
            parent,
            tx,
            rx,
            notice_rx,
        }
    }

    pub fn handle(&self) -> RawHandle {
        RawHandle::new(self.tx.clone())
    }

    /// Spawn the coordinator task
    pub fn spawn(self) -> (RawHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run the coordinator until shutdown is requested
    pub async fn run(mut self) {
        info!(
            project_id = %self.project.project_id,
            channels = self.channels.len(),
            frames = self.project.num_frames,
            "RawCoordinator started"
        );

        let output = self.machine.start();
        self.apply(output).await;

        loop {
            tokio::select! {
                req = self.rx.recv() => {
                    let Some(req) = req else { break };
                    if !self.handle_request(req).await {
                        break;
                    }
                }
                Some(notice) = self.notice_rx.recv() => {
                    self.handle_notice(notice).await;
                }
            }
        }

        self.stop_channels().await;
        info!("RawCoordinator stopped");
    }

    /// Returns false once shutdown is requested
    async fn handle_request(&mut self, req: RawRequest) -> bool {
        match req {
            RawRequest::Event(event) => {
                let output = self.machine.dispatch(event);
                self.apply(output).await;
            }

            RawRequest::Save { reply_tx } => {
                let _ = reply_tx.send(self.machine.save());
            }

            RawRequest::Restore { snapshot, reply_tx } => {
                debug!(?snapshot, "Restoring display selection");
                let mut output = self.machine.restore(snapshot);
                let reply = output.reply.take();
                self.apply(output).await;
                if reply == Some(RawReply::Restored) {
                    let _ = reply_tx.send(LabelEvent::Restored);
                }
            }

            RawRequest::GetStatus { reply_tx } => {
                let _ = reply_tx.send(self.machine.status());
            }

            RawRequest::GetChannel { channel, reply_tx } => {
                let _ = reply_tx.send(self.channels.get(channel as usize).cloned());
            }

            RawRequest::Shutdown => {
                info!("RawCoordinator shutting down");
                return false;
            }
        }
        true
    }

    async fn handle_notice(&mut self, notice: ChannelNotice) {
        match notice {
            ChannelNotice::Loaded { channel, frame } => {
                let output = self.machine.dispatch(LabelEvent::ChannelLoaded { channel, frame });
                self.apply(output).await;
            }
            ChannelNotice::Failed { channel, frame, error } => {
                warn!(channel, frame, %error, "Channel failed to load frame");
                self.send_parent(LabelEvent::Error {
                    error: serde_json::Value::String(error),
                });
                // Keep warming the rest of the channel
                self.send_channel(channel, ChannelCommand::Preload).await;
            }
        }
    }

    async fn apply(&mut self, output: MachineOutput) {
        for effect in output.effects {
            match effect {
                RawEffect::Channel { channel, command } => self.send_channel(channel, command).await,
                RawEffect::Parent(event) => self.send_parent(event),
                RawEffect::Publish(event) => {
                    self.raw_bus.publish(event);
                }
            }
        }
    }

    async fn send_channel(&self, channel: u32, command: ChannelCommand) {
        let Some(handle) = self.channels.get(channel as usize) else {
            warn!(channel, "No such channel actor");
            return;
        };
        if let Err(e) = handle.command(command).await {
            warn!(channel, error = %e, "Failed to reach channel actor");
        }
    }

    fn send_parent(&self, event: LabelEvent) {
        if self.parent.send(event).is_err() {
            debug!("RawCoordinator parent stream closed");
        }
    }

    async fn stop_channels(&mut self) {
        for handle in &self.channels {
            let _ = handle.shutdown().await;
        }
        for task in self.channel_tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Channel actor task failed");
            }
        }
    }
}
