//! RawMachine - synchronous core of the raw data coordinator
//!
//! The machine owns no channels and performs no I/O. Each input runs to
//! completion, including every event it raises, and yields the commands and
//! events the coordinator task must deliver.

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::display::{ColorMode, DisplayMode, GrayscaleMode};
use super::messages::{ChannelCommand, FrameState, RawSnapshot, RawStatus};
use super::regions::{
    ChannelRegion, DisplayRegion, Effect, FrameRegion, PreloadRegion, RawContext, RawInput, RawReply, Reaction,
    Region, RestoreRegion,
};
use crate::domain::ProjectContext;
use crate::events::LabelEvent;

/// Effects the coordinator task carries out
#[derive(Debug, Clone, PartialEq)]
pub enum RawEffect {
    Channel { channel: u32, command: ChannelCommand },
    Parent(LabelEvent),
    Publish(LabelEvent),
}

/// Everything one input produced
#[derive(Debug, Default, PartialEq)]
pub struct MachineOutput {
    pub effects: Vec<RawEffect>,
    pub reply: Option<RawReply>,
}

impl MachineOutput {
    /// Commands addressed to one channel, in order
    pub fn channel_commands(&self, channel: u32) -> Vec<ChannelCommand> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                RawEffect::Channel { channel: c, command } if *c == channel => Some(*command),
                _ => None,
            })
            .collect()
    }

    pub fn parent_events(&self) -> Vec<LabelEvent> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                RawEffect::Parent(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn published(&self) -> Vec<LabelEvent> {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                RawEffect::Publish(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Parallel-region state machine for raw image data
pub struct RawMachine {
    ctx: RawContext,
    preload: PreloadRegion,
    frame: FrameRegion,
    channel: ChannelRegion,
    display: DisplayRegion,
    restore: RestoreRegion,
    grayscale: GrayscaleMode,
    color: ColorMode,
}

impl RawMachine {
    pub fn new(project: &ProjectContext) -> Self {
        debug!(project_id = %project.project_id, num_channels = project.num_channels, "RawMachine::new: called");
        Self {
            ctx: RawContext::new(project),
            preload: PreloadRegion,
            frame: FrameRegion::default(),
            channel: ChannelRegion,
            display: DisplayRegion,
            restore: RestoreRegion,
            grayscale: GrayscaleMode::new(),
            color: ColorMode::new(project.num_channels),
        }
    }

    pub fn context(&self) -> &RawContext {
        &self.ctx
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame.state()
    }

    pub fn status(&self) -> RawStatus {
        RawStatus {
            frame: self.ctx.frame,
            loading_frame: self.ctx.loading_frame,
            channel: self.ctx.channel,
            display: self.ctx.display(),
            frame_state: self.frame.state(),
            layers: self.color.layers(),
            channel_names: self.ctx.channel_names.clone(),
        }
    }

    /// Run every region's entry actions
    pub fn start(&mut self) -> MachineOutput {
        let mut out = MachineOutput::default();
        let mut queue = VecDeque::new();

        let snapshot = self.ctx.clone();
        let reactions: Vec<Reaction> = self
            .regions()
            .into_iter()
            .map(|region| {
                let mut reaction = Reaction::default();
                region.enter(&snapshot, &mut reaction);
                reaction
            })
            .collect();
        self.settle(reactions, &mut queue, &mut out);
        self.drain(queue, &mut out);
        out
    }

    /// Handle a bus or caller event
    pub fn dispatch(&mut self, event: LabelEvent) -> MachineOutput {
        self.run(RawInput::Event(event))
    }

    pub fn save(&mut self) -> RawSnapshot {
        match self.run(RawInput::Save).reply {
            Some(RawReply::Snapshot(snapshot)) => snapshot,
            _ => RawSnapshot {
                channel: self.ctx.channel,
                is_grayscale: self.ctx.is_grayscale,
            },
        }
    }

    pub fn restore(&mut self, snapshot: RawSnapshot) -> MachineOutput {
        self.run(RawInput::Restore(snapshot))
    }

    fn run(&mut self, input: RawInput) -> MachineOutput {
        let mut out = MachineOutput::default();
        self.drain(VecDeque::from([input]), &mut out);
        out
    }

    fn drain(&mut self, mut queue: VecDeque<RawInput>, out: &mut MachineOutput) {
        while let Some(input) = queue.pop_front() {
            self.step(input, &mut queue, out);
        }
    }

    fn regions(&mut self) -> [&mut dyn Region; 5] {
        [
            &mut self.preload,
            &mut self.frame,
            &mut self.channel,
            &mut self.display,
            &mut self.restore,
        ]
    }

    fn step(&mut self, input: RawInput, queue: &mut VecDeque<RawInput>, out: &mut MachineOutput) {
        debug!(?input, "RawMachine::step: called");

        // These bypass the regions
        match &input {
            RawInput::Event(LabelEvent::ToggleInvert) => {
                self.execute(Effect::ToActiveChannel(ChannelCommand::ToggleInvert), queue, out);
                return;
            }
            RawInput::Event(LabelEvent::AddLayer) => {
                self.execute(Effect::ToParent(LabelEvent::AddLayer), queue, out);
                return;
            }
            _ => {}
        }

        // A channel outside the project must never reach the context or the display
        if let RawInput::Event(
            LabelEvent::Channel { channel } | LabelEvent::LoadChannel { channel } | LabelEvent::ChannelLoaded { channel, .. },
        ) = &input
        {
            if !self.ctx.has_channel(*channel) {
                warn!(channel = *channel, num_channels = self.ctx.num_channels, "Ignoring event for unknown channel");
                return;
            }
        }

        let snapshot = self.ctx.clone();
        let reactions: Vec<Reaction> = self
            .regions()
            .into_iter()
            .map(|region| {
                let mut reaction = Reaction::default();
                region.react(&snapshot, &input, &mut reaction);
                reaction
            })
            .collect();
        self.settle(reactions, queue, out);
    }

    /// Apply every patch in region order, then run the effects
    fn settle(&mut self, reactions: Vec<Reaction>, queue: &mut VecDeque<RawInput>, out: &mut MachineOutput) {
        for reaction in &reactions {
            reaction.patch.apply(&mut self.ctx);
        }
        for effect in reactions.into_iter().flat_map(|reaction| reaction.effects) {
            self.execute(effect, queue, out);
        }
    }

    fn active_mode(&mut self) -> &mut dyn DisplayMode {
        if self.ctx.is_grayscale {
            &mut self.grayscale
        } else {
            &mut self.color
        }
    }

    fn execute(&mut self, effect: Effect, queue: &mut VecDeque<RawInput>, out: &mut MachineOutput) {
        match effect {
            Effect::ToDisplay(event) => {
                let ctx = self.ctx.clone();
                let mut produced = Vec::new();
                self.active_mode().handle(&ctx, &event, &mut produced);
                for effect in produced {
                    self.execute(effect, queue, out);
                }
            }
            Effect::ActivateDisplay => {
                let ctx = self.ctx.clone();
                let mut produced = Vec::new();
                let mode = self.active_mode();
                debug!(kind = ?mode.kind(), "Activating display mode");
                mode.activate(&ctx, &mut produced);
                for effect in produced {
                    self.execute(effect, queue, out);
                }
            }
            Effect::ToChannel(channel, command) => self.to_channel(channel, command, out),
            Effect::ToActiveChannel(command) => self.to_channel(self.ctx.channel, command, out),
            Effect::ToAllChannels(command) => {
                for channel in 0..self.ctx.num_channels {
                    self.to_channel(channel, command, out);
                }
            }
            Effect::ToParent(event) => out.effects.push(RawEffect::Parent(event)),
            Effect::Publish(event) => out.effects.push(RawEffect::Publish(event)),
            Effect::Raise(event) => queue.push_back(RawInput::Event(event)),
            Effect::Reply(reply) => out.reply = Some(reply),
        }
    }

    fn to_channel(&self, channel: u32, command: ChannelCommand, out: &mut MachineOutput) {
        if channel >= self.ctx.num_channels {
            warn!(channel, num_channels = self.ctx.num_channels, ?command, "Dropping command for unknown channel");
            return;
        }
        out.effects.push(RawEffect::Channel { channel, command });
    }
}
