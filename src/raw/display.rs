//! Grayscale and color display modes
//!
//! The active mode decides which channels a frame needs and raises
//! `FRAME_LOADED` once all of them report it. Only the active mode receives
//! forwarded events.

use std::collections::BTreeSet;

use tracing::debug;

use super::messages::{ChannelCommand, DisplayKind};
use super::regions::{Effect, RawContext};
use crate::events::LabelEvent;

/// A display sub-coordinator
pub trait DisplayMode: Send {
    fn kind(&self) -> DisplayKind;

    /// Called each time the mode becomes active
    fn activate(&mut self, ctx: &RawContext, out: &mut Vec<Effect>);

    fn handle(&mut self, ctx: &RawContext, event: &LabelEvent, out: &mut Vec<Effect>);
}

/// Tracks which channels still owe the frame being loaded
#[derive(Debug, Default)]
struct FrameLoad {
    frame: Option<u32>,
    pending: BTreeSet<u32>,
}

impl FrameLoad {
    fn start(&mut self, frame: u32, channels: impl IntoIterator<Item = u32>, out: &mut Vec<Effect>) {
        self.frame = Some(frame);
        self.pending = channels.into_iter().collect();
        debug!(frame, pending = ?self.pending, "FrameLoad::start: called");

        if self.pending.is_empty() {
            out.push(Effect::Raise(LabelEvent::FrameLoaded { frame }));
            return;
        }
        for &channel in &self.pending {
            out.push(Effect::ToChannel(channel, ChannelCommand::Load { frame }));
        }
    }

    /// Duplicate and stale notifications are ignored
    fn channel_loaded(&mut self, channel: u32, frame: u32, out: &mut Vec<Effect>) {
        if self.frame != Some(frame) || !self.pending.remove(&channel) {
            return;
        }
        if self.pending.is_empty() {
            out.push(Effect::Raise(LabelEvent::FrameLoaded { frame }));
        }
    }
}

/// Shows the active channel only
#[derive(Debug, Default)]
pub struct GrayscaleMode {
    load: FrameLoad,
    /// Channel requested by `LOAD_CHANNEL`, announced once loaded
    pending_channel: Option<u32>,
}

impl GrayscaleMode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplayMode for GrayscaleMode {
    fn kind(&self) -> DisplayKind {
        DisplayKind::Grayscale
    }

    fn activate(&mut self, ctx: &RawContext, out: &mut Vec<Effect>) {
        self.pending_channel = None;
        self.load.start(ctx.loading_frame, [ctx.channel], out);
    }

    fn handle(&mut self, ctx: &RawContext, event: &LabelEvent, out: &mut Vec<Effect>) {
        match event {
            LabelEvent::LoadFrame { frame } => self.load.start(*frame, [ctx.channel], out),
            // Restart: reload the (possibly new) active channel
            LabelEvent::Channel { channel } => self.load.start(ctx.frame, [*channel], out),
            LabelEvent::LoadChannel { channel } => {
                self.pending_channel = Some(*channel);
                out.push(Effect::ToChannel(*channel, ChannelCommand::Load { frame: ctx.frame }));
            }
            LabelEvent::ChannelLoaded { channel, frame } => {
                self.load.channel_loaded(*channel, *frame, out);
                if self.pending_channel == Some(*channel) && *frame == ctx.frame {
                    self.pending_channel = None;
                    out.push(Effect::Raise(LabelEvent::Channel { channel: *channel }));
                }
            }
            _ => {}
        }
    }
}

/// Shows a set of channel layers, initially every channel
#[derive(Debug)]
pub struct ColorMode {
    layers: BTreeSet<u32>,
    pending_layers: BTreeSet<u32>,
    load: FrameLoad,
}

impl ColorMode {
    pub fn new(num_channels: u32) -> Self {
        Self {
            layers: (0..num_channels).collect(),
            pending_layers: BTreeSet::new(),
            load: FrameLoad::default(),
        }
    }

    pub fn layers(&self) -> Vec<u32> {
        self.layers.iter().copied().collect()
    }
}

impl DisplayMode for ColorMode {
    fn kind(&self) -> DisplayKind {
        DisplayKind::Color
    }

    fn activate(&mut self, ctx: &RawContext, out: &mut Vec<Effect>) {
        self.pending_layers.clear();
        self.load.start(ctx.loading_frame, self.layers.iter().copied(), out);
    }

    fn handle(&mut self, ctx: &RawContext, event: &LabelEvent, out: &mut Vec<Effect>) {
        match event {
            LabelEvent::LoadFrame { frame } => self.load.start(*frame, self.layers.iter().copied(), out),
            LabelEvent::LoadChannel { channel } => {
                if self.layers.contains(channel) {
                    debug!(channel, "Layer already shown");
                    return;
                }
                self.pending_layers.insert(*channel);
                out.push(Effect::ToChannel(*channel, ChannelCommand::Load { frame: ctx.frame }));
            }
            LabelEvent::ChannelLoaded { channel, frame } => {
                self.load.channel_loaded(*channel, *frame, out);
                if *frame == ctx.frame && self.pending_layers.remove(channel) {
                    debug!(channel, "Adding layer");
                    self.layers.insert(*channel);
                }
            }
            _ => {}
        }
    }
}
