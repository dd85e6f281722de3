//! The five orthogonal regions of the raw data machine
//!
//! Every region sees the same input and the same context snapshot. A region
//! never writes the context directly; it proposes a [`ContextPatch`] that the
//! machine applies after all regions have reacted.

use tracing::{debug, warn};

use super::messages::{ChannelCommand, DisplayKind, FrameState, RawSnapshot};
use crate::domain::ProjectContext;
use crate::events::LabelEvent;

/// Shared context of the raw data machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContext {
    pub num_channels: u32,
    pub num_frames: u32,
    /// Frame on display
    pub frame: u32,
    /// Frame being fetched
    pub loading_frame: u32,
    /// Active channel
    pub channel: u32,
    pub is_grayscale: bool,
    pub channel_names: Vec<String>,
}

impl RawContext {
    pub fn new(project: &ProjectContext) -> Self {
        Self {
            num_channels: project.num_channels,
            num_frames: project.num_frames,
            frame: 0,
            loading_frame: 0,
            channel: 0,
            is_grayscale: project.num_channels == 1,
            channel_names: project.channel_names(),
        }
    }

    pub fn display(&self) -> DisplayKind {
        DisplayKind::from_grayscale(self.is_grayscale)
    }

    /// Whether `channel` is one of the project's channels
    pub fn has_channel(&self, channel: u32) -> bool {
        channel < self.num_channels
    }
}

/// Input to one machine step
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Event(LabelEvent),
    Save,
    Restore(RawSnapshot),
}

/// Proposed context change; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPatch {
    pub frame: Option<u32>,
    pub loading_frame: Option<u32>,
    pub channel: Option<u32>,
    pub is_grayscale: Option<bool>,
}

impl ContextPatch {
    pub fn apply(&self, ctx: &mut RawContext) {
        if let Some(frame) = self.frame {
            ctx.frame = frame;
        }
        if let Some(loading_frame) = self.loading_frame {
            ctx.loading_frame = loading_frame;
        }
        if let Some(channel) = self.channel {
            ctx.channel = channel;
        }
        if let Some(is_grayscale) = self.is_grayscale {
            ctx.is_grayscale = is_grayscale;
        }
    }
}

/// Replies to ask-style inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawReply {
    Snapshot(RawSnapshot),
    Restored,
}

/// Side effects proposed by regions and display modes
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver to the active display mode, after patches are applied
    ToDisplay(LabelEvent),
    /// Enter the active display mode
    ActivateDisplay,
    ToChannel(u32, ChannelCommand),
    ToActiveChannel(ChannelCommand),
    ToAllChannels(ChannelCommand),
    ToParent(LabelEvent),
    /// Publish on the raw bus
    Publish(LabelEvent),
    /// Queue an event for this machine, processed before the next input
    Raise(LabelEvent),
    Reply(RawReply),
}

/// What one region did with an input
#[derive(Debug, Default)]
pub struct Reaction {
    pub patch: ContextPatch,
    pub effects: Vec<Effect>,
}

impl Reaction {
    fn emit(&mut self, effect: Effect) {
        self.effects.push(effect);
    }
}

/// One orthogonal region
pub trait Region: Send {
    fn name(&self) -> &'static str;

    /// Run entry actions when the machine starts
    fn enter(&mut self, _ctx: &RawContext, _out: &mut Reaction) {}

    fn react(&mut self, ctx: &RawContext, input: &RawInput, out: &mut Reaction);
}

/// Keeps every channel warming its cache in the background
#[derive(Debug, Default)]
pub struct PreloadRegion;

impl Region for PreloadRegion {
    fn name(&self) -> &'static str {
        "preload"
    }

    fn enter(&mut self, _ctx: &RawContext, out: &mut Reaction) {
        out.emit(Effect::ToAllChannels(ChannelCommand::Preload));
    }

    fn react(&mut self, _ctx: &RawContext, input: &RawInput, out: &mut Reaction) {
        if let RawInput::Event(LabelEvent::ChannelLoaded { channel, .. }) = input {
            out.emit(Effect::ToChannel(*channel, ChannelCommand::Preload));
        }
    }
}

/// Sequences frame loads and drops stale channel completions
#[derive(Debug)]
pub struct FrameRegion {
    state: FrameState,
}

impl Default for FrameRegion {
    fn default() -> Self {
        Self {
            state: FrameState::Loading,
        }
    }
}

impl FrameRegion {
    pub fn state(&self) -> FrameState {
        self.state
    }

    fn transition(&mut self, to: FrameState) {
        debug!(from = ?self.state, ?to, "FrameRegion::transition: called");
        self.state = to;
    }
}

impl Region for FrameRegion {
    fn name(&self) -> &'static str {
        "frame"
    }

    fn react(&mut self, ctx: &RawContext, input: &RawInput, out: &mut Reaction) {
        let RawInput::Event(event) = input else {
            return;
        };

        match (self.state, event) {
            // Accepted in any state unless it repeats the frame being loaded
            (_, LabelEvent::LoadFrame { frame }) => {
                if *frame == ctx.loading_frame {
                    debug!(frame, "Frame already loading");
                    return;
                }
                self.transition(FrameState::Loading);
                out.patch.loading_frame = Some(*frame);
                out.emit(Effect::ToDisplay(event.clone()));
            }
            (FrameState::Loading, LabelEvent::ChannelLoaded { frame, .. }) => {
                if *frame == ctx.loading_frame {
                    out.emit(Effect::ToDisplay(event.clone()));
                }
            }
            (FrameState::Loading, LabelEvent::FrameLoaded { .. }) => {
                self.transition(FrameState::Loaded);
                out.emit(Effect::ToParent(LabelEvent::RawLoaded));
            }
            (FrameState::Loaded, LabelEvent::Frame { frame }) => {
                self.transition(FrameState::Idle);
                out.patch.frame = Some(*frame);
                out.emit(Effect::ToDisplay(event.clone()));
            }
            (FrameState::Loaded, LabelEvent::Channel { .. }) => {
                self.transition(FrameState::Loading);
            }
            _ => {}
        }
    }
}

/// Channel selection is owned by the parent; loads go to the display
#[derive(Debug, Default)]
pub struct ChannelRegion;

impl Region for ChannelRegion {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn react(&mut self, _ctx: &RawContext, input: &RawInput, out: &mut Reaction) {
        let RawInput::Event(event) = input else {
            return;
        };

        match event {
            LabelEvent::Channel { .. } => out.emit(Effect::ToParent(event.clone())),
            LabelEvent::LoadChannel { .. } | LabelEvent::ChannelLoaded { .. } => {
                out.emit(Effect::ToDisplay(event.clone()))
            }
            _ => {}
        }
    }
}

/// Chooses between the grayscale and color display modes
#[derive(Debug, Default)]
pub struct DisplayRegion;

impl DisplayRegion {
    fn announce(kind: DisplayKind, out: &mut Reaction) {
        out.patch.is_grayscale = Some(kind == DisplayKind::Grayscale);
        out.emit(Effect::Publish(kind.announcement()));
        out.emit(Effect::ActivateDisplay);
    }
}

impl Region for DisplayRegion {
    fn name(&self) -> &'static str {
        "display"
    }

    fn enter(&mut self, ctx: &RawContext, out: &mut Reaction) {
        Self::announce(ctx.display(), out);
    }

    fn react(&mut self, ctx: &RawContext, input: &RawInput, out: &mut Reaction) {
        let RawInput::Event(event) = input else {
            return;
        };

        match (ctx.display(), event) {
            (current, LabelEvent::ToggleColorMode) => {
                let next = match current {
                    DisplayKind::Grayscale => DisplayKind::Color,
                    DisplayKind::Color => DisplayKind::Grayscale,
                };
                Self::announce(next, out);
            }
            // Re-entering idle restarts the channel even when it is unchanged
            (DisplayKind::Grayscale, LabelEvent::Channel { channel }) => {
                out.patch.channel = Some(*channel);
                out.emit(Effect::ToDisplay(event.clone()));
            }
            (DisplayKind::Grayscale, LabelEvent::Reset) => {
                out.emit(Effect::ToActiveChannel(ChannelCommand::Reset));
            }
            _ => {}
        }
    }
}

/// Save and restore of the display selection
#[derive(Debug, Default)]
pub struct RestoreRegion;

impl Region for RestoreRegion {
    fn name(&self) -> &'static str {
        "restore"
    }

    fn react(&mut self, ctx: &RawContext, input: &RawInput, out: &mut Reaction) {
        match input {
            RawInput::Save => {
                out.emit(Effect::Reply(RawReply::Snapshot(RawSnapshot {
                    channel: ctx.channel,
                    is_grayscale: ctx.is_grayscale,
                })));
            }
            RawInput::Restore(snapshot) => {
                // Switch modes first so the load reaches the restored mode
                if snapshot.is_grayscale != ctx.is_grayscale {
                    out.emit(Effect::Raise(LabelEvent::ToggleColorMode));
                }
                if ctx.has_channel(snapshot.channel) {
                    out.patch.channel = Some(snapshot.channel);
                    out.emit(Effect::Raise(LabelEvent::LoadChannel {
                        channel: snapshot.channel,
                    }));
                } else {
                    warn!(channel = snapshot.channel, num_channels = ctx.num_channels, "Restoring without unknown channel");
                }
                out.emit(Effect::Reply(RawReply::Restored));
            }
            RawInput::Event(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(num_channels: u32) -> RawContext {
        RawContext::new(&ProjectContext::new("p", "b", num_channels, 4))
    }

    fn react(region: &mut dyn Region, ctx: &RawContext, event: LabelEvent) -> Reaction {
        let mut out = Reaction::default();
        region.react(ctx, &RawInput::Event(event), &mut out);
        out
    }

    #[test]
    fn test_context_initial_display() {
        assert!(ctx(1).is_grayscale);
        assert!(!ctx(3).is_grayscale);
        assert_eq!(ctx(2).channel_names, vec!["channel 0", "channel 1"]);
    }

    #[test]
    fn test_frame_region_coalesces_duplicate_loads() {
        let mut region = FrameRegion::default();
        let mut ctx = ctx(2);

        let out = react(&mut region, &ctx, LabelEvent::LoadFrame { frame: 3 });
        assert_eq!(out.patch.loading_frame, Some(3));
        assert_eq!(out.effects, vec![Effect::ToDisplay(LabelEvent::LoadFrame { frame: 3 })]);
        out.patch.apply(&mut ctx);

        let out = react(&mut region, &ctx, LabelEvent::LoadFrame { frame: 3 });
        assert!(out.effects.is_empty());
        assert_eq!(out.patch, ContextPatch::default());
    }

    #[test]
    fn test_frame_region_drops_stale_channel_loads() {
        let mut region = FrameRegion::default();
        let mut ctx = ctx(2);
        ctx.loading_frame = 2;

        let stale = react(&mut region, &ctx, LabelEvent::ChannelLoaded { channel: 0, frame: 1 });
        assert!(stale.effects.is_empty());

        let fresh = react(&mut region, &ctx, LabelEvent::ChannelLoaded { channel: 0, frame: 2 });
        assert_eq!(fresh.effects.len(), 1);
    }

    #[test]
    fn test_frame_region_lifecycle() {
        let mut region = FrameRegion::default();
        let ctx = ctx(2);
        assert_eq!(region.state(), FrameState::Loading);

        // FRAME is only handled once loaded
        assert!(react(&mut region, &ctx, LabelEvent::Frame { frame: 1 }).effects.is_empty());

        let out = react(&mut region, &ctx, LabelEvent::FrameLoaded { frame: 0 });
        assert_eq!(out.effects, vec![Effect::ToParent(LabelEvent::RawLoaded)]);
        assert_eq!(region.state(), FrameState::Loaded);

        let out = react(&mut region, &ctx, LabelEvent::Frame { frame: 1 });
        assert_eq!(out.patch.frame, Some(1));
        assert_eq!(region.state(), FrameState::Idle);

        react(&mut region, &ctx, LabelEvent::FrameLoaded { frame: 0 });
        assert_eq!(region.state(), FrameState::Idle);
    }

    #[test]
    fn test_frame_region_channel_reenters_loading() {
        let mut region = FrameRegion { state: FrameState::Loaded };
        react(&mut region, &ctx(2), LabelEvent::Channel { channel: 1 });
        assert_eq!(region.state(), FrameState::Loading);
    }

    #[test]
    fn test_channel_region_routes() {
        let mut region = ChannelRegion;
        let ctx = ctx(2);

        let out = react(&mut region, &ctx, LabelEvent::Channel { channel: 1 });
        assert_eq!(out.effects, vec![Effect::ToParent(LabelEvent::Channel { channel: 1 })]);

        let out = react(&mut region, &ctx, LabelEvent::LoadChannel { channel: 1 });
        assert_eq!(out.effects, vec![Effect::ToDisplay(LabelEvent::LoadChannel { channel: 1 })]);
    }

    #[test]
    fn test_display_region_toggle() {
        let mut region = DisplayRegion;
        let ctx = ctx(3);

        let out = react(&mut region, &ctx, LabelEvent::ToggleColorMode);
        assert_eq!(out.patch.is_grayscale, Some(true));
        assert_eq!(
            out.effects,
            vec![Effect::Publish(LabelEvent::Grayscale), Effect::ActivateDisplay]
        );
    }

    #[test]
    fn test_display_region_grayscale_only_events() {
        let mut region = DisplayRegion;
        let color = ctx(3);
        assert!(react(&mut region, &color, LabelEvent::Reset).effects.is_empty());
        assert!(react(&mut region, &color, LabelEvent::Channel { channel: 2 }).effects.is_empty());

        let gray = ctx(1);
        let out = react(&mut region, &gray, LabelEvent::Reset);
        assert_eq!(out.effects, vec![Effect::ToActiveChannel(ChannelCommand::Reset)]);

        let out = react(&mut region, &gray, LabelEvent::Channel { channel: 0 });
        assert_eq!(out.patch.channel, Some(0));
        assert_eq!(out.effects, vec![Effect::ToDisplay(LabelEvent::Channel { channel: 0 })]);
    }

    #[test]
    fn test_restore_region_save_and_restore() {
        let mut region = RestoreRegion;
        let ctx = ctx(3);

        let mut out = Reaction::default();
        region.react(&ctx, &RawInput::Save, &mut out);
        assert_eq!(
            out.effects,
            vec![Effect::Reply(RawReply::Snapshot(RawSnapshot {
                channel: 0,
                is_grayscale: false
            }))]
        );

        let mut out = Reaction::default();
        let snapshot = RawSnapshot {
            channel: 2,
            is_grayscale: true,
        };
        region.react(&ctx, &RawInput::Restore(snapshot), &mut out);
        assert_eq!(out.patch.channel, Some(2));
        assert_eq!(
            out.effects,
            vec![
                Effect::Raise(LabelEvent::ToggleColorMode),
                Effect::Raise(LabelEvent::LoadChannel { channel: 2 }),
                Effect::Reply(RawReply::Restored),
            ]
        );
    }
}
