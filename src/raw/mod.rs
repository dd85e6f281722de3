//! Raw image data: channel actors, display modes and frame loading
//!
//! The `RawCoordinator` runs five orthogonal regions side by side:
//!
//! ```text
//!             ┌────────── preload: PRELOAD ⇄ CHANNEL_LOADED per channel
//!             ├────────── frame:   idle → loading ⇄ loaded
//! event ──────┼────────── channel: CHANNEL → parent, loads → display
//!             ├────────── display: grayscale | color (announced on the raw bus)
//!             └────────── restore: SAVE / RESTORE
//! ```
//!
//! Channel actors are spawned once, one per channel, and are only reached
//! through messages.

mod channel;
mod core;
mod display;
mod handle;
mod machine;
mod messages;
mod regions;
mod source;

pub use channel::ChannelHandle;
pub use self::core::RawCoordinator;
pub use handle::RawHandle;
pub use machine::{MachineOutput, RawEffect, RawMachine};
pub use messages::{ChannelCommand, DisplayKind, FrameState, RawSnapshot, RawStatus};
pub use regions::{RawContext, RawReply};
pub use source::{FetchError, FrameSource, HttpFrameSource};

#[cfg(test)]
pub use source::mock;
