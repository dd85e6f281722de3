//! Message types for the raw data coordinator and its channel actors

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::channel::ChannelHandle;
use super::source::FetchError;
use crate::events::LabelEvent;

/// Commands the coordinator sends down to a channel actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Warm the cache with the next uncached frame
    Preload,
    /// Make sure a frame is cached and report it
    Load { frame: u32 },
    ToggleInvert,
    Reset,
}

/// Notifications a channel actor sends back up
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChannelNotice {
    Loaded { channel: u32, frame: u32 },
    Failed { channel: u32, frame: u32, error: String },
}

/// Requests to a channel actor task
#[derive(Debug)]
pub(crate) enum ChannelRequest {
    Command(ChannelCommand),

    /// A fetch started by the actor finished
    Fetched {
        frame: u32,
        result: Result<Vec<u8>, FetchError>,
    },

    /// Frames currently cached, ascending
    CachedFrames { reply_tx: oneshot::Sender<Vec<u32>> },

    /// Cached data of one frame
    Frame {
        frame: u32,
        reply_tx: oneshot::Sender<Option<Arc<Vec<u8>>>>,
    },

    IsInverted { reply_tx: oneshot::Sender<bool> },

    Shutdown,
}

/// State of the frame loading region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameState {
    Idle,
    Loading,
    Loaded,
}

/// Which display mode is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    Grayscale,
    Color,
}

impl DisplayKind {
    pub fn from_grayscale(is_grayscale: bool) -> Self {
        if is_grayscale { DisplayKind::Grayscale } else { DisplayKind::Color }
    }

    /// The event announcing this mode on the raw bus
    pub fn announcement(&self) -> LabelEvent {
        match self {
            DisplayKind::Grayscale => LabelEvent::Grayscale,
            DisplayKind::Color => LabelEvent::Color,
        }
    }
}

/// Saved display selection of the raw data coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub channel: u32,
    #[serde(rename = "isGrayscale")]
    pub is_grayscale: bool,
}

/// Point-in-time view of the raw data coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawStatus {
    pub frame: u32,
    pub loading_frame: u32,
    pub channel: u32,
    pub display: DisplayKind,
    pub frame_state: FrameState,
    /// Channels shown in color mode
    pub layers: Vec<u32>,
    pub channel_names: Vec<String>,
}

/// Internal requests to the raw data coordinator task
#[derive(Debug)]
pub(crate) enum RawRequest {
    Event(LabelEvent),

    /// Capture the display selection
    Save { reply_tx: oneshot::Sender<RawSnapshot> },

    /// Reapply a saved selection; the reply is the `RESTORED` acknowledgment
    Restore {
        snapshot: RawSnapshot,
        reply_tx: oneshot::Sender<LabelEvent>,
    },

    GetStatus { reply_tx: oneshot::Sender<RawStatus> },

    GetChannel {
        channel: u32,
        reply_tx: oneshot::Sender<Option<ChannelHandle>>,
    },

    Shutdown,
}

impl From<LabelEvent> for RawRequest {
    fn from(event: LabelEvent) -> Self {
        RawRequest::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = RawSnapshot {
            channel: 2,
            is_grayscale: true,
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json, serde_json::json!({"channel": 2, "isGrayscale": true}));
    }

    #[test]
    fn test_display_announcement() {
        assert_eq!(DisplayKind::from_grayscale(true), DisplayKind::Grayscale);
        assert_eq!(DisplayKind::Color.announcement(), LabelEvent::Color);
        assert_eq!(DisplayKind::Grayscale.announcement(), LabelEvent::Grayscale);
    }
}
