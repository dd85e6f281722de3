//! Event types exchanged between coordinators
//!
//! These events are the whole vocabulary of the editor's orchestration layer:
//! - API intents and results (edit, undo/redo, upload/download)
//! - Edit cursor updates (frame, feature, channel)
//! - Raw data loading (frame/channel loads, display mode toggles)
//! - Label selection gestures and announcements

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LabelId, LabelSet};

/// Named arguments of an `EDIT` action, sent form-encoded to the backend
pub type EditArgs = BTreeMap<String, serde_json::Value>;

/// Core event enum, tagged by `type` with the wire names
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelEvent {
    // === API intents ===
    /// Apply an edit action at the current cursor
    Edit {
        action: String,
        #[serde(default)]
        args: EditArgs,
    },
    /// Undo the last backend edit
    BackendUndo,
    /// Redo the last undone backend edit
    BackendRedo,
    /// Export the project to its bucket
    Upload,
    /// Export the project and save it locally
    Download,

    // === Edit cursor ===
    Frame { frame: u32 },
    Feature { feature: u32 },
    Channel { channel: u32 },

    // === Raw data ===
    LoadFrame { frame: u32 },
    LoadChannel { channel: u32 },
    ChannelLoaded { channel: u32, frame: u32 },
    FrameLoaded { frame: u32 },
    ToggleColorMode,
    ToggleInvert,
    Reset,
    AddLayer,

    // === Selection ===
    ShiftClick { detail: u32 },
    Hovering { hovering: Option<LabelId> },
    Labels { labels: LabelSet },
    SelectForeground,
    SelectBackground,
    SetForeground { foreground: LabelId },
    Switch,
    NewForeground,
    ResetForeground,
    ResetBackground,
    PrevForeground,
    NextForeground,
    PrevBackground,
    NextBackground,

    // === Outbound ===
    /// A backend edit/undo/redo completed; carries the backend's response
    Edited { data: serde_json::Value },
    /// A request failed; carries the error payload
    Error { error: serde_json::Value },
    /// Every channel the active display needs has the requested frame
    RawLoaded,
    /// A restore request has been applied
    Restored,
    Foreground { foreground: LabelId },
    Background { background: LabelId },
    Selected { selected: LabelId },
    /// Color display mode became active
    Color,
    /// Grayscale display mode became active
    Grayscale,
}

impl LabelEvent {
    /// Get the wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            LabelEvent::Edit { .. } => "EDIT",
            LabelEvent::BackendUndo => "BACKEND_UNDO",
            LabelEvent::BackendRedo => "BACKEND_REDO",
            LabelEvent::Upload => "UPLOAD",
            LabelEvent::Download => "DOWNLOAD",
            LabelEvent::Frame { .. } => "FRAME",
            LabelEvent::Feature { .. } => "FEATURE",
            LabelEvent::Channel { .. } => "CHANNEL",
            LabelEvent::LoadFrame { .. } => "LOAD_FRAME",
            LabelEvent::LoadChannel { .. } => "LOAD_CHANNEL",
            LabelEvent::ChannelLoaded { .. } => "CHANNEL_LOADED",
            LabelEvent::FrameLoaded { .. } => "FRAME_LOADED",
            LabelEvent::ToggleColorMode => "TOGGLE_COLOR_MODE",
            LabelEvent::ToggleInvert => "TOGGLE_INVERT",
            LabelEvent::Reset => "RESET",
            LabelEvent::AddLayer => "ADD_LAYER",
            LabelEvent::ShiftClick { .. } => "SHIFT_CLICK",
            LabelEvent::Hovering { .. } => "HOVERING",
            LabelEvent::Labels { .. } => "LABELS",
            LabelEvent::SelectForeground => "SELECT_FOREGROUND",
            LabelEvent::SelectBackground => "SELECT_BACKGROUND",
            LabelEvent::SetForeground { .. } => "SET_FOREGROUND",
            LabelEvent::Switch => "SWITCH",
            LabelEvent::NewForeground => "NEW_FOREGROUND",
            LabelEvent::ResetForeground => "RESET_FOREGROUND",
            LabelEvent::ResetBackground => "RESET_BACKGROUND",
            LabelEvent::PrevForeground => "PREV_FOREGROUND",
            LabelEvent::NextForeground => "NEXT_FOREGROUND",
            LabelEvent::PrevBackground => "PREV_BACKGROUND",
            LabelEvent::NextBackground => "NEXT_BACKGROUND",
            LabelEvent::Edited { .. } => "EDITED",
            LabelEvent::Error { .. } => "ERROR",
            LabelEvent::RawLoaded => "RAW_LOADED",
            LabelEvent::Restored => "RESTORED",
            LabelEvent::Foreground { .. } => "FOREGROUND",
            LabelEvent::Background { .. } => "BACKGROUND",
            LabelEvent::Selected { .. } => "SELECTED",
            LabelEvent::Color => "COLOR",
            LabelEvent::Grayscale => "GRAYSCALE",
        }
    }

    /// Whether this event starts a backend request on the API coordinator
    pub fn is_api_request(&self) -> bool {
        matches!(
            self,
            LabelEvent::Edit { .. }
                | LabelEvent::BackendUndo
                | LabelEvent::BackendRedo
                | LabelEvent::Upload
                | LabelEvent::Download
        )
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Name of the bus the event was published on
    pub bus: String,
    /// The event
    pub event: LabelEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(bus: impl Into<String>, event: LabelEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            bus: bus.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde_tags() {
        let events = vec![
            LabelEvent::BackendUndo,
            LabelEvent::LoadFrame { frame: 3 },
            LabelEvent::ChannelLoaded { channel: 1, frame: 2 },
            LabelEvent::ToggleColorMode,
            LabelEvent::ShiftClick { detail: 2 },
            LabelEvent::NextBackground,
            LabelEvent::RawLoaded,
            LabelEvent::Selected { selected: 4 },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn test_edit_event_deserializes_without_args() {
        let event: LabelEvent = serde_json::from_str(r#"{"type":"EDIT","action":"swap_single_frame"}"#).unwrap();
        match event {
            LabelEvent::Edit { action, args } => {
                assert_eq!(action, "swap_single_frame");
                assert!(args.is_empty());
            }
            _ => panic!("Expected Edit event"),
        }
    }

    #[test]
    fn test_is_api_request() {
        assert!(LabelEvent::Download.is_api_request());
        assert!(LabelEvent::BackendRedo.is_api_request());
        assert!(!LabelEvent::Frame { frame: 0 }.is_api_request());
        assert!(!LabelEvent::Edited { data: serde_json::json!({}) }.is_api_request());
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = EventLogEntry::new("raw", LabelEvent::Grayscale);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"ts\""));
        assert!(json.contains("\"bus\":\"raw\""));
        assert!(json.contains("GRAYSCALE"));
    }
}
