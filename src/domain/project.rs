//! Project context and edit cursor

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable facts about the project being edited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Opaque backend identifier of the project
    #[serde(rename = "project-id")]
    pub project_id: String,

    /// Storage location the project exports to
    pub bucket: String,

    /// Number of raw image channels
    #[serde(rename = "num-channels")]
    pub num_channels: u32,

    /// Number of frames per channel
    #[serde(rename = "num-frames")]
    pub num_frames: u32,
}

impl ProjectContext {
    pub fn new(project_id: impl Into<String>, bucket: impl Into<String>, num_channels: u32, num_frames: u32) -> Self {
        Self {
            project_id: project_id.into(),
            bucket: bucket.into(),
            num_channels,
            num_frames,
        }
    }

    /// Display names of the channels ("channel 0", "channel 1", ...)
    pub fn channel_names(&self) -> Vec<String> {
        (0..self.num_channels).map(|i| format!("channel {}", i)).collect()
    }
}

/// Position in the project that edits apply to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCursor {
    pub frame: u32,
    pub feature: u32,
    pub channel: u32,
}

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Tracking format
    Trk,
    /// Numpy archive
    Npz,
}

impl ExportFormat {
    /// `trk` when the project is opened for tracking, otherwise `npz`
    pub fn from_track_flag(track: bool) -> Self {
        if track { ExportFormat::Trk } else { ExportFormat::Npz }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Trk => "trk",
            ExportFormat::Npz => "npz",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        let project = ProjectContext::new("abc", "bucket", 3, 10);
        assert_eq!(project.channel_names(), vec!["channel 0", "channel 1", "channel 2"]);
    }

    #[test]
    fn test_export_format_from_track_flag() {
        assert_eq!(ExportFormat::from_track_flag(true), ExportFormat::Trk);
        assert_eq!(ExportFormat::from_track_flag(false).to_string(), "npz");
    }

    #[test]
    fn test_project_serialization() {
        let project = ProjectContext::new("abc", "gs://bucket", 2, 5);
        let json = serde_json::to_string(&project).unwrap();
        assert!(json.contains("project-id"));
        assert!(json.contains("num-channels"));
    }
}
