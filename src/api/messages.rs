//! Message types for the ApiCoordinator

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::ApiError;
use crate::events::{EditArgs, LabelEvent};

/// Request lifecycle of the ApiCoordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiState {
    Idle,
    /// An edit, undo or redo is outstanding
    Loading,
    Uploading,
    Downloading,
}

impl ApiState {
    pub fn is_busy(&self) -> bool {
        !matches!(self, ApiState::Idle)
    }
}

/// What the coordinator did with an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A backend request was started; the coordinator entered this state
    Started(ApiState),
    /// A request arrived while another was outstanding and was dropped
    Rejected { busy: ApiState },
    /// The edit cursor was updated
    Applied,
    /// The event is not handled by this coordinator
    Ignored,
}

/// One backend operation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ApiJob {
    Edit { action: String, args: EditArgs },
    Undo,
    Redo,
    Upload,
    Download,
}

impl ApiJob {
    pub(crate) fn from_event(event: &LabelEvent) -> Option<Self> {
        match event {
            LabelEvent::Edit { action, args } => Some(ApiJob::Edit {
                action: action.clone(),
                args: args.clone(),
            }),
            LabelEvent::BackendUndo => Some(ApiJob::Undo),
            LabelEvent::BackendRedo => Some(ApiJob::Redo),
            LabelEvent::Upload => Some(ApiJob::Upload),
            LabelEvent::Download => Some(ApiJob::Download),
            _ => None,
        }
    }

    /// The busy state this job occupies
    pub(crate) fn state(&self) -> ApiState {
        match self {
            ApiJob::Edit { .. } | ApiJob::Undo | ApiJob::Redo => ApiState::Loading,
            ApiJob::Upload => ApiState::Uploading,
            ApiJob::Download => ApiState::Downloading,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            ApiJob::Edit { .. } => "edit",
            ApiJob::Undo => "undo",
            ApiJob::Redo => "redo",
            ApiJob::Upload => "upload",
            ApiJob::Download => "download",
        }
    }
}

/// Result of a finished backend operation
#[derive(Debug)]
pub(crate) enum ApiOutcome {
    /// Edit, undo or redo; carries the backend's response
    Edited(Result<Value, ApiError>),
    Uploaded(Result<Value, ApiError>),
    /// Download; carries where the export was saved
    Downloaded(Result<PathBuf, ApiError>),
}

/// Internal requests to the ApiCoordinator task
#[derive(Debug)]
pub(crate) enum ApiRequest {
    /// An inbound event, optionally acknowledged with what was done
    Event {
        event: LabelEvent,
        ack: Option<oneshot::Sender<Dispatch>>,
    },

    /// A backend operation finished
    Completed { request_id: Uuid, outcome: ApiOutcome },

    /// Get current metrics
    GetMetrics { reply_tx: oneshot::Sender<ApiMetrics> },

    /// Shutdown the coordinator
    Shutdown,
}

impl From<LabelEvent> for ApiRequest {
    fn from(event: LabelEvent) -> Self {
        ApiRequest::Event { event, ack: None }
    }
}

/// ApiCoordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiMetrics {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_states() {
        let edit = ApiJob::from_event(&LabelEvent::Edit {
            action: "fill".to_string(),
            args: EditArgs::new(),
        })
        .unwrap();
        assert_eq!(edit.state(), ApiState::Loading);
        assert_eq!(ApiJob::from_event(&LabelEvent::BackendRedo).unwrap().state(), ApiState::Loading);
        assert_eq!(ApiJob::from_event(&LabelEvent::Upload).unwrap().state(), ApiState::Uploading);
        assert_eq!(ApiJob::from_event(&LabelEvent::Download).unwrap().state(), ApiState::Downloading);
        assert!(ApiJob::from_event(&LabelEvent::Frame { frame: 1 }).is_none());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&ApiState::Downloading).unwrap(), "\"downloading\"");
        assert!(!ApiState::Idle.is_busy());
        assert!(ApiState::Uploading.is_busy());
    }
}
