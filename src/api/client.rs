//! LabelApi trait definition

use async_trait::async_trait;
use serde_json::Value;

use super::ApiError;
use crate::domain::{EditCursor, ExportFormat};
use crate::events::EditArgs;

/// An exported project fetched from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedExport {
    /// File name taken from the response's content-disposition
    pub filename: String,
    /// Raw export payload
    pub bytes: Vec<u8>,
}

/// The label backend's request surface
///
/// Each call is one HTTP round trip. Callers decide ordering; the
/// ApiCoordinator never has more than one call outstanding.
#[async_trait]
pub trait LabelApi: Send + Sync {
    /// Apply an edit action at the given cursor
    async fn edit(&self, project_id: &str, action: &str, args: &EditArgs, cursor: EditCursor)
    -> Result<Value, ApiError>;

    /// Undo the most recent edit
    async fn undo(&self, project_id: &str) -> Result<Value, ApiError>;

    /// Redo the most recently undone edit
    async fn redo(&self, project_id: &str) -> Result<Value, ApiError>;

    /// Export the project into its bucket
    async fn upload(&self, project_id: &str, bucket: &str, format: ExportFormat) -> Result<Value, ApiError>;

    /// Export the project and return the file
    async fn download(&self, project_id: &str, format: ExportFormat) -> Result<DownloadedExport, ApiError>;
}
