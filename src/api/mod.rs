//! Label backend access
//!
//! The `ApiCoordinator` turns edit, undo/redo, upload and download events into
//! backend calls, one at a time:
//!
//! ```text
//! idle ──EDIT/UNDO/REDO──▶ loading ─────┐
//!   │ ──UPLOAD──────────▶ uploading ───┼──▶ idle  (EDITED on the image bus,
//!   │ ──DOWNLOAD────────▶ downloading ─┘           ERROR to the parent)
//!   └── FRAME/FEATURE/CHANNEL update the edit cursor in any state
//! ```
//!
//! The backend itself sits behind the [`LabelApi`] trait; [`HttpLabelApi`] is
//! the reqwest implementation of its wire contract.

mod client;
mod core;
mod error;
mod handle;
mod http;
mod messages;
mod sink;

pub use client::{DownloadedExport, LabelApi};
pub use self::core::ApiCoordinator;
pub use error::ApiError;
pub use handle::ApiHandle;
pub use http::{HttpLabelApi, check_response, edit_form, filename_from_disposition};
pub use messages::{ApiMetrics, ApiState, Dispatch};
pub use sink::{DirectorySink, DownloadSink};

#[cfg(test)]
pub use client::mock;
