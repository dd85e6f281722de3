//! Domain types shared by the coordinators
//!
//! Project facts, the edit cursor, export formats and the label set.

mod labels;
mod project;

pub use labels::{LabelId, LabelSet, NO_LABEL};
pub use project::{EditCursor, ExportFormat, ProjectContext};
