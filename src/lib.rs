//! labelflow - coordinators for an interactive segmentation label editor
//!
//! labelflow is the orchestration layer between an image-labeling UI and its
//! backend. Independent actors own their state and talk to each other only
//! through named event buses.
//!
//! # Core Concepts
//!
//! - **Single-flight API**: one backend edit, undo, redo, upload or download at a time
//! - **Parallel regions**: raw data loading is a set of small state machines advanced together
//! - **Preloading**: one actor per image channel warms its frame cache in the background
//! - **Selection**: foreground/background labels with cycling and swap gestures
//!
//! # Modules
//!
//! - [`events`] - Event vocabulary, buses and the event log
//! - [`api`] - Backend request coordinator
//! - [`raw`] - Raw image data coordinator and channel actors
//! - [`select`] - Label selection coordinator
//! - [`session`] - All coordinators wired together
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod raw;
pub mod select;
pub mod session;

// Re-export commonly used types
pub use api::{ApiCoordinator, ApiError, ApiHandle, ApiState, LabelApi};
pub use config::Config;
pub use domain::{EditCursor, ExportFormat, LabelId, LabelSet, ProjectContext};
pub use events::{BusRegistry, EventBus, LabelEvent};
pub use raw::{FrameSource, RawCoordinator, RawHandle, RawSnapshot};
pub use select::{SelectCoordinator, SelectHandle, SelectionSnapshot};
pub use session::{Session, SessionServices, SessionSnapshot};
