//! Event buses connecting the coordinators
//!
//! Coordinators never hold references to each other. A coordinator that
//! needs to tell its peers something publishes on a named bus; peers that
//! care subscribe to that bus.
//!
//! # Architecture
//!
//! ```text
//!   canvas ──┐        labeled ──┐
//!            ▼                  ▼
//!      ┌───────────────────────────┐      selectedCells
//!      │   SelectionCoordinator    │ ───────────────────▶ renderers
//!      └───────────────────────────┘
//!
//!      ┌───────────────────────────┐        image
//!      │      ApiCoordinator       │ ───────────────────▶ EDITED consumers
//!      └───────────────────────────┘
//!
//!      ┌───────────────────────────┐         raw
//!      │    RawDataCoordinator     │ ───────────────────▶ COLOR / GRAYSCALE
//!      └───────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use labelflow::events::{BusRegistry, LabelEvent, names};
//!
//! let buses = BusRegistry::new();
//! let mut rx = buses.subscribe(names::RAW);
//! buses.publish(names::RAW, LabelEvent::Color);
//! assert_eq!(rx.try_recv(), Some(LabelEvent::Color));
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{BusRegistry, EventBus, Subscription, SubscriptionId, forward, names};
pub use logger::{EventLogger, read_event_log, spawn_event_logger};
pub use types::{EditArgs, EventLogEntry, LabelEvent};
