//! Foreground/background label selection
//!
//! The `SelectCoordinator` listens to hover and label-set updates, applies
//! selection gestures and publishes `FOREGROUND`, `BACKGROUND` and `SELECTED`
//! on the selected-cells bus.

mod core;
mod handle;
mod machine;

pub use self::core::SelectCoordinator;
pub use handle::SelectHandle;
pub use machine::{SelectMachine, SelectionSnapshot, SelectionState};
