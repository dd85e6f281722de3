//! SelectMachine - foreground/background label selection
//!
//! Gestures never assign the selection directly. They raise `FOREGROUND` and
//! `BACKGROUND` events that are queued and processed in order; processing one
//! stores it, publishes it and raises the derived `SELECTED`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{LabelId, LabelSet, NO_LABEL};
use crate::events::LabelEvent;

/// Click count reported for a double click
const DOUBLE_CLICK: u32 = 2;

/// Saved selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub foreground: LabelId,
    pub background: LabelId,
}

/// Current selection context
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionState {
    pub foreground: LabelId,
    pub background: LabelId,
    /// Label under the pointer, if any
    pub hovering: Option<LabelId>,
    /// Foreground when set, else background
    pub selected: LabelId,
    pub labels: LabelSet,
}

/// Selection state machine
#[derive(Debug, Default)]
pub struct SelectMachine {
    state: SelectionState,
}

impl SelectMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Initial selection: foreground 1, background 0
    pub fn start(&mut self) -> Vec<LabelEvent> {
        self.run([
            LabelEvent::Foreground { foreground: 1 },
            LabelEvent::Background {
                background: NO_LABEL,
            },
        ])
    }

    /// Handle one event, returning the events to publish
    pub fn dispatch(&mut self, event: LabelEvent) -> Vec<LabelEvent> {
        self.run([event])
    }

    pub fn save(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            foreground: self.state.foreground,
            background: self.state.background,
        }
    }

    pub fn restore(&mut self, snapshot: SelectionSnapshot) -> Vec<LabelEvent> {
        debug!(?snapshot, "SelectMachine::restore: called");
        self.run([
            LabelEvent::Foreground {
                foreground: snapshot.foreground,
            },
            LabelEvent::Background {
                background: snapshot.background,
            },
        ])
    }

    fn run(&mut self, events: impl IntoIterator<Item = LabelEvent>) -> Vec<LabelEvent> {
        let mut queue: VecDeque<LabelEvent> = events.into_iter().collect();
        let mut published = Vec::new();
        while let Some(event) = queue.pop_front() {
            self.step(event, &mut queue, &mut published);
        }
        published
    }

    fn derived_selected(&self) -> LabelId {
        if self.state.foreground == NO_LABEL {
            self.state.background
        } else {
            self.state.foreground
        }
    }

    fn step(&mut self, event: LabelEvent, queue: &mut VecDeque<LabelEvent>, published: &mut Vec<LabelEvent>) {
        let state = &self.state;
        match event {
            LabelEvent::Foreground { foreground } => {
                self.state.foreground = foreground;
                queue.push_back(LabelEvent::Selected {
                    selected: self.derived_selected(),
                });
                published.push(event);
            }
            LabelEvent::Background { background } => {
                self.state.background = background;
                queue.push_back(LabelEvent::Selected {
                    selected: self.derived_selected(),
                });
                published.push(event);
            }
            LabelEvent::Selected { selected } => {
                self.state.selected = selected;
                published.push(event);
            }

            LabelEvent::Hovering { hovering } => self.state.hovering = hovering,
            LabelEvent::Labels { labels } => self.state.labels = labels,

            LabelEvent::ShiftClick { detail } => {
                let Some(hovering) = state.hovering else {
                    debug!("Shift click with nothing hovered");
                    return;
                };
                if detail == DOUBLE_CLICK {
                    self.select_foreground(hovering, queue);
                    queue.push_back(LabelEvent::Background {
                        background: NO_LABEL,
                    });
                } else if hovering == state.background {
                    self.select_foreground(hovering, queue);
                } else {
                    self.select_background(hovering, queue);
                }
            }
            LabelEvent::SelectForeground => match state.hovering {
                Some(hovering) => self.select_foreground(hovering, queue),
                None => debug!("Select foreground with nothing hovered"),
            },
            LabelEvent::SelectBackground => match state.hovering {
                Some(hovering) => self.select_background(hovering, queue),
                None => debug!("Select background with nothing hovered"),
            },
            LabelEvent::SetForeground { foreground } => {
                queue.push_back(LabelEvent::Foreground { foreground });
            }

            LabelEvent::Switch => {
                queue.push_back(LabelEvent::Foreground {
                    foreground: state.background,
                });
                queue.push_back(LabelEvent::Background {
                    background: state.foreground,
                });
            }
            LabelEvent::NewForeground => {
                queue.push_back(LabelEvent::Foreground {
                    foreground: state.labels.new_label(),
                });
            }
            LabelEvent::ResetForeground => {
                queue.push_back(LabelEvent::Foreground { foreground: NO_LABEL });
            }
            LabelEvent::ResetBackground => {
                queue.push_back(LabelEvent::Background { background: NO_LABEL });
            }

            LabelEvent::PrevForeground => {
                if let Some(foreground) = state.labels.prev_label(state.foreground) {
                    queue.push_back(LabelEvent::Foreground { foreground });
                }
            }
            LabelEvent::NextForeground => {
                if let Some(foreground) = state.labels.next_label(state.foreground) {
                    queue.push_back(LabelEvent::Foreground { foreground });
                }
            }
            LabelEvent::PrevBackground => {
                if let Some(background) = state.labels.prev_label(state.background) {
                    queue.push_back(LabelEvent::Background { background });
                }
            }
            LabelEvent::NextBackground => {
                if let Some(background) = state.labels.next_label(state.background) {
                    queue.push_back(LabelEvent::Background { background });
                }
            }

            other => debug!(event_type = other.event_type(), "SelectMachine: ignoring event"),
        }
    }

    /// Promote `hovering` to foreground; clicking the background swaps
    fn select_foreground(&self, hovering: LabelId, queue: &mut VecDeque<LabelEvent>) {
        let background = if hovering == self.state.background {
            self.state.foreground
        } else {
            self.state.background
        };
        queue.push_back(LabelEvent::Foreground { foreground: hovering });
        queue.push_back(LabelEvent::Background { background });
    }

    /// Make `hovering` the background; clicking the foreground swaps
    fn select_background(&self, hovering: LabelId, queue: &mut VecDeque<LabelEvent>) {
        let foreground = if hovering == self.state.foreground {
            self.state.background
        } else {
            self.state.foreground
        };
        queue.push_back(LabelEvent::Background { background: hovering });
        queue.push_back(LabelEvent::Foreground { foreground });
    }
}
