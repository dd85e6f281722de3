//! Event Logger - persists bus traffic to a JSONL file
//!
//! The EventLogger subscribes to one or more buses and appends every event,
//! with its bus name and a timestamp, to a single log file for debugging
//! and replay.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::bus::Subscription;
use super::types::{EventLogEntry, LabelEvent};

/// Event logger that writes events to a JSONL file
pub struct EventLogger {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl EventLogger {
    /// Open (or create) the log file in append mode
    pub fn open(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "EventLogger::open: opening log file");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Default log location (~/.local/share/labelflow/events.jsonl)
    pub fn default_path() -> eyre::Result<PathBuf> {
        let data_dir = dirs::data_local_dir().ok_or_else(|| eyre::eyre!("Could not determine data directory"))?;
        Ok(data_dir.join("labelflow").join("events.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event to the log
    pub fn write_event(&mut self, bus: &str, event: &LabelEvent) -> eyre::Result<()> {
        debug!(%bus, event_type = event.event_type(), "EventLogger::write_event");
        let entry = EventLogEntry::new(bus, event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Run the logger until every subscription ends
    ///
    /// This is meant to be spawned as a background task.
    pub async fn run(mut self, subscriptions: Vec<Subscription>) {
        debug!(count = subscriptions.len(), "EventLogger::run: starting event logger");
        let mut events = futures::stream::select_all(subscriptions.into_iter().map(|s| Box::pin(s.into_stream())));

        while let Some((bus, event)) = events.next().await {
            if let Err(e) = self.write_event(&bus, &event) {
                error!(%bus, error = %e, "EventLogger: failed to write event");
            }
        }

        debug!("EventLogger: all subscriptions closed, shutting down");
        let _ = self.writer.flush();
    }
}

/// Spawn a logger over the given subscriptions
pub fn spawn_event_logger(logger: EventLogger, subscriptions: Vec<Subscription>) -> JoinHandle<()> {
    tokio::spawn(logger.run(subscriptions))
}

/// Read every entry back from a log file
///
/// Malformed lines are skipped.
pub fn read_event_log(path: impl AsRef<Path>) -> eyre::Result<Vec<EventLogEntry>> {
    let path = path.as_ref();
    debug!(?path, "read_event_log: reading log file");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => debug!(error = %e, "read_event_log: skipping malformed line"),
        }
    }

    Ok(entries)
}
