//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// labelflow - segmentation label editor coordinators
#[derive(Parser)]
#[command(
    name = "labelflow",
    about = "Drive the label editor's backend and raw data coordinators from the command line",
    version,
    after_help = "Logs are written to: ~/.local/share/labelflow/logs/labelflow.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Apply one edit action
    Edit {
        /// Project id
        #[arg(short, long)]
        project: String,

        /// Edit action name (e.g. swap_single_frame)
        action: String,

        /// Action argument as key=value; repeatable
        #[arg(short, long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        args: Vec<(String, Value)>,

        /// Frame the edit applies to
        #[arg(long, default_value = "0")]
        frame: u32,

        /// Feature the edit applies to
        #[arg(long, default_value = "0")]
        feature: u32,

        /// Channel the edit applies to
        #[arg(long, default_value = "0")]
        channel: u32,
    },

    /// Undo the last backend edit
    Undo {
        /// Project id
        #[arg(short, long)]
        project: String,
    },

    /// Redo the last undone backend edit
    Redo {
        /// Project id
        #[arg(short, long)]
        project: String,
    },

    /// Export the project into its bucket
    Upload {
        /// Project id
        #[arg(short, long)]
        project: String,

        /// Destination bucket
        #[arg(short, long)]
        bucket: String,

        /// Export in tracking format
        #[arg(short, long)]
        track: bool,
    },

    /// Export the project and save it locally
    Download {
        /// Project id
        #[arg(short, long)]
        project: String,

        /// Export in tracking format
        #[arg(short, long)]
        track: bool,

        /// Directory to save into (defaults to the configured download dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Load every frame of every channel and report progress
    Preload {
        /// Project id
        #[arg(short, long)]
        project: String,

        /// Number of channels
        #[arg(long)]
        channels: u32,

        /// Number of frames per channel
        #[arg(long)]
        frames: u32,

        /// Give up after this many seconds
        #[arg(long, default_value = "300")]
        timeout: u64,

        /// Record bus traffic to this event log
        #[arg(long)]
        event_log: Option<PathBuf>,
    },

    /// Print a recorded event log
    BusLog {
        /// Log file (defaults to ~/.local/share/labelflow/events.jsonl)
        path: Option<PathBuf>,

        /// Only show events from this bus
        #[arg(short, long)]
        bus: Option<String>,
    },
}

/// Parse `key=value`; the value is JSON when it parses as JSON, else a string
pub fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got: {}", s))?;
    if key.is_empty() {
        return Err(format!("Empty key in: {}", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Output format for command results
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
