//! labelflow - segmentation label editor coordinators
//!
//! CLI entry point for driving the backend and raw data coordinators.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use eyre::{Context, Result, eyre};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use labelflow::api::{
    ApiCoordinator, ApiHandle, DirectorySink, Dispatch, DownloadSink, DownloadedExport, HttpLabelApi,
};
use labelflow::cli::{Cli, Command, OutputFormat};
use labelflow::config::Config;
use labelflow::domain::{ExportFormat, ProjectContext};
use labelflow::events::{BusRegistry, EditArgs, EventLogger, LabelEvent, names, read_event_log};
use labelflow::session::Session;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("labelflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, stdout is for command output
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("labelflow.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;
    info!(base_url = %config.api.base_url, "labelflow loaded config");

    let format = cli.format;
    match cli.command {
        Some(Command::Edit {
            project,
            action,
            args,
            frame,
            feature,
            channel,
        }) => {
            let args: EditArgs = args.into_iter().collect();
            let request = ApiRequestSpec::new(&config, &project);
            let (handle, parent) = request.spawn()?;
            handle.set_frame(frame).await?;
            handle.set_feature(feature).await?;
            handle.set_channel(channel).await?;
            request
                .finish(handle, parent, LabelEvent::Edit { action, args }, &format)
                .await
        }
        Some(Command::Undo { project }) => {
            ApiRequestSpec::new(&config, &project)
                .run(LabelEvent::BackendUndo, &format)
                .await
        }
        Some(Command::Redo { project }) => {
            ApiRequestSpec::new(&config, &project)
                .run(LabelEvent::BackendRedo, &format)
                .await
        }
        Some(Command::Upload { project, bucket, track }) => {
            let mut request = ApiRequestSpec::new(&config, &project);
            request.project.bucket = bucket;
            request.format = ExportFormat::from_track_flag(track || config.api.track);
            request.run(LabelEvent::Upload, &format).await
        }
        Some(Command::Download { project, track, out }) => {
            let mut request = ApiRequestSpec::new(&config, &project);
            request.format = ExportFormat::from_track_flag(track || config.api.track);
            if let Some(dir) = out {
                request.download_dir = dir;
            }
            request.run(LabelEvent::Download, &format).await
        }
        Some(Command::Preload {
            project,
            channels,
            frames,
            timeout,
            event_log,
        }) => cmd_preload(&config, &project, channels, frames, Duration::from_secs(timeout), event_log).await,
        Some(Command::BusLog { path, bus }) => cmd_bus_log(path, bus.as_deref(), &format),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// One backend request driven through an ApiCoordinator
struct ApiRequestSpec<'a> {
    config: &'a Config,
    project: ProjectContext,
    format: ExportFormat,
    download_dir: PathBuf,
    buses: BusRegistry,
}

impl<'a> ApiRequestSpec<'a> {
    fn new(config: &'a Config, project_id: &str) -> Self {
        Self {
            config,
            project: ProjectContext::new(project_id, "", 0, 0),
            format: ExportFormat::from_track_flag(config.api.track),
            download_dir: config.api.download_dir.clone(),
            buses: BusRegistry::new(),
        }
    }

    fn spawn(&self) -> Result<(ApiHandle, mpsc::UnboundedReceiver<LabelEvent>)> {
        let api = HttpLabelApi::from_config(&self.config.api).context("Failed to build API client")?;
        let (parent_tx, parent_rx) = mpsc::unbounded_channel();
        let (handle, _task) = ApiCoordinator::new(
            &self.config.coordinator,
            self.project.clone(),
            self.format,
            Arc::new(api),
            Arc::new(PrintingSink(DirectorySink::new(&self.download_dir))),
            self.buses.bus(names::IMAGE),
            parent_tx,
        )
        .spawn();
        Ok((handle, parent_rx))
    }

    async fn run(self, event: LabelEvent, format: &OutputFormat) -> Result<()> {
        let (handle, parent) = self.spawn()?;
        self.finish(handle, parent, event, format).await
    }

    /// Start `event`, wait for the coordinator to go idle and print what it reported
    async fn finish(
        &self,
        handle: ApiHandle,
        mut parent: mpsc::UnboundedReceiver<LabelEvent>,
        event: LabelEvent,
        format: &OutputFormat,
    ) -> Result<()> {
        let mut image = self.buses.subscribe(names::IMAGE);
        let event_type = event.event_type();

        match handle.request(event).await? {
            Dispatch::Started(state) => info!(event_type, ?state, "Request started"),
            other => return Err(eyre!("{} was not started: {:?}", event_type, other)),
        }
        handle.wait_idle().await?;
        handle.shutdown().await?;

        if let Ok(LabelEvent::Error { error }) = parent.try_recv() {
            return Err(eyre!("{} failed: {}", event_type, error_text(&error)));
        }

        match (image.try_recv(), format) {
            (Some(LabelEvent::Edited { data }), OutputFormat::Json) => {
                println!("{}", serde_json::to_string_pretty(&data)?)
            }
            (Some(LabelEvent::Edited { .. }), OutputFormat::Text) => println!("{} applied", event_type),
            _ => println!("{} complete", event_type),
        }
        Ok(())
    }
}

/// Tells the user where a download went
struct PrintingSink(DirectorySink);

impl DownloadSink for PrintingSink {
    fn save(&self, export: &DownloadedExport) -> std::io::Result<PathBuf> {
        let path = self.0.save(export)?;
        println!("Saved {}", path.display());
        Ok(path)
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Run a session until every channel cached every frame
async fn cmd_preload(
    config: &Config,
    project_id: &str,
    channels: u32,
    frames: u32,
    timeout: Duration,
    event_log: Option<PathBuf>,
) -> Result<()> {
    let project = ProjectContext::new(project_id, "", channels, frames);
    let mut session = Session::from_config(config, project)?;
    if let Some(path) = event_log {
        session.log_events(EventLogger::open(&path).context("Failed to open event log")?);
    }

    let total = channels as usize * frames as usize;
    let mut failed = 0usize;
    let mut last_cached = usize::MAX;
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        while let Some(event) = session.try_next_event() {
            if let LabelEvent::Error { error } = event {
                warn!(error = %error_text(&error), "Frame failed to load");
                eprintln!("error: {}", error_text(&error));
                failed += 1;
            }
        }

        let mut cached = 0;
        for channel in 0..channels {
            if let Some(actor) = session.raw().channel(channel).await? {
                cached += actor.cached_frames().await?.len();
            }
        }
        if cached != last_cached {
            println!("{}/{} frames cached", cached, total);
            last_cached = cached;
        }

        if cached + failed >= total {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            session.shutdown().await?;
            return Err(eyre!("Timed out with {}/{} frames cached", cached, total));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    session.shutdown().await?;
    if failed > 0 {
        return Err(eyre!("{} frames failed to load", failed));
    }
    info!(total, "Preload complete");
    Ok(())
}

/// Print a recorded event log
fn cmd_bus_log(path: Option<PathBuf>, bus: Option<&str>, format: &OutputFormat) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => EventLogger::default_path()?,
    };
    let entries =
        read_event_log(&path).with_context(|| format!("Failed to read event log {}", path.display()))?;

    for entry in entries.iter().filter(|e| bus.is_none_or(|b| e.bus == b)) {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(entry)?),
            OutputFormat::Text => println!(
                "{} {:<14} {}",
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.bus,
                serde_json::to_string(&entry.event)?
            ),
        }
    }
    Ok(())
}
