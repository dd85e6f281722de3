//! Session - one editor session's coordinators wired together
//!
//! A session owns the bus registry, the three coordinators and the forwarding
//! tasks between them. Everything the coordinators report upward (errors,
//! `RAW_LOADED`, `CHANNEL`, `ADD_LAYER`) and every completed edit on the image
//! bus lands on a single parent event stream.

use std::sync::Arc;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiCoordinator, ApiHandle, DirectorySink, DownloadSink, HttpLabelApi, LabelApi};
use crate::config::Config;
use crate::domain::{ExportFormat, ProjectContext};
use crate::events::{BusRegistry, EventLogger, LabelEvent, forward, names, spawn_event_logger};
use crate::raw::{FrameSource, HttpFrameSource, RawCoordinator, RawHandle, RawSnapshot};
use crate::select::{SelectCoordinator, SelectHandle, SelectionSnapshot};

/// External collaborators a session talks to
#[derive(Clone)]
pub struct SessionServices {
    pub api: Arc<dyn LabelApi>,
    pub sink: Arc<dyn DownloadSink>,
    pub frames: Arc<dyn FrameSource>,
}

impl SessionServices {
    /// HTTP backend, directory sink and HTTP frame source from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        debug!("SessionServices::from_config: called");
        let api = HttpLabelApi::from_config(&config.api).context("Failed to build API client")?;
        let frames = HttpFrameSource::from_config(&config.raw, &config.api.base_url)
            .context("Failed to build frame source")?;
        Ok(Self {
            api: Arc::new(api),
            sink: Arc::new(DirectorySink::new(&config.api.download_dir)),
            frames: Arc::new(frames),
        })
    }
}

/// Saved state of the raw and selection coordinators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub raw: RawSnapshot,
    pub selection: SelectionSnapshot,
}

/// A running editor session
pub struct Session {
    buses: Arc<BusRegistry>,
    api: ApiHandle,
    raw: RawHandle,
    select: SelectHandle,
    events: mpsc::UnboundedReceiver<LabelEvent>,
    coordinators: Vec<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
}

impl Session {
    /// Build the buses and spawn every coordinator
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &Config, project: ProjectContext, services: SessionServices) -> Self {
        info!(project_id = %project.project_id, "Starting session");
        let buses = Arc::new(BusRegistry::new());
        let (parent_tx, events) = mpsc::unbounded_channel();

        let (api, api_task) = ApiCoordinator::new(
            &config.coordinator,
            project.clone(),
            ExportFormat::from_track_flag(config.api.track),
            services.api,
            services.sink,
            buses.bus(names::IMAGE),
            parent_tx.clone(),
        )
        .spawn();

        let (raw, raw_task) = RawCoordinator::new(
            &config.coordinator,
            project,
            services.frames,
            buses.bus(names::RAW),
            parent_tx.clone(),
        )
        .spawn();

        let (select, select_task) =
            SelectCoordinator::new(&config.coordinator, buses.bus(names::SELECTED_CELLS)).spawn();

        let forwarders = vec![
            forward(buses.subscribe(names::API), api.sender()),
            // One queue for both buses so label updates and gestures keep publish order
            forward(buses.subscribe_many(&[names::CANVAS, names::LABELED]), select.sender()),
            spawn_image_relay(&buses, parent_tx),
        ];

        Self {
            buses,
            api,
            raw,
            select,
            events,
            coordinators: vec![api_task, raw_task, select_task],
            forwarders,
        }
    }

    /// Start a session against the configured backend
    pub fn from_config(config: &Config, project: ProjectContext) -> Result<Self> {
        let services = SessionServices::from_config(config)?;
        Ok(Self::start(config, project, services))
    }

    pub fn buses(&self) -> &BusRegistry {
        &self.buses
    }

    pub fn api(&self) -> &ApiHandle {
        &self.api
    }

    pub fn raw(&self) -> &RawHandle {
        &self.raw
    }

    pub fn select(&self) -> &SelectHandle {
        &self.select
    }

    /// Record every bus of the session into an event log
    pub fn log_events(&mut self, logger: EventLogger) {
        info!(path = %logger.path().display(), "Logging session events");
        let subscriptions = [
            names::API,
            names::IMAGE,
            names::RAW,
            names::SELECTED_CELLS,
            names::CANVAS,
            names::LABELED,
        ]
        .into_iter()
        .map(|name| self.buses.subscribe(name))
        .collect();
        self.forwarders.push(spawn_event_logger(logger, subscriptions));
    }

    /// Route an intent to the coordinator that handles it
    ///
    /// `FRAME` and `CHANNEL` move both the edit cursor and the raw display.
    pub async fn dispatch(&self, event: LabelEvent) -> Result<()> {
        debug!(event_type = event.event_type(), "Session::dispatch: called");
        if event.is_api_request() {
            return self.api.send(event).await;
        }

        match &event {
            LabelEvent::Frame { .. } | LabelEvent::Channel { .. } => {
                self.api.send(event.clone()).await?;
                self.raw.send(event).await
            }
            LabelEvent::Feature { .. } => self.api.send(event).await,
            LabelEvent::LoadFrame { .. }
            | LabelEvent::LoadChannel { .. }
            | LabelEvent::ToggleColorMode
            | LabelEvent::ToggleInvert
            | LabelEvent::Reset
            | LabelEvent::AddLayer => self.raw.send(event).await,
            LabelEvent::ShiftClick { .. }
            | LabelEvent::Hovering { .. }
            | LabelEvent::Labels { .. }
            | LabelEvent::SelectForeground
            | LabelEvent::SelectBackground
            | LabelEvent::SetForeground { .. }
            | LabelEvent::Switch
            | LabelEvent::NewForeground
            | LabelEvent::ResetForeground
            | LabelEvent::ResetBackground
            | LabelEvent::PrevForeground
            | LabelEvent::NextForeground
            | LabelEvent::PrevBackground
            | LabelEvent::NextBackground => self.select.send(event).await,
            other => {
                warn!(event_type = other.event_type(), "Session::dispatch: no coordinator takes this event");
                Ok(())
            }
        }
    }

    /// Next event reported to the session's parent
    pub async fn next_event(&mut self) -> Option<LabelEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<LabelEvent> {
        self.events.try_recv().ok()
    }

    /// Capture display channel, display mode and label selection
    pub async fn save(&self) -> Result<SessionSnapshot> {
        debug!("Session::save: called");
        Ok(SessionSnapshot {
            raw: self.raw.save().await?,
            selection: self.select.save().await?,
        })
    }

    /// Reapply a snapshot; resolves once both coordinators acknowledged
    pub async fn restore(&self, snapshot: SessionSnapshot) -> Result<()> {
        debug!(?snapshot, "Session::restore: called");
        self.raw.restore(snapshot.raw).await?;
        self.select.restore(snapshot.selection).await
    }

    /// Stop the coordinators and wait for them to finish
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down session");
        for task in &self.forwarders {
            task.abort();
        }

        // An already stopped coordinator is fine
        if let Err(e) = self.api.shutdown().await {
            debug!(error = %e, "Session::shutdown: api coordinator already stopped");
        }
        if let Err(e) = self.raw.shutdown().await {
            debug!(error = %e, "Session::shutdown: raw coordinator already stopped");
        }
        if let Err(e) = self.select.shutdown().await {
            debug!(error = %e, "Session::shutdown: select coordinator already stopped");
        }

        for task in self.coordinators {
            task.await.context("Coordinator task panicked")?;
        }
        info!("Session stopped");
        Ok(())
    }
}

/// Republish image-bus events on the parent stream
fn spawn_image_relay(buses: &BusRegistry, parent: mpsc::UnboundedSender<LabelEvent>) -> JoinHandle<()> {
    let mut image = buses.subscribe(names::IMAGE);
    tokio::spawn(async move {
        while let Some(event) = image.recv().await {
            if parent.send(event).is_err() {
                debug!("image relay: parent stream closed");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockLabelApi, MockReply};
    use crate::domain::LabelSet;
    use crate::events::read_event_log;
    use crate::raw::mock::MockFrameSource;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        session: Session,
        api: Arc<MockLabelApi>,
        _downloads: TempDir,
    }

    fn start_with(api: MockLabelApi, frames: MockFrameSource, num_channels: u32) -> Fixture {
        let downloads = TempDir::new().unwrap();
        let api = Arc::new(api);
        let services = SessionServices {
            api: api.clone(),
            sink: Arc::new(DirectorySink::new(downloads.path())),
            frames: Arc::new(frames),
        };
        let project = ProjectContext::new("proj", "bucket", num_channels, 3);
        Fixture {
            session: Session::start(&Config::default(), project, services),
            api,
            _downloads: downloads,
        }
    }

    async fn wait_for(session: &mut Session, matches: impl Fn(&LabelEvent) -> bool) -> LabelEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = session.next_event().await.expect("parent stream closed");
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for parent event")
    }

    #[tokio::test]
    async fn test_edit_result_reaches_parent_stream() {
        let mut fx = start_with(
            MockLabelApi::new(vec![MockReply::Json(json!({"imgs": [1]}))]),
            MockFrameSource::new(),
            2,
        );

        fx.session
            .dispatch(LabelEvent::Edit {
                action: "swap".to_string(),
                args: Default::default(),
            })
            .await
            .unwrap();

        let event = wait_for(&mut fx.session, |e| matches!(e, LabelEvent::Edited { .. })).await;
        assert_eq!(event, LabelEvent::Edited { data: json!({"imgs": [1]}) });
        fx.session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cursor_events_do_not_start_requests() {
        let fx = start_with(MockLabelApi::new(vec![]), MockFrameSource::new(), 1);

        fx.session.dispatch(LabelEvent::Feature { feature: 1 }).await.unwrap();
        fx.session.dispatch(LabelEvent::Channel { channel: 0 }).await.unwrap();
        fx.session.dispatch(LabelEvent::BackendUndo).await.unwrap();
        // Mailbox order: the metrics reply comes after the undo was started
        let metrics = fx.session.api().metrics().await.unwrap();
        assert_eq!(metrics.started, 1);
        fx.session.api().wait_idle().await.unwrap();
        assert_eq!(fx.api.call_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_reaches_parent_stream() {
        let mut fx = start_with(
            MockLabelApi::new(vec![MockReply::Fail {
                status: 400,
                body: json!({"error": "bad frame"}),
            }]),
            MockFrameSource::new(),
            1,
        );

        fx.session.api().edit("draw", Default::default()).await.unwrap();
        let event = wait_for(&mut fx.session, |e| matches!(e, LabelEvent::Error { .. })).await;
        assert_eq!(event, LabelEvent::Error { error: json!("bad frame") });
    }

    #[tokio::test]
    async fn test_raw_loaded_reaches_parent_stream() {
        let mut fx = start_with(MockLabelApi::new(vec![]), MockFrameSource::new(), 2);
        wait_for(&mut fx.session, |e| *e == LabelEvent::RawLoaded).await;
    }

    #[tokio::test]
    async fn test_canvas_and_labeled_buses_drive_selection() {
        let fx = start_with(MockLabelApi::new(vec![]), MockFrameSource::new(), 1);
        let mut selected = fx.session.buses().subscribe(names::SELECTED_CELLS);

        fx.session.buses().publish(
            names::LABELED,
            LabelEvent::Labels {
                labels: LabelSet::from_ids([1, 2, 7]),
            },
        );
        fx.session
            .buses()
            .publish(names::CANVAS, LabelEvent::Hovering { hovering: Some(7) });
        fx.session.buses().publish(names::CANVAS, LabelEvent::SelectForeground);

        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = selected.recv().await {
                if event == (LabelEvent::Foreground { foreground: 7 }) {
                    break;
                }
            }
        })
        .await
        .unwrap();

        let state = fx.session.select().state().await.unwrap();
        assert_eq!(state.foreground, 7);
        assert_eq!(state.selected, 7);
        assert!(state.labels.contains(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_new_foreground_sees_labels_published_just_before() {
        for i in 0..50u32 {
            let fx = start_with(MockLabelApi::new(vec![]), MockFrameSource::new(), 1);
            // The state reply follows the startup selection, so it is not seen below
            fx.session.select().state().await.unwrap();
            let mut selected = fx.session.buses().subscribe(names::SELECTED_CELLS);
            let largest = 100 + i;

            fx.session.buses().publish(
                names::LABELED,
                LabelEvent::Labels {
                    labels: LabelSet::from_ids([1, largest]),
                },
            );
            fx.session.buses().publish(names::CANVAS, LabelEvent::NewForeground);

            let foreground = tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    match selected.recv().await {
                        Some(LabelEvent::Foreground { foreground }) => return foreground,
                        Some(_) => continue,
                        None => panic!("selectedCells bus closed"),
                    }
                }
            })
            .await
            .unwrap();
            assert_eq!(foreground, largest + 1, "iteration {}", i);

            fx.session.shutdown().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_api_bus_drives_api_coordinator() {
        let mut fx = start_with(MockLabelApi::new(vec![]), MockFrameSource::new(), 1);
        fx.session.buses().publish(names::API, LabelEvent::BackendRedo);

        wait_for(&mut fx.session, |e| matches!(e, LabelEvent::Edited { .. })).await;
        assert_eq!(fx.api.call_count(), 1);
    }

    #[tokio::test]
    async fn test_save_restore_round_trip() {
        let mut fx = start_with(MockLabelApi::new(vec![]), MockFrameSource::new(), 3);
        wait_for(&mut fx.session, |e| *e == LabelEvent::RawLoaded).await;

        fx.session.dispatch(LabelEvent::SetForeground { foreground: 4 }).await.unwrap();
        let saved = fx.session.save().await.unwrap();
        assert_eq!(saved.selection.foreground, 4);
        assert!(!saved.raw.is_grayscale);

        fx.session.dispatch(LabelEvent::ToggleColorMode).await.unwrap();
        fx.session.dispatch(LabelEvent::Switch).await.unwrap();
        fx.session.restore(saved).await.unwrap();

        assert_eq!(fx.session.save().await.unwrap(), saved);
    }

    #[tokio::test]
    async fn test_frame_fetch_failure_reaches_parent_stream() {
        let frames = MockFrameSource::new();
        frames.fail(0, 1);
        let mut fx = start_with(MockLabelApi::new(vec![]), frames, 1);

        let event = wait_for(&mut fx.session, |e| matches!(e, LabelEvent::Error { .. })).await;
        let LabelEvent::Error { error } = event else { unreachable!() };
        assert!(error.as_str().unwrap().contains("channel 0 frame 1"));
    }

    #[tokio::test]
    async fn test_event_log_records_bus_traffic() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("events.jsonl");
        let mut fx = start_with(MockLabelApi::new(vec![]), MockFrameSource::new(), 1);
        fx.session.log_events(EventLogger::open(&path).unwrap());

        fx.session.buses().publish(names::CANVAS, LabelEvent::Switch);

        let mut entries = Vec::new();
        for _ in 0..100 {
            entries = read_event_log(&path).unwrap_or_default();
            if entries.iter().any(|e| e.bus == names::CANVAS) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(
            entries
                .iter()
                .any(|e| e.bus == names::CANVAS && e.event == LabelEvent::Switch)
        );
        fx.session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let fx = start_with(MockLabelApi::new(vec![]), MockFrameSource::new(), 2);
        let api = fx.session.api().clone();
        let raw = fx.session.raw().clone();
        let select = fx.session.select().clone();

        fx.session.shutdown().await.unwrap();
        assert!(api.metrics().await.is_err());
        assert!(raw.status().await.is_err());
        assert!(select.state().await.is_err());
    }
}
