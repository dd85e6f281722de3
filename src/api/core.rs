//! Main ApiCoordinator task implementation

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handle::ApiHandle;
use super::messages::{ApiJob, ApiMetrics, ApiOutcome, ApiRequest, ApiState, Dispatch};
use super::{ApiError, DownloadSink, DownloadedExport, LabelApi};
use crate::config::CoordinatorConfig;
use crate::domain::{EditCursor, ExportFormat, ProjectContext};
use crate::events::{EventBus, LabelEvent};

/// Serializes backend operations into a single-flight pipeline
///
/// Successful edits, undos and redos are published as `EDITED` on the image
/// bus. Every failure is reported to the parent as `ERROR`.
pub struct ApiCoordinator {
    project: ProjectContext,
    format: ExportFormat,
    api: Arc<dyn LabelApi>,
    sink: Arc<dyn DownloadSink>,
    image_bus: Arc<EventBus>,
    parent: mpsc::UnboundedSender<LabelEvent>,
    tx: mpsc::Sender<ApiRequest>,
    rx: mpsc::Receiver<ApiRequest>,
    state_tx: watch::Sender<ApiState>,
    cursor: EditCursor,
    in_flight: Option<Uuid>,
    metrics: ApiMetrics,
}

impl ApiCoordinator {
    /// Create a new ApiCoordinator
    pub fn new(
        config: &CoordinatorConfig,
        project: ProjectContext,
        format: ExportFormat,
        api: Arc<dyn LabelApi>,
        sink: Arc<dyn DownloadSink>,
        image_bus: Arc<EventBus>,
        parent: mpsc::UnboundedSender<LabelEvent>,
    ) -> Self {
        debug!(project_id = %project.project_id, %format, "ApiCoordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        let (state_tx, _) = watch::channel(ApiState::Idle);
        Self {
            project,
            format,
            api,
            sink,
            image_bus,
            parent,
            tx,
            rx,
            state_tx,
            cursor: EditCursor::default(),
            in_flight: None,
            metrics: ApiMetrics::default(),
        }
    }

    /// Get a handle for talking to this coordinator
    pub fn handle(&self) -> ApiHandle {
        ApiHandle::new(self.tx.clone(), self.state_tx.subscribe())
    }

    /// Spawn the coordinator task
    pub fn spawn(self) -> (ApiHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run the coordinator until shutdown is requested
    pub async fn run(mut self) {
        info!(project_id = %self.project.project_id, "ApiCoordinator started");

        while let Some(req) = self.rx.recv().await {
            match req {
                ApiRequest::Event { event, ack } => {
                    let dispatch = self.handle_event(event);
                    if let Some(ack) = ack {
                        let _ = ack.send(dispatch);
                    }
                }

                ApiRequest::Completed { request_id, outcome } => {
                    self.handle_completed(request_id, outcome);
                }

                ApiRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(self.metrics.clone());
                }

                ApiRequest::Shutdown => {
                    info!("ApiCoordinator shutting down");
                    break;
                }
            }
        }

        info!("ApiCoordinator stopped");
    }

    fn state(&self) -> ApiState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ApiState) {
        debug!(from = ?self.state(), to = ?state, "ApiCoordinator::set_state: called");
        self.state_tx.send_replace(state);
    }

    fn handle_event(&mut self, event: LabelEvent) -> Dispatch {
        match event {
            LabelEvent::Frame { frame } => {
                self.cursor.frame = frame;
                Dispatch::Applied
            }
            LabelEvent::Feature { feature } => {
                self.cursor.feature = feature;
                Dispatch::Applied
            }
            LabelEvent::Channel { channel } => {
                self.cursor.channel = channel;
                Dispatch::Applied
            }
            other => match ApiJob::from_event(&other) {
                Some(job) => self.start(job),
                None => {
                    debug!(event_type = other.event_type(), "ApiCoordinator: ignoring event");
                    Dispatch::Ignored
                }
            },
        }
    }

    fn start(&mut self, job: ApiJob) -> Dispatch {
        let busy = self.state();
        if busy.is_busy() {
            warn!(job = job.name(), ?busy, "Rejecting request while another is in flight");
            self.metrics.rejected += 1;
            return Dispatch::Rejected { busy };
        }

        let request_id = Uuid::now_v7();
        let state = job.state();
        info!(%request_id, job = job.name(), cursor = ?self.cursor, "Starting backend request");

        self.in_flight = Some(request_id);
        self.metrics.started += 1;
        self.set_state(state);

        let api = self.api.clone();
        let sink = self.sink.clone();
        let tx = self.tx.clone();
        let project = self.project.clone();
        let format = self.format;
        let cursor = self.cursor;

        tokio::spawn(async move {
            let project_id = project.project_id.as_str();
            let outcome = match job {
                ApiJob::Edit { action, args } => {
                    ApiOutcome::Edited(api.edit(project_id, &action, &args, cursor).await)
                }
                ApiJob::Undo => ApiOutcome::Edited(api.undo(project_id).await),
                ApiJob::Redo => ApiOutcome::Edited(api.redo(project_id).await),
                ApiJob::Upload => ApiOutcome::Uploaded(api.upload(project_id, &project.bucket, format).await),
                ApiJob::Download => match api.download(project_id, format).await {
                    Ok(export) => ApiOutcome::Downloaded(save_download(sink, export).await),
                    Err(e) => ApiOutcome::Downloaded(Err(e)),
                },
            };

            if tx.send(ApiRequest::Completed { request_id, outcome }).await.is_err() {
                debug!(%request_id, "ApiCoordinator gone before request completed");
            }
        });

        Dispatch::Started(state)
    }

    fn handle_completed(&mut self, request_id: Uuid, outcome: ApiOutcome) {
        if self.in_flight != Some(request_id) {
            warn!(%request_id, "Ignoring completion of unknown request");
            return;
        }
        self.in_flight = None;

        match outcome {
            ApiOutcome::Edited(Ok(data)) => {
                debug!(%request_id, "Edit applied");
                self.metrics.succeeded += 1;
                self.image_bus.publish(LabelEvent::Edited { data });
            }
            ApiOutcome::Uploaded(Ok(_)) => {
                info!(%request_id, project_id = %self.project.project_id, "Upload complete");
                self.metrics.succeeded += 1;
            }
            ApiOutcome::Downloaded(Ok(path)) => {
                info!(%request_id, path = %path.display(), "Download complete");
                self.metrics.succeeded += 1;
            }
            ApiOutcome::Edited(Err(e)) | ApiOutcome::Uploaded(Err(e)) | ApiOutcome::Downloaded(Err(e)) => {
                self.report_error(request_id, e);
            }
        }

        self.set_state(ApiState::Idle);
    }

    fn report_error(&mut self, request_id: Uuid, error: ApiError) {
        warn!(%request_id, %error, "Backend request failed");
        self.metrics.failed += 1;
        if self.parent.send(LabelEvent::Error { error: error.payload() }).is_err() {
            debug!("ApiCoordinator parent stream closed");
        }
    }
}

/// Hand the export to the sink on the blocking pool; sinks write files
async fn save_download(sink: Arc<dyn DownloadSink>, export: DownloadedExport) -> Result<PathBuf, ApiError> {
    match tokio::task::spawn_blocking(move || sink.save(&export)).await {
        Ok(saved) => saved.map_err(ApiError::from),
        Err(e) => Err(ApiError::Save(std::io::Error::other(format!("Download sink task failed: {}", e)))),
    }
}
