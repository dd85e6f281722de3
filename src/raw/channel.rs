//! ChannelActor - loads and caches the frames of one image channel

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{ChannelCommand, ChannelNotice, ChannelRequest};
use super::source::FrameSource;

/// Owns the frame cache of a single channel
///
/// At most one fetch is in flight. On-demand loads are queued ahead of
/// preloading, and the cache is never evicted.
pub struct ChannelActor {
    project_id: String,
    channel: u32,
    num_frames: u32,
    source: Arc<dyn FrameSource>,
    cache: BTreeMap<u32, Arc<Vec<u8>>>,
    queued: VecDeque<u32>,
    fetching: Option<u32>,
    failed: BTreeSet<u32>,
    inverted: bool,
    tx: mpsc::Sender<ChannelRequest>,
    rx: mpsc::Receiver<ChannelRequest>,
    notices: mpsc::UnboundedSender<ChannelNotice>,
}

impl ChannelActor {
    pub(crate) fn new(
        project_id: &str,
        channel: u32,
        num_frames: u32,
        source: Arc<dyn FrameSource>,
        buffer: usize,
        notices: mpsc::UnboundedSender<ChannelNotice>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self {
            project_id: project_id.to_string(),
            channel,
            num_frames,
            source,
            cache: BTreeMap::new(),
            queued: VecDeque::new(),
            fetching: None,
            failed: BTreeSet::new(),
            inverted: false,
            tx,
            rx,
            notices,
        }
    }

    /// Spawn the actor task
    pub(crate) fn spawn(self) -> (ChannelHandle, JoinHandle<()>) {
        let handle = ChannelHandle {
            channel: self.channel,
            tx: self.tx.clone(),
        };
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    async fn run(mut self) {
        debug!(channel = self.channel, "ChannelActor started");

        while let Some(req) = self.rx.recv().await {
            match req {
                ChannelRequest::Command(command) => self.handle_command(command),

                ChannelRequest::Fetched { frame, result } => {
                    self.fetching = None;
                    match result {
                        Ok(bytes) => {
                            debug!(channel = self.channel, frame, size = bytes.len(), "Frame cached");
                            self.cache.insert(frame, Arc::new(bytes));
                            self.notify(ChannelNotice::Loaded {
                                channel: self.channel,
                                frame,
                            });
                        }
                        Err(e) => {
                            warn!(channel = self.channel, frame, error = %e, "Frame fetch failed");
                            self.failed.insert(frame);
                            self.notify(ChannelNotice::Failed {
                                channel: self.channel,
                                frame,
                                error: e.to_string(),
                            });
                        }
                    }
                    self.pump();
                }

                ChannelRequest::CachedFrames { reply_tx } => {
                    let _ = reply_tx.send(self.cache.keys().copied().collect());
                }

                ChannelRequest::Frame { frame, reply_tx } => {
                    let _ = reply_tx.send(self.cache.get(&frame).cloned());
                }

                ChannelRequest::IsInverted { reply_tx } => {
                    let _ = reply_tx.send(self.inverted);
                }

                ChannelRequest::Shutdown => break,
            }
        }

        debug!(channel = self.channel, cached = self.cache.len(), "ChannelActor stopped");
    }

    fn handle_command(&mut self, command: ChannelCommand) {
        debug!(channel = self.channel, ?command, "ChannelActor::handle_command: called");
        match command {
            ChannelCommand::Preload => self.preload(),
            ChannelCommand::Load { frame } => self.load(frame),
            ChannelCommand::ToggleInvert => self.inverted = !self.inverted,
            ChannelCommand::Reset => self.inverted = false,
        }
    }

    fn preload(&mut self) {
        if self.fetching.is_some() || !self.queued.is_empty() {
            return;
        }
        let next = (0..self.num_frames).find(|f| !self.cache.contains_key(f) && !self.failed.contains(f));
        match next {
            Some(frame) => self.start_fetch(frame),
            None => debug!(channel = self.channel, "Preload complete"),
        }
    }

    fn load(&mut self, frame: u32) {
        if frame >= self.num_frames {
            warn!(channel = self.channel, frame, num_frames = self.num_frames, "Ignoring load past last frame");
            return;
        }
        if self.cache.contains_key(&frame) {
            self.notify(ChannelNotice::Loaded {
                channel: self.channel,
                frame,
            });
            return;
        }
        if self.fetching == Some(frame) || self.queued.contains(&frame) {
            return;
        }
        // An explicit load retries a failed frame
        self.failed.remove(&frame);
        self.queued.push_back(frame);
        self.pump();
    }

    /// Start the next queued load if nothing is in flight
    fn pump(&mut self) {
        while self.fetching.is_none() {
            let Some(frame) = self.queued.pop_front() else {
                return;
            };
            if self.cache.contains_key(&frame) {
                self.notify(ChannelNotice::Loaded {
                    channel: self.channel,
                    frame,
                });
            } else {
                self.start_fetch(frame);
            }
        }
    }

    fn start_fetch(&mut self, frame: u32) {
        debug!(channel = self.channel, frame, "ChannelActor::start_fetch: called");
        self.fetching = Some(frame);

        let source = self.source.clone();
        let project_id = self.project_id.clone();
        let channel = self.channel;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = source.fetch(&project_id, channel, frame).await;
            if tx.send(ChannelRequest::Fetched { frame, result }).await.is_err() {
                debug!(channel, frame, "ChannelActor gone before fetch completed");
            }
        });
    }

    fn notify(&self, notice: ChannelNotice) {
        if self.notices.send(notice).is_err() {
            debug!(channel = self.channel, "Coordinator gone, dropping notice");
        }
    }
}

/// Handle to a running channel actor
///
/// Commands are issued by the raw data coordinator only; anyone holding a
/// handle may read the cache.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    channel: u32,
    tx: mpsc::Sender<ChannelRequest>,
}

impl ChannelHandle {
    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub(crate) async fn command(&self, command: ChannelCommand) -> Result<()> {
        self.tx
            .send(ChannelRequest::Command(command))
            .await
            .map_err(|_| eyre!("Channel {} actor closed", self.channel))
    }

    /// Frames cached so far, ascending
    pub async fn cached_frames(&self) -> Result<Vec<u32>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ChannelRequest::CachedFrames { reply_tx })
            .await
            .map_err(|_| eyre!("Channel {} actor closed", self.channel))?;
        reply_rx.await.map_err(|_| eyre!("Channel {} actor shutdown", self.channel))
    }

    /// Cached pixel data of a frame, if loaded
    pub async fn frame(&self, frame: u32) -> Result<Option<Arc<Vec<u8>>>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ChannelRequest::Frame { frame, reply_tx })
            .await
            .map_err(|_| eyre!("Channel {} actor closed", self.channel))?;
        reply_rx.await.map_err(|_| eyre!("Channel {} actor shutdown", self.channel))
    }

    pub async fn is_inverted(&self) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ChannelRequest::IsInverted { reply_tx })
            .await
            .map_err(|_| eyre!("Channel {} actor closed", self.channel))?;
        reply_rx.await.map_err(|_| eyre!("Channel {} actor shutdown", self.channel))
    }

    pub(crate) async fn shutdown(&self) -> Result<()> {
        info!(channel = self.channel, "Stopping channel actor");
        self.tx
            .send(ChannelRequest::Shutdown)
            .await
            .map_err(|_| eyre!("Channel {} actor closed", self.channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::source::mock::MockFrameSource;

    fn spawn_channel(
        source: Arc<MockFrameSource>,
        num_frames: u32,
    ) -> (ChannelHandle, mpsc::UnboundedReceiver<ChannelNotice>) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let actor = ChannelActor::new("proj", 1, num_frames, source, 16, notice_tx);
        let (handle, _task) = actor.spawn();
        (handle, notice_rx)
    }

    #[tokio::test]
    async fn test_load_fetches_and_caches() {
        let source = Arc::new(MockFrameSource::new());
        let (handle, mut notices) = spawn_channel(source.clone(), 3);

        handle.command(ChannelCommand::Load { frame: 2 }).await.unwrap();
        assert_eq!(notices.recv().await.unwrap(), ChannelNotice::Loaded { channel: 1, frame: 2 });

        assert_eq!(handle.cached_frames().await.unwrap(), vec![2]);
        assert_eq!(handle.frame(2).await.unwrap().unwrap().as_slice(), &[1, 2]);
        assert!(handle.frame(0).await.unwrap().is_none());

        // A cached frame is reported without fetching again
        handle.command(ChannelCommand::Load { frame: 2 }).await.unwrap();
        assert_eq!(notices.recv().await.unwrap(), ChannelNotice::Loaded { channel: 1, frame: 2 });
        assert_eq!(source.fetch_count(1, 2), 1);
    }

    #[tokio::test]
    async fn test_preload_fetches_lowest_uncached_frame() {
        let source = Arc::new(MockFrameSource::new());
        let (handle, mut notices) = spawn_channel(source.clone(), 3);

        handle.command(ChannelCommand::Load { frame: 0 }).await.unwrap();
        notices.recv().await.unwrap();

        handle.command(ChannelCommand::Preload).await.unwrap();
        assert_eq!(notices.recv().await.unwrap(), ChannelNotice::Loaded { channel: 1, frame: 1 });
        handle.command(ChannelCommand::Preload).await.unwrap();
        assert_eq!(notices.recv().await.unwrap(), ChannelNotice::Loaded { channel: 1, frame: 2 });

        // Everything cached; preload does nothing
        handle.command(ChannelCommand::Preload).await.unwrap();
        assert_eq!(handle.cached_frames().await.unwrap(), vec![0, 1, 2]);
        assert!(notices.try_recv().is_err());
        assert_eq!(source.fetches().len(), 3);
    }

    #[tokio::test]
    async fn test_one_fetch_in_flight_and_loads_before_preload() {
        let source = Arc::new(MockFrameSource::gated());
        let (handle, mut notices) = spawn_channel(source.clone(), 5);

        handle.command(ChannelCommand::Preload).await.unwrap();
        handle.command(ChannelCommand::Load { frame: 4 }).await.unwrap();
        handle.command(ChannelCommand::Load { frame: 4 }).await.unwrap();
        handle.command(ChannelCommand::Preload).await.unwrap();

        // Let the actor process everything before checking
        handle.cached_frames().await.unwrap();
        assert_eq!(source.fetches(), vec![(1, 0)]);

        source.release(1);
        assert_eq!(notices.recv().await.unwrap(), ChannelNotice::Loaded { channel: 1, frame: 0 });
        source.release(1);
        assert_eq!(notices.recv().await.unwrap(), ChannelNotice::Loaded { channel: 1, frame: 4 });
        assert_eq!(source.fetches(), vec![(1, 0), (1, 4)]);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_reported_and_skipped_by_preload() {
        let source = Arc::new(MockFrameSource::new());
        source.fail(1, 0);
        let (handle, mut notices) = spawn_channel(source.clone(), 2);

        handle.command(ChannelCommand::Preload).await.unwrap();
        match notices.recv().await.unwrap() {
            ChannelNotice::Failed { channel, frame, .. } => {
                assert_eq!((channel, frame), (1, 0));
            }
            other => panic!("Expected failure, got {:?}", other),
        }

        handle.command(ChannelCommand::Preload).await.unwrap();
        assert_eq!(notices.recv().await.unwrap(), ChannelNotice::Loaded { channel: 1, frame: 1 });
    }

    #[tokio::test]
    async fn test_invert_and_reset() {
        let source = Arc::new(MockFrameSource::new());
        let (handle, _notices) = spawn_channel(source, 1);

        assert!(!handle.is_inverted().await.unwrap());
        handle.command(ChannelCommand::ToggleInvert).await.unwrap();
        assert!(handle.is_inverted().await.unwrap());
        handle.command(ChannelCommand::Reset).await.unwrap();
        assert!(!handle.is_inverted().await.unwrap());
    }

    #[tokio::test]
    async fn test_load_past_last_frame_is_ignored() {
        let source = Arc::new(MockFrameSource::new());
        let (handle, mut notices) = spawn_channel(source.clone(), 2);

        handle.command(ChannelCommand::Load { frame: 9 }).await.unwrap();
        handle.cached_frames().await.unwrap();
        assert!(notices.try_recv().is_err());
        assert!(source.fetches().is_empty());
    }
}
