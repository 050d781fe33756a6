//! Stream registry implementation
//!
//! The single source of truth for which streams are running. Table access
//! is serialized by one `RwLock`, but the lock is never held across process
//! spawn, termination or filesystem work, so one slow teardown cannot stall
//! operations on other ids.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::process::ChildStdout;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::hls::SegmentStore;
use crate::media::JpegDemuxer;
use crate::process::{FfmpegLauncher, Invocation, Launcher, TranscoderProcess};
use crate::relay::{FrameRelay, FrameSequence};
use crate::stats::StreamInfo;

use super::entry::{SessionOutput, StreamMode, StreamSession};
use super::worker;

/// Table slot for one stream id
enum Slot {
    /// A start is spawning the transcoder; the id is reserved
    Starting(u64),
    /// Session is live
    Running(Arc<StreamSession>),
}

/// Central registry for all relayed streams
///
/// Construct once, share as `Arc<StreamRegistry>`, and call
/// [`stop_all`](Self::stop_all) at shutdown.
pub struct StreamRegistry {
    /// Map of stream id to slot
    streams: RwLock<HashMap<String, Slot>>,

    /// Configuration
    config: RelayConfig,

    /// Builds transcoder commands
    launcher: Arc<dyn Launcher>,

    /// HLS directory layout
    segments: SegmentStore,

    /// Tags start reservations so a stale start cannot clobber a newer one
    next_generation: AtomicU64,
}

impl StreamRegistry {
    /// Create a registry with default configuration and ffmpeg
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a registry running ffmpeg with custom configuration
    pub fn with_config(config: RelayConfig) -> Self {
        let launcher = FfmpegLauncher::new(&config);
        Self::with_launcher(config, launcher)
    }

    /// Create a registry with a custom transcoder launcher
    pub fn with_launcher(config: RelayConfig, launcher: impl Launcher) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            segments: SegmentStore::new(config.hls_root.clone()),
            config,
            launcher: Arc::new(launcher),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start relaying `source_url` under `id`
    ///
    /// Starting an id that is already running (or starting) is a successful
    /// no-op. Returns false only when the transcoder could not be launched,
    /// in which case nothing stays registered.
    pub async fn start(self: &Arc<Self>, id: &str, source_url: &str, mode: StreamMode) -> bool {
        match self.try_start(id, source_url, mode).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(stream = %id, mode = %mode, error = %e, "Failed to start stream");
                false
            }
        }
    }

    /// Like [`start`](Self::start), reporting why a start failed
    pub async fn try_start(self: &Arc<Self>, id: &str, source_url: &str, mode: StreamMode) -> Result<()> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut streams = self.streams.write().await;
            if streams.contains_key(id) {
                tracing::debug!(stream = %id, "Stream already running");
                return Ok(());
            }
            streams.insert(id.to_string(), Slot::Starting(generation));
        }

        let (session, stdout) = match self.launch(id, source_url, mode).await {
            Ok(launched) => launched,
            Err(e) => {
                self.release_reservation(id, generation).await;
                return Err(e);
            }
        };
        let session = Arc::new(session);

        let published = {
            let mut streams = self.streams.write().await;
            let reserved = matches!(streams.get(id), Some(Slot::Starting(g)) if *g == generation);
            if reserved {
                streams.insert(id.to_string(), Slot::Running(Arc::clone(&session)));
            }
            reserved
        };

        if !published {
            // A stop arrived while we were spawning
            session.shutdown(self.config.terminate_timeout).await;
            return Err(Error::StartCancelled(id.to_string()));
        }

        self.spawn_supervisor(Arc::clone(&session), stdout);

        tracing::info!(
            stream = %id,
            mode = %mode,
            pid = ?session.process().pid(),
            source = %source_url,
            "Stream started"
        );

        Ok(())
    }

    /// Stop a stream and release everything it owns
    ///
    /// Returns false if no stream with that id exists.
    pub async fn stop(&self, id: &str) -> bool {
        // Remove first so concurrent lookups see it gone immediately
        let removed = self.streams.write().await.remove(id);

        match removed {
            None => false,
            Some(Slot::Starting(_)) => {
                tracing::info!(stream = %id, "Stream stopped while starting");
                true
            }
            Some(Slot::Running(session)) => {
                let outcome = session.shutdown(self.config.terminate_timeout).await;
                tracing::info!(stream = %id, outcome = ?outcome, "Stream stopped");
                true
            }
        }
    }

    /// Stop every stream; used at shutdown
    pub async fn stop_all(&self) {
        let drained: Vec<(String, Slot)> = self.streams.write().await.drain().collect();
        let count = drained.len();

        let grace = self.config.terminate_timeout;
        futures::future::join_all(drained.into_iter().filter_map(|(_, slot)| match slot {
            Slot::Running(session) => Some(async move {
                session.shutdown(grace).await;
            }),
            Slot::Starting(_) => None,
        }))
        .await;

        if count > 0 {
            tracing::info!(streams = count, "All streams stopped");
        }
    }

    /// Mode of a running stream
    pub async fn mode(&self, id: &str) -> Option<StreamMode> {
        self.session(id).await.map(|s| s.mode())
    }

    /// Check if a stream is running
    pub async fn is_active(&self, id: &str) -> bool {
        self.session(id).await.is_some()
    }

    /// Ids of all running streams
    pub async fn active_streams(&self) -> HashSet<String> {
        self.streams
            .read()
            .await
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Running(_)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// New frame sequence for an MJPEG stream
    ///
    /// `None` if the stream is unknown or not in MJPEG mode.
    pub async fn frames(&self, id: &str) -> Option<FrameSequence> {
        self.session(id).await?.frames()
    }

    /// Segment directory of an HLS stream
    pub async fn segment_dir(&self, id: &str) -> Option<PathBuf> {
        self.session(id).await?.segment_dir().map(PathBuf::from)
    }

    /// Playlist path of an HLS stream
    pub async fn playlist_path(&self, id: &str) -> Option<PathBuf> {
        self.session(id).await?.playlist_path()
    }

    /// Statistics snapshot of a running stream
    pub async fn stats(&self, id: &str) -> Option<StreamInfo> {
        self.session(id).await.map(|s| s.info())
    }

    /// Number of running streams
    pub async fn stream_count(&self) -> usize {
        self.streams
            .read()
            .await
            .values()
            .filter(|slot| matches!(slot, Slot::Running(_)))
            .count()
    }

    async fn session(&self, id: &str) -> Option<Arc<StreamSession>> {
        match self.streams.read().await.get(id) {
            Some(Slot::Running(session)) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    /// Spawn the transcoder and build the session around it
    async fn launch(
        &self,
        id: &str,
        source_url: &str,
        mode: StreamMode,
    ) -> Result<(StreamSession, Option<ChildStdout>)> {
        let stop = CancellationToken::new();

        match mode {
            StreamMode::Mjpeg => {
                let invocation = Invocation::Mjpeg { source_url };
                let command = self.launcher.command(&invocation);
                let mut process = TranscoderProcess::spawn(command, invocation.uses_stdout())?;

                let Some(stdout) = process.take_stdout() else {
                    process.terminate(self.config.terminate_timeout).await;
                    return Err(Error::MissingStdout);
                };

                let relay = FrameRelay::new(
                    self.config.relay_capacity,
                    self.config.frame_timeout,
                    stop.clone(),
                );
                let session =
                    StreamSession::new(id, source_url, process, stop, SessionOutput::Mjpeg(relay));

                Ok((session, Some(stdout)))
            }
            StreamMode::Hls => {
                let segment_dir = self.segments.prepare(id).await?;

                let invocation = Invocation::Hls {
                    source_url,
                    segment_dir: &segment_dir,
                };
                let command = self.launcher.command(&invocation);
                let process = match TranscoderProcess::spawn(command, invocation.uses_stdout()) {
                    Ok(process) => process,
                    Err(e) => {
                        SegmentStore::remove(&segment_dir).await;
                        return Err(e);
                    }
                };

                let session = StreamSession::new(
                    id,
                    source_url,
                    process,
                    stop,
                    SessionOutput::Hls { segment_dir },
                );

                Ok((session, None))
            }
        }
    }

    async fn release_reservation(&self, id: &str, generation: u64) {
        let mut streams = self.streams.write().await;
        if matches!(streams.get(id), Some(Slot::Starting(g)) if *g == generation) {
            streams.remove(id);
        }
    }

    /// Run the session's reader or watcher, then purge it if its process died
    fn spawn_supervisor(self: &Arc<Self>, session: Arc<StreamSession>, stdout: Option<ChildStdout>) {
        let registry: Weak<Self> = Arc::downgrade(self);
        let chunk_size = self.config.read_chunk_size;
        let max_frame_size = self.config.max_frame_size;
        let interval = self.config.liveness_interval;
        let grace = self.config.terminate_timeout;

        tokio::spawn(async move {
            match (stdout, session.relay()) {
                (Some(stdout), Some(relay)) => {
                    let frames = worker::pump_frames(
                        stdout,
                        JpegDemuxer::with_max_frame_size(max_frame_size),
                        relay,
                        session.stop_token(),
                        session.counters(),
                        chunk_size,
                    )
                    .await;
                    tracing::debug!(stream = %session.id(), frames = frames, "Frame reader finished");
                }
                _ => worker::watch_liveness(session.process(), session.stop_token(), interval).await,
            }

            match registry.upgrade() {
                Some(_) if session.stop_requested() => {}
                Some(registry) => registry.purge_exited(&session).await,
                None => {
                    // Registry dropped without `stop_all`
                    session.shutdown(grace).await;
                }
            }
        });
    }

    /// Remove a session whose transcoder ended without an explicit stop
    async fn purge_exited(&self, session: &Arc<StreamSession>) {
        let removed = {
            let mut streams = self.streams.write().await;
            // The id may already belong to a newer session
            let current = matches!(
                streams.get(session.id()),
                Some(Slot::Running(current)) if Arc::ptr_eq(current, session)
            );
            if current {
                streams.remove(session.id());
            }
            current
        };

        if removed {
            let status = session.exit_status().await;
            tracing::warn!(
                stream = %session.id(),
                status = ?status,
                "Transcoder exited unexpectedly, stream removed"
            );
            session.shutdown(self.config.terminate_timeout).await;
        }
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        // Wake the background tasks; each one finds the registry gone and
        // shuts its own session down. `stop_all` is the orderly path.
        for slot in self.streams.get_mut().values() {
            if let Slot::Running(session) = slot {
                session.stop_token().cancel();
            }
        }
    }
}
