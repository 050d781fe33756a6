//! Stream session types
//!
//! This module defines the per-stream state stored in the registry.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::hls::{SegmentStore, PLAYLIST_NAME};
use crate::process::{TerminateOutcome, TranscoderProcess};
use crate::relay::{FrameRelay, FrameSequence};
use crate::stats::{StreamCounters, StreamInfo};

/// Output mode of a stream, fixed for the session's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Video-only JPEG sequence, low latency
    Mjpeg,
    /// Video and audio as an HLS playlist, higher latency
    Hls,
}

impl StreamMode {
    /// Pick the mode from an audio preference: audio needs HLS
    pub fn with_audio(audio: bool) -> Self {
        if audio {
            StreamMode::Hls
        } else {
            StreamMode::Mjpeg
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Mjpeg => "mjpeg",
            StreamMode::Hls => "hls",
        }
    }
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mjpeg" => Ok(StreamMode::Mjpeg),
            "hls" => Ok(StreamMode::Hls),
            _ => Err(crate::error::Error::UnknownMode(s.to_string())),
        }
    }
}

/// Mode-specific output of a session
pub(crate) enum SessionOutput {
    Mjpeg(FrameRelay),
    Hls { segment_dir: PathBuf },
}

/// One running stream: its transcoder and where its output goes
pub struct StreamSession {
    id: String,
    mode: StreamMode,
    source_url: String,
    process: TranscoderProcess,
    stop: CancellationToken,
    output: SessionOutput,
    counters: StreamCounters,
    started_at: Instant,
}

impl StreamSession {
    pub(crate) fn new(
        id: &str,
        source_url: &str,
        process: TranscoderProcess,
        stop: CancellationToken,
        output: SessionOutput,
    ) -> Self {
        let mode = match output {
            SessionOutput::Mjpeg(_) => StreamMode::Mjpeg,
            SessionOutput::Hls { .. } => StreamMode::Hls,
        };

        Self {
            id: id.to_string(),
            mode,
            source_url: source_url.to_string(),
            process,
            stop,
            output,
            counters: StreamCounters::new(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Segment directory (HLS only)
    pub fn segment_dir(&self) -> Option<&Path> {
        match &self.output {
            SessionOutput::Hls { segment_dir } => Some(segment_dir),
            SessionOutput::Mjpeg(_) => None,
        }
    }

    /// Playlist path inside the segment directory (HLS only)
    pub fn playlist_path(&self) -> Option<PathBuf> {
        self.segment_dir().map(|dir| dir.join(PLAYLIST_NAME))
    }

    /// Frame relay (MJPEG only)
    pub fn relay(&self) -> Option<&FrameRelay> {
        match &self.output {
            SessionOutput::Mjpeg(relay) => Some(relay),
            SessionOutput::Hls { .. } => None,
        }
    }

    /// New consumer of this session's frames (MJPEG only)
    pub fn frames(&self) -> Option<FrameSequence> {
        self.relay().map(FrameRelay::subscribe)
    }

    pub fn process(&self) -> &TranscoderProcess {
        &self.process
    }

    pub fn counters(&self) -> &StreamCounters {
        &self.counters
    }

    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Whether an explicit stop has begun
    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub async fn exit_status(&self) -> Option<ExitStatus> {
        self.process.exit_status().await
    }

    /// Snapshot of the session's statistics
    pub fn info(&self) -> StreamInfo {
        let relay = self.relay();

        StreamInfo {
            id: self.id.clone(),
            mode: self.mode,
            source_url: self.source_url.clone(),
            pid: self.process.pid(),
            uptime: self.started_at.elapsed(),
            bytes_read: self.counters.bytes_read(),
            frames_published: relay.map_or(0, FrameRelay::frames_published),
            frames_dropped: relay.map_or(0, FrameRelay::frames_dropped),
            subscribers: relay.map_or(0, FrameRelay::subscriber_count),
        }
    }

    /// Release everything the session owns
    ///
    /// Order matters: signal the reader/watcher, stop the process, then
    /// release the output (finishing viewers or deleting the directory).
    pub(crate) async fn shutdown(&self, grace: Duration) -> TerminateOutcome {
        self.stop.cancel();
        let outcome = self.process.terminate(grace).await;

        match &self.output {
            SessionOutput::Mjpeg(relay) => relay.finish(),
            SessionOutput::Hls { segment_dir } => SegmentStore::remove(segment_dir).await,
        }

        outcome
    }
}
