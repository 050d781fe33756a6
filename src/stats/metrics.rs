//! Statistics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::registry::StreamMode;

/// Live counters updated by a session's reader task
#[derive(Debug, Default)]
pub struct StreamCounters {
    bytes_read: AtomicU64,
    reads: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one read of `n` bytes from the transcoder
    pub fn record_read(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Total bytes read from the transcoder's stdout
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Number of non-empty reads
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

/// Point-in-time snapshot of one stream
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Stream id
    pub id: String,
    /// Output mode
    pub mode: StreamMode,
    /// Upstream URL
    pub source_url: String,
    /// Transcoder process id
    pub pid: Option<u32>,
    /// Time since the stream started
    pub uptime: Duration,
    /// Bytes read from the transcoder (MJPEG only)
    pub bytes_read: u64,
    /// Frames published to the relay (MJPEG only)
    pub frames_published: u64,
    /// Frames skipped by lagging viewers (MJPEG only)
    pub frames_dropped: u64,
    /// Attached viewers (MJPEG only)
    pub subscribers: usize,
}

impl StreamInfo {
    /// Average input bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_read * 8) / secs
        } else {
            0
        }
    }

    /// Average published frame rate
    pub fn framerate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.frames_published as f64 / secs
        } else {
            0.0
        }
    }
}
