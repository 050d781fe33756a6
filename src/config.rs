//! Relay configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default transcoder executable, resolved through `PATH`
pub const DEFAULT_TRANSCODER: &str = "ffmpeg";

/// Directory name under the system temp dir holding per-stream HLS output
pub const DEFAULT_HLS_DIR_NAME: &str = "rtsp_relay_hls";

/// Upper bound for one buffered JPEG frame
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Transcoder executable
    pub transcoder_path: PathBuf,

    /// Root directory for per-stream HLS segment directories
    pub hls_root: PathBuf,

    /// Bytes requested per read from the transcoder's stdout
    pub read_chunk_size: usize,

    /// Largest JPEG frame accepted before a partial frame is discarded
    pub max_frame_size: usize,

    /// Frames each MJPEG consumer may have in flight before the oldest is dropped
    pub relay_capacity: usize,

    /// How long a consumer waits for a frame before re-checking the stop signal
    pub frame_timeout: Duration,

    /// Grace period between SIGTERM and SIGKILL
    pub terminate_timeout: Duration,

    /// HLS process liveness poll interval
    pub liveness_interval: Duration,

    /// MJPEG `-q:v` quality (2 = best, 31 = worst)
    pub mjpeg_quality: u8,

    /// MJPEG output frame rate
    pub mjpeg_fps: u32,

    /// Target HLS segment duration in seconds
    pub hls_segment_secs: u32,

    /// Number of segments kept in the HLS playlist
    pub hls_list_size: u32,

    /// HLS AAC audio bitrate (ffmpeg syntax, e.g. "128k")
    pub audio_bitrate: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transcoder_path: PathBuf::from(DEFAULT_TRANSCODER),
            hls_root: std::env::temp_dir().join(DEFAULT_HLS_DIR_NAME),
            read_chunk_size: 4096,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            relay_capacity: 2,
            frame_timeout: Duration::from_secs(5),
            terminate_timeout: Duration::from_secs(2),
            liveness_interval: Duration::from_secs(1),
            mjpeg_quality: 5,
            mjpeg_fps: 15,
            hls_segment_secs: 2,
            hls_list_size: 5,
            audio_bitrate: "128k".to_string(),
        }
    }
}

impl RelayConfig {
    /// Create a new config with a custom HLS root
    pub fn with_hls_root(root: impl Into<PathBuf>) -> Self {
        Self {
            hls_root: root.into(),
            ..Default::default()
        }
    }

    /// Set the transcoder executable
    pub fn transcoder(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcoder_path = path.into();
        self
    }

    /// Set the HLS root directory
    pub fn hls_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.hls_root = root.into();
        self
    }

    /// Set the stdout read chunk size (at least 1 byte)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the largest accepted frame (at least 2 bytes, the start marker)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(2);
        self
    }

    /// Set the per-consumer relay capacity (at least 1 frame)
    pub fn relay_capacity(mut self, capacity: usize) -> Self {
        self.relay_capacity = capacity.max(1);
        self
    }

    /// Set the consumer frame wait timeout
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Set the graceful termination window
    pub fn terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// Set the HLS liveness poll interval
    pub fn liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    /// Set MJPEG quality, clamped to ffmpeg's 2..=31 range
    pub fn mjpeg_quality(mut self, quality: u8) -> Self {
        self.mjpeg_quality = quality.clamp(2, 31);
        self
    }

    /// Set MJPEG frame rate (at least 1 fps)
    pub fn mjpeg_fps(mut self, fps: u32) -> Self {
        self.mjpeg_fps = fps.max(1);
        self
    }

    /// Set HLS segment duration and playlist window
    pub fn hls_window(mut self, segment_secs: u32, list_size: u32) -> Self {
        self.hls_segment_secs = segment_secs.max(1);
        self.hls_list_size = list_size.max(1);
        self
    }
}
