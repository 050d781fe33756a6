//! Transcoder command construction
//!
//! A [`Launcher`] turns a stream request into the `Command` that runs the
//! external transcoder. The supervisor owns stdio wiring and lifecycle, so
//! a launcher only decides program and arguments. Tests inject launchers
//! that run small shell scripts instead of ffmpeg.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::RelayConfig;
use crate::hls::{PLAYLIST_NAME, SEGMENT_PATTERN};

/// What the transcoder must produce for one session
#[derive(Debug, Clone, Copy)]
pub enum Invocation<'a> {
    /// Raw concatenated JPEG frames on stdout
    Mjpeg { source_url: &'a str },
    /// Playlist and segments written into `segment_dir`
    Hls {
        source_url: &'a str,
        segment_dir: &'a Path,
    },
}

impl Invocation<'_> {
    /// Upstream URL being transcoded
    pub fn source_url(&self) -> &str {
        match self {
            Invocation::Mjpeg { source_url } | Invocation::Hls { source_url, .. } => source_url,
        }
    }

    /// Whether the transcoder's stdout carries media
    pub fn uses_stdout(&self) -> bool {
        matches!(self, Invocation::Mjpeg { .. })
    }
}

/// Builds transcoder commands
pub trait Launcher: Send + Sync + 'static {
    /// Command for the given invocation; stdio is configured by the caller
    fn command(&self, invocation: &Invocation<'_>) -> Command;
}

/// ffmpeg command line builder
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    program: PathBuf,
    mjpeg_quality: u8,
    mjpeg_fps: u32,
    hls_segment_secs: u32,
    hls_list_size: u32,
    audio_bitrate: String,
}

impl FfmpegLauncher {
    /// Create a launcher from the relay configuration
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            program: config.transcoder_path.clone(),
            mjpeg_quality: config.mjpeg_quality,
            mjpeg_fps: config.mjpeg_fps,
            hls_segment_secs: config.hls_segment_secs,
            hls_list_size: config.hls_list_size,
            audio_bitrate: config.audio_bitrate.clone(),
        }
    }

    /// Full argument list for an invocation
    pub fn args(&self, invocation: &Invocation<'_>) -> Vec<OsString> {
        // RTSP over TCP: UDP drops packets on busy networks and corrupts frames
        let mut args: Vec<OsString> = vec![
            "-rtsp_transport".into(),
            "tcp".into(),
            "-i".into(),
            invocation.source_url().into(),
        ];

        match invocation {
            Invocation::Mjpeg { .. } => {
                args.extend([
                    "-f".into(),
                    "mjpeg".into(),
                    "-q:v".into(),
                    self.mjpeg_quality.to_string().into(),
                    "-r".into(),
                    self.mjpeg_fps.to_string().into(),
                    "-an".into(),
                    "-".into(),
                ]);
            }
            Invocation::Hls { segment_dir, .. } => {
                args.extend([
                    "-c:v".into(),
                    "libx264".into(),
                    "-preset".into(),
                    "ultrafast".into(),
                    "-tune".into(),
                    "zerolatency".into(),
                    "-c:a".into(),
                    "aac".into(),
                    "-b:a".into(),
                    self.audio_bitrate.clone().into(),
                    "-f".into(),
                    "hls".into(),
                    "-hls_time".into(),
                    self.hls_segment_secs.to_string().into(),
                    "-hls_list_size".into(),
                    self.hls_list_size.to_string().into(),
                    "-hls_flags".into(),
                    "delete_segments+append_list".into(),
                    "-hls_segment_filename".into(),
                    segment_dir.join(SEGMENT_PATTERN).into_os_string(),
                    segment_dir.join(PLAYLIST_NAME).into_os_string(),
                ]);
            }
        }

        args
    }
}

impl Launcher for FfmpegLauncher {
    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.args(invocation));
        command
    }
}
