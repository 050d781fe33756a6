//! End-to-end tests driving the registry with shell scripts standing in for
//! the transcoder.
#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::process::Command;

use rtsp_relay::hls::{self, PLAYLIST_NAME};
use rtsp_relay::media::multipart;
use rtsp_relay::process::{Invocation, Launcher};
use rtsp_relay::{RelayConfig, StreamMode, StreamRegistry};

/// Three tiny JPEG-shaped frames back to back, then exit
const THREE_FRAMES: &str = r"printf '\377\330\001\377\331\377\330\002\377\331\377\330\003\377\331'";

/// Same frames, but the transcoder keeps running afterwards
const THREE_FRAMES_THEN_IDLE: &str =
    r"printf '\377\330\001\377\331\377\330\002\377\331\377\330\003\377\331'; exec sleep 30";

fn expected_frames() -> Vec<Bytes> {
    vec![
        Bytes::from_static(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]),
        Bytes::from_static(&[0xFF, 0xD8, 0x02, 0xFF, 0xD9]),
        Bytes::from_static(&[0xFF, 0xD8, 0x03, 0xFF, 0xD9]),
    ]
}

/// Launches `sh -c <script>`; for HLS the segment directory is passed as `$0`
struct ScriptLauncher {
    mjpeg: &'static str,
    hls: &'static str,
}

impl Launcher for ScriptLauncher {
    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut command = Command::new("sh");
        match invocation {
            Invocation::Mjpeg { .. } => {
                command.arg("-c").arg(self.mjpeg);
            }
            Invocation::Hls { segment_dir, .. } => {
                command.arg("-c").arg(self.hls).arg(segment_dir);
            }
        }
        command
    }
}

fn config(root: &Path) -> RelayConfig {
    RelayConfig::with_hls_root(root)
        .relay_capacity(8)
        .frame_timeout(Duration::from_millis(200))
        .terminate_timeout(Duration::from_secs(1))
        .liveness_interval(Duration::from_millis(50))
}

fn registry(root: &Path, mjpeg: &'static str, hls: &'static str) -> Arc<StreamRegistry> {
    Arc::new(StreamRegistry::with_launcher(
        config(root),
        ScriptLauncher { mjpeg, hls },
    ))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn wait_for(mut check: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

#[tokio::test]
async fn test_mjpeg_frames_then_upstream_exit() {
    init_tracing();
    let root = tempfile::tempdir().unwrap();
    let registry = registry(root.path(), THREE_FRAMES, "exec sleep 30");

    assert!(registry.start("cam1", "rtsp://camera/1", StreamMode::Mjpeg).await);

    // Frames written before anyone asked are held for the first viewer
    let mut frames = registry.frames("cam1").await.unwrap();
    let mut received = Vec::new();
    while let Some(frame) = frames.next_frame().await {
        received.push(frame);
    }

    assert_eq!(received, expected_frames());

    // The background task purges the session once the transcoder is gone
    let purged = {
        let registry = Arc::clone(&registry);
        async move {
            for _ in 0..40 {
                if registry.mode("cam1").await.is_none() {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            false
        }
    };
    assert!(purged.await);
    assert!(!registry.stop("cam1").await);
}

#[tokio::test]
async fn test_mjpeg_frames_wait_for_first_viewer() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry(root.path(), THREE_FRAMES_THEN_IDLE, "exec sleep 30");

    assert!(registry.start("cam2", "rtsp://camera/2", StreamMode::Mjpeg).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(registry.stats("cam2").await.unwrap().frames_published, 3);

    let mut frames = registry.frames("cam2").await.unwrap();
    let mut received = Vec::new();
    for _ in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(1), frames.next_frame())
            .await
            .unwrap();
        received.push(frame.unwrap());
    }
    assert_eq!(received, expected_frames());

    assert!(registry.stop("cam2").await);
    assert_eq!(frames.next_frame().await, None);
}

#[tokio::test]
async fn test_mjpeg_multipart_body() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry(root.path(), THREE_FRAMES, "exec sleep 30");

    assert!(registry.start("cam1", "rtsp://camera/1", StreamMode::Mjpeg).await);

    let body: Vec<Bytes> = registry
        .frames("cam1")
        .await
        .unwrap()
        .into_stream()
        .map(|frame| multipart::encode_part(&frame))
        .collect()
        .await;

    assert_eq!(body.len(), 3);
    assert!(body[0].starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
}

#[tokio::test]
async fn test_hls_directory_lifecycle() {
    init_tracing();
    let root = tempfile::tempdir().unwrap();
    let registry = registry(
        root.path(),
        "exec sleep 30",
        r#"sleep 0.3; echo '#EXTM3U' > "$0/stream.m3u8"; exec sleep 30"#,
    );

    // Leftovers from an earlier run are cleared
    let stale = root.path().join("cam2");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("segment999.ts"), b"old").unwrap();

    assert!(registry.start("cam2", "rtsp://camera/2", StreamMode::Hls).await);

    let dir = registry.segment_dir("cam2").await.unwrap();
    assert_eq!(dir, stale);
    assert!(dir.is_dir());
    assert!(!dir.join("segment999.ts").exists());
    assert!(registry.frames("cam2").await.is_none());

    let playlist = registry.playlist_path("cam2").await.unwrap();
    assert_eq!(playlist, dir.join(PLAYLIST_NAME));
    assert!(wait_for(|| playlist.exists(), Duration::from_secs(3)).await);

    let served = hls::SegmentStore::resolve(&dir, PLAYLIST_NAME).unwrap();
    assert_eq!(hls::content_type(&served), Some(hls::PLAYLIST_CONTENT_TYPE));
    assert!(hls::SegmentStore::resolve(&dir, "../cam1/stream.m3u8").is_none());

    assert!(registry.stop("cam2").await);
    assert!(!dir.exists());
    assert_eq!(registry.segment_dir("cam2").await, None);
}

#[tokio::test]
async fn test_hls_upstream_exit_removes_directory() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry(root.path(), "exec sleep 30", "sleep 0.2");

    assert!(registry.start("cam3", "rtsp://camera/3", StreamMode::Hls).await);
    let dir = registry.segment_dir("cam3").await.unwrap();

    assert!(wait_for(|| !dir.exists(), Duration::from_secs(3)).await);
    assert!(registry.active_streams().await.is_empty());
}

#[tokio::test]
async fn test_double_start_keeps_first_session() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry(root.path(), "exec sleep 30", "exec sleep 30");

    assert!(registry.start("cam1", "rtsp://camera/1", StreamMode::Mjpeg).await);
    let first = registry.stats("cam1").await.unwrap();

    assert!(registry.start("cam1", "rtsp://camera/other", StreamMode::Mjpeg).await);
    let second = registry.stats("cam1").await.unwrap();

    assert_eq!(first.pid, second.pid);
    assert_eq!(second.source_url, "rtsp://camera/1");

    assert!(registry.stop("cam1").await);
    assert!(!registry.stop("cam1").await);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry(root.path(), "exec sleep 30", "exec sleep 30");

    assert!(registry.start("cam1", "rtsp://camera/1", StreamMode::Hls).await);
    assert!(registry.stop("cam1").await);

    assert!(registry.start("cam1", "rtsp://camera/1", StreamMode::Mjpeg).await);
    assert_eq!(registry.mode("cam1").await, Some(StreamMode::Mjpeg));

    registry.stop_all().await;
}

#[tokio::test]
async fn test_missing_transcoder() {
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path()).transcoder("/nonexistent/bin/ffmpeg");
    let registry = Arc::new(StreamRegistry::with_config(config));

    assert!(!registry.start("cam1", "rtsp://camera/1", StreamMode::Mjpeg).await);
    assert!(!registry.start("cam2", "rtsp://camera/2", StreamMode::Hls).await);

    assert_eq!(registry.mode("cam1").await, None);
    assert!(registry.active_streams().await.is_empty());
    assert!(!root.path().join("cam2").exists());
}

#[tokio::test]
async fn test_stop_all_terminates_everything() {
    let root = tempfile::tempdir().unwrap();
    // Ignores SIGTERM, so each stop has to escalate
    let registry = registry(
        root.path(),
        "trap '' TERM; while :; do sleep 1; done",
        "trap '' TERM; while :; do sleep 1; done",
    );

    for i in 0..3 {
        let id = format!("mj{}", i);
        assert!(registry.start(&id, "rtsp://camera", StreamMode::Mjpeg).await);
    }
    assert!(registry.start("hls", "rtsp://camera", StreamMode::Hls).await);
    assert_eq!(registry.stream_count().await, 4);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = tokio::time::Instant::now();
    registry.stop_all().await;

    // Teardowns run concurrently: one grace period, not four
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(registry.active_streams().await.is_empty());
    assert!(!root.path().join("hls").exists());
}

#[tokio::test]
async fn test_invalid_stream_id() {
    let root = tempfile::tempdir().unwrap();
    let registry = registry(root.path(), "exec sleep 30", "exec sleep 30");

    assert!(!registry.start("..", "rtsp://camera", StreamMode::Hls).await);
    assert!(!registry.start("a/b", "rtsp://camera", StreamMode::Hls).await);
    assert!(registry.active_streams().await.is_empty());
}
