//! Relay Dump - Pulls one RTSP stream and reports what the relay produces
//!
//! Run with: cargo run --example relay_dump -- <rtsp_url> [mjpeg|hls] [output_dir]
//!
//! Examples:
//!   cargo run --example relay_dump -- rtsp://10.0.0.5/stream
//!   cargo run --example relay_dump -- rtsp://10.0.0.5/stream mjpeg ./frames
//!   cargo run --example relay_dump -- rtsp://10.0.0.5/stream hls
//!
//! In MJPEG mode every frame is counted, and written to `output_dir` as
//! `frame000001.jpg`, ... when a directory is given. In HLS mode the
//! segment directory is printed so the playlist can be opened with a player:
//!
//!   ffplay /tmp/rtsp_relay_hls/demo/stream.m3u8
//!
//! Press Ctrl+C to stop; every transcoder is terminated on the way out.
//! Requires `ffmpeg` on `PATH`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rtsp_relay::{RelayConfig, StreamMode, StreamRegistry};

const STREAM_ID: &str = "demo";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtsp_relay=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        eprintln!("Usage: relay_dump <rtsp_url> [mjpeg|hls] [output_dir]");
        std::process::exit(2);
    };
    let mode: StreamMode = match args.next() {
        Some(mode) => mode.parse()?,
        None => StreamMode::Mjpeg,
    };
    let output_dir = args.next().map(PathBuf::from);

    let registry = Arc::new(StreamRegistry::with_config(RelayConfig::default()));

    if !registry.start(STREAM_ID, &url, mode).await {
        eprintln!("Failed to start relay for {}", url);
        std::process::exit(1);
    }

    println!("Relaying {} as {}", url, mode);

    let work = {
        let registry = Arc::clone(&registry);
        async move {
            match mode {
                StreamMode::Mjpeg => dump_frames(&registry, output_dir).await,
                StreamMode::Hls => report_hls(&registry).await,
            }
        }
    };

    tokio::select! {
        result = work => result?,
        _ = tokio::signal::ctrl_c() => println!("\nShutting down..."),
    }

    registry.stop_all().await;
    Ok(())
}

async fn dump_frames(
    registry: &StreamRegistry,
    output_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(mut frames) = registry.frames(STREAM_ID).await else {
        return Ok(());
    };

    if let Some(dir) = &output_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut count = 0u64;
    while let Some(frame) = frames.next_frame().await {
        count += 1;

        if let Some(dir) = &output_dir {
            let path = dir.join(format!("frame{:06}.jpg", count));
            tokio::fs::write(&path, &frame).await?;
        }

        if count % 30 == 0 {
            if let Some(stats) = registry.stats(STREAM_ID).await {
                println!(
                    "frames={} dropped={} rate={:.1}fps bitrate={}bps",
                    stats.frames_published,
                    stats.frames_dropped,
                    stats.framerate(),
                    stats.bitrate()
                );
            }
        }
    }

    println!("Stream ended after {} frames", count);
    Ok(())
}

async fn report_hls(registry: &StreamRegistry) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(playlist) = registry.playlist_path(STREAM_ID).await {
        println!("Playlist: {}", playlist.display());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;

        let Some(dir) = registry.segment_dir(STREAM_ID).await else {
            println!("Stream ended");
            return Ok(());
        };

        let mut segments = 0;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "ts") {
                segments += 1;
            }
        }
        println!("{} segment(s) in {}", segments, dir.display());
    }
}
