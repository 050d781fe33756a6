//! RTSP relay core
//!
//! Pulls RTSP camera streams through an external transcoder (ffmpeg) and
//! exposes them in two forms:
//!
//! - **MJPEG**: the transcoder writes a JPEG sequence to stdout, which is
//!   split into frames and fanned out to any number of viewers. Slow viewers
//!   drop old frames rather than building latency.
//! - **HLS**: the transcoder writes a playlist and rolling segments into a
//!   per-stream directory that an HTTP layer can serve as static files.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtsp_relay::{RelayConfig, StreamMode, StreamRegistry};
//!
//! # async fn run() {
//! let registry = Arc::new(StreamRegistry::with_config(RelayConfig::default()));
//!
//! if registry.start("cam1", "rtsp://10.0.0.5/stream", StreamMode::Mjpeg).await {
//!     if let Some(mut frames) = registry.frames("cam1").await {
//!         while let Some(jpeg) = frames.next_frame().await {
//!             println!("frame: {} bytes", jpeg.len());
//!         }
//!     }
//! }
//!
//! registry.stop_all().await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hls;
pub mod media;
pub mod process;
pub mod registry;
pub mod relay;
pub mod stats;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use registry::{StreamMode, StreamRegistry};
