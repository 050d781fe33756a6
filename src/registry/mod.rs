//! Stream registry
//!
//! The registry maps stream ids to running sessions. Each session owns one
//! transcoder process plus either a frame relay (MJPEG) or a segment
//! directory (HLS), and one background task that watches it.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<id,    │
//!                     │   Slot::Starting(gen)   │
//!                     │   Slot::Running(Arc<    │
//!                     │     StreamSession>)     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!              ┌──────────────────┴──────────────────┐
//!              ▼                                     ▼
//!       MJPEG session                          HLS session
//!   ffmpeg stdout ──► pump_frames()       ffmpeg ──► <hls_root>/<id>/
//!              │                          watch_liveness()
//!              ▼
//!   FrameRelay ──► FrameSequence (per viewer)
//! ```
//!
//! # Lifecycle
//!
//! `start` reserves the id, spawns the transcoder without holding the table
//! lock, then publishes the session. `stop` removes the entry first, so new
//! lookups miss it at once, and then tears the session down. A transcoder
//! that exits on its own is purged by its background task.

pub mod entry;
pub mod store;
pub mod worker;

pub use entry::{StreamMode, StreamSession};
pub use store::StreamRegistry;
