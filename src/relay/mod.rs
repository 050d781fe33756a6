//! Bounded frame relay for MJPEG sessions
//!
//! Bridges the session's reader task (producer) and HTTP response writers
//! (consumers) without letting either side stall the other.
//!
//! ```text
//!  transcoder stdout ──► JpegDemuxer ──► FrameRelay::push()
//!                                              │  broadcast ring, capacity 2
//!                       ┌──────────────────────┼──────────────────────┐
//!                       ▼                      ▼                      ▼
//!                FrameSequence          FrameSequence          FrameSequence
//!                (viewer 1)             (viewer 2)             (viewer N)
//! ```
//!
//! A full ring overwrites its oldest frame, so a viewer that falls behind
//! skips ahead to recent frames instead of replaying a backlog. Retained
//! frames keep their relative order.

pub mod fanout;
pub mod frame;

pub use fanout::{FrameRelay, FrameSequence};
pub use frame::RelayFrame;
