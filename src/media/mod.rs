//! Media handling for the MJPEG path
//!
//! This module provides:
//! - JPEG frame extraction from the transcoder's raw stdout
//! - multipart part framing for HTTP delivery

pub mod jpeg;
pub mod multipart;

pub use jpeg::JpegDemuxer;
