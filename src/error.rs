//! Error types
//!
//! Operations exposed to the HTTP layer report failure as `bool`/`Option`;
//! this enum carries the detail internally and into the logs.

use std::io;
use std::path::PathBuf;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for relay operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transcoder executable missing or the OS refused to create the process
    #[error("Failed to spawn transcoder {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Mode string is neither `mjpeg` nor `hls`
    #[error("Unknown stream mode: {0}")]
    UnknownMode(String),

    /// Stream id cannot be used as a directory name
    #[error("Invalid stream id: {0:?}")]
    InvalidStreamId(String),

    /// Segment directory could not be prepared
    #[error("Segment directory {}: {source}", path.display())]
    SegmentDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Transcoder was spawned without a stdout pipe
    #[error("Transcoder stdout not captured")]
    MissingStdout,

    /// A stop arrived while the stream was still starting
    #[error("Start cancelled for stream: {0}")]
    StartCancelled(String),
}
