//! HLS segment directory handling
//!
//! In HLS mode the transcoder writes its playlist and rolling `.ts`
//! segments straight to disk. The core only manages the directory:
//!
//! ```text
//! <hls_root>/
//!   <stream id>/
//!     stream.m3u8
//!     segment000.ts
//!     segment001.ts
//!     ...
//! ```
//!
//! A stream's directory is recreated empty before its transcoder starts and
//! removed recursively as the last step of stopping it.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Playlist file name inside a stream directory
pub const PLAYLIST_NAME: &str = "stream.m3u8";

/// Segment file name pattern handed to the transcoder
pub const SEGMENT_PATTERN: &str = "segment%03d.ts";

/// `Content-Type` for playlists
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// `Content-Type` for MPEG-TS segments
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// `Cache-Control` value for every HLS response; the playlist changes every segment
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Content type for a file served out of a segment directory
pub fn content_type(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "m3u8" => Some(PLAYLIST_CONTENT_TYPE),
        "ts" => Some(SEGMENT_CONTENT_TYPE),
        _ => None,
    }
}

/// Check that a stream id is usable as a single directory name
pub fn validate_stream_id(id: &str) -> Result<()> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == id && !id.contains(['/', '\\']) => {
            Ok(())
        }
        _ => Err(Error::InvalidStreamId(id.to_string())),
    }
}

/// Per-stream segment directories under one root
#[derive(Debug, Clone)]
pub struct SegmentStore {
    root: PathBuf,
}

impl SegmentStore {
    /// Create a store rooted at `root` (created lazily)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a stream id
    pub fn stream_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Create a fresh, empty directory for `id`, removing any stale one
    pub async fn prepare(&self, id: &str) -> Result<PathBuf> {
        validate_stream_id(id)?;
        let dir = self.stream_dir(id);

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(dir = %dir.display(), "Removed stale segment directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(Error::SegmentDir { path: dir, source }),
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| Error::SegmentDir {
                path: dir.clone(),
                source,
            })?;

        Ok(dir)
    }

    /// Recursively remove a stream directory; missing directories are fine
    pub async fn remove(dir: &Path) {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => tracing::debug!(dir = %dir.display(), "Removed segment directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove segment directory")
            }
        }
    }

    /// Resolve a requested file name inside a segment directory
    ///
    /// Only plain `.m3u8`/`.ts` file names are accepted, so a request can
    /// never reach outside the stream's directory.
    pub fn resolve(dir: &Path, name: &str) -> Option<PathBuf> {
        validate_stream_id(name).ok()?;
        let path = dir.join(name);
        content_type(&path)?;
        Some(path)
    }
}
