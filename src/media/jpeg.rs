//! JPEG frame demuxing from a raw MJPEG byte stream
//!
//! The transcoder writes back-to-back JPEG images to its stdout with no
//! container around them. Frames are recovered by scanning for the two JPEG
//! markers:
//!
//! ```text
//! ... garbage ... | FF D8 | entropy-coded data ... | FF D9 | FF D8 | ...
//!                   SOI                              EOI     next SOI
//! ```
//!
//! This is a marker heuristic, not a JPEG parser: an `FF D9` pair that
//! happens to appear inside scan data before the real end marker splits the
//! image early.

use bytes::{Buf, Bytes, BytesMut};

use crate::config::DEFAULT_MAX_FRAME_SIZE;

/// Start-of-image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End-of-image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Stateful scanner that splits an unbounded byte stream into JPEG frames
#[derive(Debug)]
pub struct JpegDemuxer {
    /// Accumulated bytes not yet emitted as a frame
    buffer: BytesMut,
    /// Offset where the next end-marker search resumes (0 = from the start marker)
    eoi_scan_from: usize,
    /// Frames emitted so far
    frames: u64,
    /// Bytes thrown away because they were outside any frame
    discarded: u64,
    /// Partial frames abandoned for exceeding `max_frame_size`
    oversized: u64,
    /// Largest partial frame kept while waiting for its end marker
    max_frame_size: usize,
}

impl Default for JpegDemuxer {
    fn default() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl JpegDemuxer {
    /// Create an empty demuxer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty demuxer that gives up on frames larger than `max`
    pub fn with_max_frame_size(max: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            eoi_scan_from: 0,
            frames: 0,
            discarded: 0,
            oversized: 0,
            max_frame_size: max.max(SOI.len()),
        }
    }

    /// Append a chunk read from the stream
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extract the next complete frame, if the buffer holds one
    ///
    /// Returns `None` when more input is needed. A partial frame is always
    /// kept; bytes before the first start marker are dropped.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let Some(start) = find_marker(&self.buffer, SOI) else {
            // A trailing 0xFF may be the first half of a start marker split
            // across two reads.
            let keep = usize::from(self.buffer.last() == Some(&0xFF));
            let drop = self.buffer.len() - keep;
            self.discard(drop);
            self.eoi_scan_from = 0;
            return None;
        };

        let search_from = (start + SOI.len()).max(self.eoi_scan_from);
        let Some(rel_end) = find_marker(&self.buffer[search_from..], EOI) else {
            self.discard(start);
            if self.buffer.len() > self.max_frame_size {
                tracing::warn!(
                    buffered = self.buffer.len(),
                    max = self.max_frame_size,
                    "No end marker within frame size limit, dropping partial frame"
                );
                self.oversized += 1;
                self.discard(self.buffer.len());
                self.eoi_scan_from = 0;
                return None;
            }
            // The buffer now begins with SOI; an EOI may straddle the last byte.
            self.eoi_scan_from = self.buffer.len().saturating_sub(1).max(SOI.len());
            return None;
        };

        let end = search_from + rel_end + EOI.len();
        self.discard(start);
        let frame = self.buffer.split_to(end - start).freeze();
        self.eoi_scan_from = 0;
        self.frames += 1;

        Some(frame)
    }

    /// Append a chunk and drain every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.push(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Number of bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of frames emitted
    pub fn frames_emitted(&self) -> u64 {
        self.frames
    }

    /// Number of bytes discarded outside frames
    pub fn bytes_discarded(&self) -> u64 {
        self.discarded
    }

    /// Number of partial frames dropped for exceeding the size limit
    pub fn frames_oversized(&self) -> u64 {
        self.oversized
    }

    fn discard(&mut self, n: usize) {
        if n > 0 {
            self.buffer.advance(n);
            self.discarded += n as u64;
        }
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_jpeg(seed: u8, len: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(len + 4);
        data.extend_from_slice(&SOI);
        // Payload never contains 0xFF so markers cannot appear inside it
        data.extend((0..len).map(|i| (i as u8).wrapping_add(seed) % 0xFE));
        data.extend_from_slice(&EOI);
        data
    }

    fn sample_frames() -> Vec<Vec<u8>> {
        vec![make_jpeg(1, 10), make_jpeg(7, 0), make_jpeg(42, 25)]
    }

    #[test]
    fn test_single_frame() {
        let frame = make_jpeg(3, 16);
        let mut demuxer = JpegDemuxer::new();

        let frames = demuxer.feed(&frame);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame[..]);
        assert_eq!(demuxer.buffered(), 0);
        assert_eq!(demuxer.frames_emitted(), 1);
    }

    #[test]
    fn test_split_at_every_offset() {
        let originals = sample_frames();
        let stream: Vec<u8> = originals.concat();

        for offset in 0..=stream.len() {
            let mut demuxer = JpegDemuxer::new();
            let mut frames = demuxer.feed(&stream[..offset]);
            frames.extend(demuxer.feed(&stream[offset..]));

            assert_eq!(frames.len(), originals.len(), "split at offset {}", offset);
            for (got, want) in frames.iter().zip(&originals) {
                assert_eq!(&got[..], &want[..], "split at offset {}", offset);
            }
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let originals = sample_frames();
        let stream: Vec<u8> = originals.concat();
        let mut demuxer = JpegDemuxer::new();

        let frames: Vec<Bytes> = stream.iter().flat_map(|b| demuxer.feed(&[*b])).collect();

        assert_eq!(frames.len(), 3);
        for (got, want) in frames.iter().zip(&originals) {
            assert_eq!(&got[..], &want[..]);
        }
    }

    #[test]
    fn test_truncated_stream_emits_nothing() {
        let frame = make_jpeg(9, 32);
        let truncated = &frame[..frame.len() - 2];
        let mut demuxer = JpegDemuxer::new();

        let frames = demuxer.feed(truncated);

        assert!(frames.is_empty());
        // Partial frame is retained, never discarded
        assert_eq!(demuxer.buffered(), truncated.len());
        assert_eq!(demuxer.bytes_discarded(), 0);
    }

    #[test]
    fn test_garbage_is_discarded() {
        let mut demuxer = JpegDemuxer::new();

        assert!(demuxer.feed(&[0x00, 0x11, 0x22, 0x33]).is_empty());
        assert_eq!(demuxer.buffered(), 0);
        assert_eq!(demuxer.bytes_discarded(), 4);

        // Leading garbage before a real frame is skipped
        let frame = make_jpeg(5, 8);
        let mut input = vec![0x01, 0x02, 0x03];
        input.extend_from_slice(&frame);
        let frames = demuxer.feed(&input);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame[..]);
        assert_eq!(demuxer.bytes_discarded(), 7);
    }

    #[test]
    fn test_trailing_marker_byte_kept() {
        let mut demuxer = JpegDemuxer::new();

        assert!(demuxer.feed(&[0x10, 0x20, 0xFF]).is_empty());
        assert_eq!(demuxer.buffered(), 1);

        let frames = demuxer.feed(&[0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
    }

    #[test]
    fn test_end_marker_split_across_reads() {
        let mut demuxer = JpegDemuxer::new();

        assert!(demuxer.feed(&[0xFF, 0xD8, 0xAA, 0xBB, 0xFF]).is_empty());
        assert!(demuxer.feed(&[0xCC]).is_empty());
        let frames = demuxer.feed(&[0xFF, 0xD9, 0x00]);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xCC, 0xFF, 0xD9]);
        // The byte after the end marker is garbage and is dropped on the next scan
        assert_eq!(demuxer.buffered(), 0);
    }

    #[test]
    fn test_markers_only_frame() {
        let mut demuxer = JpegDemuxer::new();

        let frames = demuxer.feed(&[0xFF, 0xD8, 0xFF, 0xD9]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 4);
    }

    #[test]
    fn test_unterminated_frame_is_bounded() {
        let mut demuxer = JpegDemuxer::with_max_frame_size(16);

        let mut runaway = SOI.to_vec();
        runaway.extend(std::iter::repeat(0x42).take(10));
        assert!(demuxer.feed(&runaway).is_empty());
        assert_eq!(demuxer.buffered(), 12);

        // Crossing the limit drops the partial frame instead of growing
        assert!(demuxer.feed(&[0x42; 10]).is_empty());
        assert_eq!(demuxer.buffered(), 0);
        assert_eq!(demuxer.frames_oversized(), 1);

        let frame = make_jpeg(2, 6);
        let frames = demuxer.feed(&frame);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &frame[..]);
    }
}
