//! `multipart/x-mixed-replace` framing for MJPEG over HTTP
//!
//! Browsers render a multipart response whose parts are JPEG images as a
//! live picture, replacing the image on every part:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <jpeg bytes>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Part boundary
pub const BOUNDARY: &str = "frame";

/// Response `Content-Type` for an MJPEG stream
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Wrap one JPEG frame as a multipart body part
pub fn encode_part(frame: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + frame.len() + PART_TRAILER.len());
    part.put_slice(PART_HEADER);
    part.put_slice(frame);
    part.put_slice(PART_TRAILER);
    part.freeze()
}
