//! Per-session background loops
//!
//! Each session runs exactly one of these:
//! - MJPEG: [`pump_frames`] reads the transcoder's stdout through the demuxer
//!   into the relay. Pipe close means the transcoder is gone.
//! - HLS: [`watch_liveness`] polls the process, since its output goes to disk.
//!
//! Both return when the stop signal fires or the upstream ends; the caller
//! decides whether that was an explicit stop or an unexpected exit.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::media::JpegDemuxer;
use crate::process::TranscoderProcess;
use crate::relay::FrameRelay;
use crate::stats::StreamCounters;

/// Pump bytes from `reader` through `demuxer` into `relay` as JPEG frames
///
/// Read errors count as end of stream. The relay is finished on return so
/// waiting viewers unblock. Returns the number of frames published.
pub async fn pump_frames<R>(
    mut reader: R,
    mut demuxer: JpegDemuxer,
    relay: &FrameRelay,
    stop: &CancellationToken,
    counters: &StreamCounters,
    chunk_size: usize,
) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        let read = tokio::select! {
            _ = stop.cancelled() => break,
            read = reader.read(&mut chunk) => read,
        };

        match read {
            Ok(0) => {
                tracing::debug!("Transcoder output closed");
                break;
            }
            Ok(n) => {
                counters.record_read(n);
                for frame in demuxer.feed(&chunk[..n]) {
                    relay.push(frame);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Transcoder output read failed");
                break;
            }
        }
    }

    relay.finish();

    if demuxer.buffered() > 0 {
        tracing::debug!(
            buffered = demuxer.buffered(),
            "Discarding incomplete frame at end of stream"
        );
    }

    demuxer.frames_emitted()
}

/// Wait until `process` exits or `stop` fires, checking every `interval`
pub async fn watch_liveness(process: &TranscoderProcess, stop: &CancellationToken, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {
                if !process.is_alive().await {
                    return;
                }
            }
        }
    }
}
