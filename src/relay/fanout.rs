//! Bounded frame relay implementation
//!
//! One producer (the session's reader task) and any number of consumers.
//! Every consumer owns an independent cursor into a `broadcast` ring of
//! `capacity` slots, so a slow viewer only loses its own stale frames and
//! never holds back the producer or other viewers.
//!
//! The relay is created with one receiver already attached. Frames pushed
//! before the first viewer arrives wait there (newest `capacity` kept) and
//! are handed to that viewer; later viewers start from the live edge.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use super::frame::RelayFrame;

/// Counters shared between the relay and its sequences
#[derive(Debug, Default)]
struct RelayCounters {
    published: AtomicU64,
    dropped: AtomicU64,
}

struct RelayState {
    /// Dropped on finish; consumers drain what they hold, then end
    tx: Option<broadcast::Sender<RelayFrame>>,
    /// Receiver reserved for the first consumer
    primed: Option<broadcast::Receiver<RelayFrame>>,
}

/// Drop-oldest frame relay for one MJPEG session
pub struct FrameRelay {
    state: Mutex<RelayState>,
    counters: Arc<RelayCounters>,
    frame_timeout: Duration,
    stop: CancellationToken,
}

impl FrameRelay {
    /// Create a relay holding at most `capacity` frames per consumer
    ///
    /// `stop` is the owning session's stop signal; consumers check it whenever
    /// `frame_timeout` passes without a frame.
    pub fn new(capacity: usize, frame_timeout: Duration, stop: CancellationToken) -> Self {
        let (tx, primed) = broadcast::channel(capacity.max(1));

        Self {
            state: Mutex::new(RelayState {
                tx: Some(tx),
                primed: Some(primed),
            }),
            counters: Arc::new(RelayCounters::default()),
            frame_timeout,
            stop,
        }
    }

    /// Publish a frame without blocking
    ///
    /// When a consumer's ring is full its oldest frame is overwritten.
    /// Returns the frame's index.
    pub fn push(&self, data: Bytes) -> u64 {
        let index = self.counters.published.fetch_add(1, Ordering::Relaxed);

        if let Some(tx) = &self.state.lock().tx {
            // Err only means every consumer has gone away
            let _ = tx.send(RelayFrame::new(index, data));
        }
        index
    }

    /// Signal end of stream to every current and future consumer
    pub fn finish(&self) {
        self.state.lock().tx.take();
    }

    /// Whether `finish` has been called
    pub fn is_finished(&self) -> bool {
        self.state.lock().tx.is_none()
    }

    /// Attach a new consumer
    ///
    /// The first consumer also receives the frames still held from before it
    /// subscribed; later ones see frames published from now on.
    pub fn subscribe(&self) -> FrameSequence {
        let mut state = self.state.lock();

        let (rx, ended) = match (state.primed.take(), &state.tx) {
            (Some(rx), _) => (rx, false),
            (None, Some(tx)) => (tx.subscribe(), false),
            (None, None) => {
                // Finished: a receiver whose sender is already gone
                let (_, rx) = broadcast::channel(1);
                (rx, true)
            }
        };

        FrameSequence {
            rx,
            ended,
            frame_timeout: self.frame_timeout,
            stop: self.stop.clone(),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Number of attached consumers
    pub fn subscriber_count(&self) -> usize {
        let state = self.state.lock();
        let receivers = state.tx.as_ref().map_or(0, |tx| tx.receiver_count());
        receivers.saturating_sub(usize::from(state.primed.is_some()))
    }

    /// Frames published so far
    pub fn frames_published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    /// Frames skipped by lagging consumers, summed over all consumers
    pub fn frames_dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

/// Lazy sequence of JPEG frames for one consumer
///
/// Ends when the producer finishes, or when the session's stop signal is
/// observed after a frame timeout.
pub struct FrameSequence {
    rx: broadcast::Receiver<RelayFrame>,
    ended: bool,
    frame_timeout: Duration,
    stop: CancellationToken,
    counters: Arc<RelayCounters>,
}

impl FrameSequence {
    /// Wait for the next frame's bytes
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        self.next_indexed().await.map(|frame| frame.data)
    }

    /// Wait for the next frame together with its sequence index
    pub async fn next_indexed(&mut self) -> Option<RelayFrame> {
        while !self.ended {
            match tokio::time::timeout(self.frame_timeout, self.rx.recv()).await {
                Ok(Ok(frame)) => return Some(frame),
                Ok(Err(RecvError::Closed)) => self.ended = true,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    self.counters.dropped.fetch_add(skipped, Ordering::Relaxed);
                    tracing::trace!(skipped = skipped, "Consumer lagging, skipped stale frames");
                }
                Err(_) => {
                    // No new frame yet; only give up if the session went away
                    if self.stop.is_cancelled() {
                        self.ended = true;
                    }
                }
            }
        }

        None
    }

    /// Whether the sequence has terminated
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Convert into a `Stream` of frame bytes, e.g. for an HTTP body
    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send + 'static {
        futures::stream::unfold(self, |mut seq| async move {
            seq.next_frame().await.map(|frame| (frame, seq))
        })
    }
}
