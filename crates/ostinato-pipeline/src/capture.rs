//! Capture source abstraction.
//!
//! The pipeline never talks to audio hardware directly; it pulls signed
//! 16-bit mono frames from a [`CaptureSource`], where "nothing available
//! right now" is an ordinary zero-length read, not an error. The standard
//! implementation is [`ChannelSource`], fed by whatever producer exists:
//! a device callback (see the `audio-input` feature) or a test harness
//! pushing synthetic frames.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use thiserror::Error;

use ostinato_rt::sync::Mutex;

/// Failure modes of a capture read.
///
/// Overruns are transient (the device dropped frames; skip this period and
/// move on). Everything else means the source is gone for good and is
/// reported upward.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture overrun, device frames dropped")]
    Overrun,

    #[error("capture device unavailable: {0}")]
    Device(String),
}

/// A non-blocking supplier of mono `i16` frames.
pub trait CaptureSource: Send {
    /// Copies at most `out.len()` pending frames into `out`, returning how
    /// many were written. `Ok(0)` means no new frames yet.
    fn read(&mut self, out: &mut [i16]) -> std::result::Result<usize, CaptureError>;
}

/// A capture source shared between the periodic capture stage and the
/// synchronous reference-recording path.
///
/// Reads are short and never block, so a read can run under the
/// priority-inheriting lock without stalling either side.
pub type SharedSource = Arc<Mutex<Box<dyn CaptureSource>>>;

/// Wraps a source for sharing. See [`SharedSource`].
pub fn shared(source: Box<dyn CaptureSource>) -> std::io::Result<SharedSource> {
    Ok(Arc::new(Mutex::new(source)?))
}

/// Capture source backed by a bounded channel.
///
/// The producing side pushes individual frames; `read` drains whatever has
/// accumulated. A disconnected producer turns into a device failure once
/// the backlog is exhausted.
pub struct ChannelSource {
    receiver: Receiver<i16>,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<i16>) -> Self {
        Self { receiver }
    }

    /// Frames currently queued.
    pub fn backlog(&self) -> usize {
        self.receiver.len()
    }
}

impl CaptureSource for ChannelSource {
    fn read(&mut self, out: &mut [i16]) -> std::result::Result<usize, CaptureError> {
        let mut written = 0;
        while written < out.len() {
            match self.receiver.try_recv() {
                Ok(frame) => {
                    out[written] = frame;
                    written += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if written == 0 {
                        return Err(CaptureError::Device("frame producer disconnected".into()));
                    }
                    break;
                }
            }
        }
        Ok(written)
    }
}

/// Builds a bounded frame channel and the source reading from it.
pub fn sample_channel(capacity: usize) -> (Sender<i16>, ChannelSource) {
    let (tx, rx) = bounded(capacity);
    (tx, ChannelSource::new(rx))
}
