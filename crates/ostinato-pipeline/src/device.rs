//! Hardware capture through CPAL.
//!
//! The device callback downmixes whatever the input delivers to mono
//! `i16` frames and pushes them into a bounded channel; the pipeline end
//! of that channel is an ordinary [`ChannelSource`]. A full channel means
//! the capture stage fell behind: the callback drops the frame, counts it,
//! and the next stage read reports an overrun.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::FromSample;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use tracing::debug;

use crate::capture::{CaptureError, CaptureSource};
use crate::constants::SAMPLE_RATE;
use crate::error::{Error, Result};

/// An open input device feeding a channel-backed capture source.
///
/// The CPAL stream is not `Send`; the handle stays with whoever opened it
/// while [`DeviceInput::source`] hands the reading side to the capture
/// task. Dropping the handle stops acquisition.
pub struct DeviceInput {
    _stream: cpal::Stream,
    receiver: Option<Receiver<i16>>,
    dropped: Arc<AtomicU64>,
    sample_rate: u32,
}

impl DeviceInput {
    /// Opens the default input device with roughly one second of channel
    /// backlog.
    pub fn open() -> Result<Self> {
        Self::with_backlog(SAMPLE_RATE as usize)
    }

    pub fn with_backlog(backlog: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(Error::DeviceNotAvailable)?;
        let config = device.default_input_config()?;
        let sample_rate = config.sample_rate().0;

        let (tx, rx) = bounded(backlog);
        let dropped = Arc::new(AtomicU64::new(0));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config.into(), tx, Arc::clone(&dropped))?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config.into(), tx, Arc::clone(&dropped))?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config.into(), tx, Arc::clone(&dropped))?
            }
            format => return Err(Error::UnsupportedFormat(format!("{format:?}"))),
        };
        stream.play()?;

        debug!(sample_rate, "input device opened");
        Ok(Self {
            _stream: stream,
            receiver: Some(rx),
            dropped,
            sample_rate,
        })
    }

    /// Actual device rate, which may differ from the desired
    /// [`SAMPLE_RATE`].
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames discarded because the channel was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Takes the reading side; callable once.
    pub fn source(&mut self) -> Option<DeviceSource> {
        let receiver = self.receiver.take()?;
        Some(DeviceSource {
            receiver,
            dropped: Arc::clone(&self.dropped),
            reported: 0,
        })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: Sender<i16>,
    dropped: Arc<AtomicU64>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    i16: cpal::FromSample<T>,
{
    let channels = config.channels as usize;

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for frame in data.chunks(channels) {
                // Downmix by averaging in a wider type.
                let sum: i32 = frame.iter().map(|s| i16::from_sample(*s) as i32).sum();
                let mono = (sum / channels as i32) as i16;
                if let Err(TrySendError::Full(_)) = tx.try_send(mono) {
                    dropped.fetch_add(1, Ordering::AcqRel);
                }
            }
        },
        |_err| {},
        None,
    )?;

    Ok(stream)
}

/// Channel-reading capture source that also surfaces device overruns.
pub struct DeviceSource {
    receiver: Receiver<i16>,
    dropped: Arc<AtomicU64>,
    reported: u64,
}

impl CaptureSource for DeviceSource {
    fn read(&mut self, out: &mut [i16]) -> std::result::Result<usize, CaptureError> {
        let seen = self.dropped.load(Ordering::Acquire);
        if seen > self.reported {
            self.reported = seen;
            return Err(CaptureError::Overrun);
        }

        let mut written = 0;
        while written < out.len() {
            match self.receiver.try_recv() {
                Ok(frame) => {
                    out[written] = frame;
                    written += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(CaptureError::Device("input stream closed".into()));
                }
            }
        }
        Ok(written)
    }
}
