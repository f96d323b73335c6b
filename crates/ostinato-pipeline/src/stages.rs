//! Periodic stage bodies.
//!
//! Each function here is the body of one periodic task: it paces itself
//! through the [`TaskContext`], exchanges data exclusively through CABs,
//! and exits when cooperative cancellation is requested. Consumers skip
//! work whenever the freshest buffer carries a publish timestamp they have
//! already processed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use ostinato_analysis::{block_energy, normalized_correlation, CrossCorrelator, HalfComplexFft};
use ostinato_cab::Cab;
use ostinato_rt::TaskContext;

use crate::capture::{CaptureError, SharedSource};
use crate::constants::{BLOCK_FRAMES, I16_SCALE, PADDED_FRAMES};
use crate::error::{Error, Result};
use crate::sink::PlaybackSink;

/// How long the synchronous reference recorder naps between empty reads.
const REFERENCE_POLL: Duration = Duration::from_millis(1);

/// One block of raw capture frames, the capture-CAB message.
pub struct CaptureBlock {
    pub samples: Vec<i16>,
}

impl CaptureBlock {
    pub fn silent() -> Self {
        Self {
            samples: vec![0; BLOCK_FRAMES],
        }
    }

    /// Builds the buffer pool a capture CAB is initialized with.
    pub fn pool(n: usize) -> Vec<Self> {
        (0..n).map(|_| Self::silent()).collect()
    }
}

/// A transformed block: packed half-complex spectrum plus the block's
/// self-correlation. The spectrum-CAB message and the shape of a recorded
/// reference.
pub struct SpectrumBlock {
    pub bins: Vec<f32>,
    pub energy: f32,
}

impl SpectrumBlock {
    pub fn empty() -> Self {
        Self {
            bins: vec![0.0; PADDED_FRAMES],
            energy: 0.0,
        }
    }

    pub fn pool(n: usize) -> Vec<Self> {
        (0..n).map(|_| Self::empty()).collect()
    }
}

/// Typed per-task payload attached at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageConfig {
    Capture,
    Spectral,
    /// A matcher is bound to one registry file.
    Matcher { file: usize },
}

/// Capture stage: drains the source into a reserved buffer until one full
/// block is assembled, publishes it, and sleeps out the period.
///
/// Nothing-available reads just spin the fill loop; overruns are logged
/// and skipped; a dead device ends the task with an error. On exit the
/// capture CAB is reset so late consumers see it as empty.
pub fn capture_stage(
    source: &SharedSource,
    cab: &Cab<CaptureBlock>,
    ctx: &mut TaskContext<StageConfig>,
) -> Result<()> {
    ctx.begin_period();
    while !ctx.cancelled() {
        let mut block = cab.reserve()?;
        let mut filled = 0;
        while filled < BLOCK_FRAMES && !ctx.cancelled() {
            let read = source.lock().read(&mut block.samples[filled..]);
            match read {
                Ok(0) => std::thread::yield_now(),
                Ok(n) => filled += n,
                Err(CaptureError::Overrun) => {
                    warn!(task = ctx.id(), "capture overrun, frames dropped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if filled == BLOCK_FRAMES {
            block.publish();
        } else {
            // Cancelled mid-fill; the reservation falls back to the pool.
            drop(block);
        }

        if ctx.deadline_missed() {
            warn!(task = ctx.id(), "capture stage missed its deadline");
        }
        ctx.await_period();
    }

    cab.reset();
    Ok(())
}

/// Spectral stage: transforms each fresh capture block into a zero-padded
/// half-complex spectrum and its self-correlation.
///
/// The staleness gate compares publish timestamps, not buffer identity; a
/// republished buffer with a newer stamp is processed, the same stamp
/// twice is not.
pub fn spectral_stage(
    input: &Cab<CaptureBlock>,
    output: &Cab<SpectrumBlock>,
    ctx: &mut TaskContext<StageConfig>,
) -> Result<()> {
    let mut fft = HalfComplexFft::new(PADDED_FRAMES)?;
    let mut padded = vec![0.0f32; PADDED_FRAMES];
    let mut last_processed: Option<Instant> = None;

    ctx.begin_period();
    while !ctx.cancelled() {
        match input.latest() {
            Ok(block) => {
                let stamp = block.timestamp();
                if last_processed.map_or(true, |t| stamp > t) {
                    // Copy out through the read view, then transform with
                    // the buffer already released.
                    for (dst, src) in padded.iter_mut().zip(&block.samples) {
                        *dst = *src as f32 / I16_SCALE;
                    }
                    drop(block);
                    padded[BLOCK_FRAMES..].fill(0.0);

                    let energy = block_energy(&padded[..BLOCK_FRAMES]);
                    let mut out = output.reserve()?;
                    fft.forward(&padded, &mut out.bins)?;
                    out.energy = energy;
                    out.publish();

                    last_processed = Some(stamp);
                }
            }
            Err(ostinato_cab::Error::Empty) => {}
            Err(e) => return Err(e.into()),
        }

        if ctx.deadline_missed() {
            warn!(task = ctx.id(), "spectral stage missed its deadline");
        }
        ctx.await_period();
    }
    Ok(())
}

/// Matcher stage: scores each fresh spectrum against `reference` and
/// fires the sink when the normalized correlation clears `threshold`.
///
/// The bound registry file comes from the task payload, so the same body
/// serves every open file.
pub fn matcher_stage(
    input: &Cab<SpectrumBlock>,
    reference: Arc<SpectrumBlock>,
    sink: Arc<dyn PlaybackSink>,
    threshold: f32,
    ctx: &mut TaskContext<StageConfig>,
) -> Result<()> {
    let file = match ctx.payload() {
        Some(StageConfig::Matcher { file }) => *file,
        _ => return Err(Error::MissingStageConfig),
    };

    let mut correlator = CrossCorrelator::new(PADDED_FRAMES)?;
    let mut live = vec![0.0f32; PADDED_FRAMES];
    let mut last_processed: Option<Instant> = None;

    ctx.begin_period();
    while !ctx.cancelled() {
        match input.latest() {
            Ok(view) => {
                let stamp = view.timestamp();
                if last_processed.map_or(true, |t| stamp > t) {
                    live.copy_from_slice(&view.bins);
                    let live_energy = view.energy;
                    drop(view);

                    let peak = correlator.peak(&live, &reference.bins)?;
                    let score = normalized_correlation(peak, live_energy, reference.energy);
                    if score > threshold {
                        debug!(file, score, "reference pattern recognized");
                        sink.play(file);
                    }

                    last_processed = Some(stamp);
                }
            }
            Err(ostinato_cab::Error::Empty) => {}
            Err(e) => return Err(e.into()),
        }

        if ctx.deadline_missed() {
            warn!(task = ctx.id(), file, "matcher stage missed its deadline");
        }
        ctx.await_period();
    }
    Ok(())
}

/// Records one full block from the source and turns it into a reference
/// spectrum.
///
/// This is the one genuinely blocking capture path: it polls the shared
/// source until a whole block has been acquired. Overruns restart nothing,
/// they only cost the dropped frames.
pub fn record_reference(source: &SharedSource) -> Result<SpectrumBlock> {
    let mut samples = vec![0i16; BLOCK_FRAMES];
    let mut filled = 0;
    while filled < BLOCK_FRAMES {
        let read = source.lock().read(&mut samples[filled..]);
        match read {
            Ok(0) => std::thread::sleep(REFERENCE_POLL),
            Ok(n) => filled += n,
            Err(CaptureError::Overrun) => {
                warn!("overrun while recording reference");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut padded = vec![0.0f32; PADDED_FRAMES];
    for (dst, src) in padded.iter_mut().zip(&samples) {
        *dst = *src as f32 / I16_SCALE;
    }

    let mut reference = SpectrumBlock::empty();
    reference.energy = block_energy(&padded[..BLOCK_FRAMES]);
    HalfComplexFft::new(PADDED_FRAMES)?.forward(&padded, &mut reference.bins)?;
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{sample_channel, shared};
    use approx::assert_relative_eq;

    fn tone(frames: usize) -> Vec<i16> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / 128.0;
                ((2.0 * std::f32::consts::PI * t).sin() * 12_000.0) as i16
            })
            .collect()
    }

    #[test]
    fn record_reference_assembles_one_block() {
        let (tx, source) = sample_channel(BLOCK_FRAMES);
        let source = shared(Box::new(source)).unwrap();

        let samples = tone(BLOCK_FRAMES);
        let feeder = {
            let samples = samples.clone();
            std::thread::spawn(move || {
                for s in samples {
                    tx.send(s).unwrap();
                }
            })
        };

        let reference = record_reference(&source).unwrap();
        feeder.join().unwrap();

        let expected: f32 = samples
            .iter()
            .map(|s| {
                let x = *s as f32 / I16_SCALE;
                x * x
            })
            .sum();
        assert_relative_eq!(reference.energy, expected, max_relative = 1e-5);
        assert_eq!(reference.bins.len(), PADDED_FRAMES);
    }

    #[test]
    fn record_reference_reports_dead_source() {
        let (tx, source) = sample_channel(16);
        drop(tx);
        let source = shared(Box::new(source)).unwrap();
        assert!(matches!(
            record_reference(&source),
            Err(Error::Capture(CaptureError::Device(_)))
        ));
    }

    #[test]
    fn reference_matches_itself_at_threshold_one() {
        let (tx, source) = sample_channel(BLOCK_FRAMES);
        let source = shared(Box::new(source)).unwrap();
        for s in tone(BLOCK_FRAMES) {
            tx.send(s).unwrap();
        }
        let reference = record_reference(&source).unwrap();

        let mut correlator = CrossCorrelator::new(PADDED_FRAMES).unwrap();
        let peak = correlator.peak(&reference.bins, &reference.bins).unwrap();
        let score = normalized_correlation(peak, reference.energy, reference.energy);
        assert_relative_eq!(score, 1.0, epsilon = 1e-3);
    }
}
