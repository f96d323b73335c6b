//! Stage-level pipeline tests.
//!
//! Drives the spectral stage as a real periodic task against manually
//! published capture blocks, checking the timestamp staleness gate: a
//! consumer running faster than its producer processes each publish
//! exactly once, and a consumer starting late never sees superseded data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use ostinato::constants::BLOCK_FRAMES;
use ostinato::pipeline::spectral_stage;
use ostinato::{Cab, CaptureBlock, SpectrumBlock, StageConfig, TaskManager, TimingContract};

/// Fast contract so the consumer laps the manual producer many times.
fn fast_contract() -> TimingContract {
    TimingContract::new(Duration::from_millis(5), Duration::from_millis(5), 0)
}

fn publish_constant(cab: &Cab<CaptureBlock>, value: i16) {
    let mut block = cab.reserve().unwrap();
    block.samples.fill(value);
    block.publish();
}

/// DC bin of the spectrum of a constant block with sample value `v`.
fn dc_of_constant(value: i16) -> f32 {
    BLOCK_FRAMES as f32 * value as f32 / 32_768.0
}

fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Distinct publish stamps currently observable, appended to `seen`.
fn track_stamps(cab: &Cab<SpectrumBlock>, seen: &mut Vec<(Instant, f32)>) {
    if let Ok(view) = cab.latest() {
        let stamp = view.timestamp();
        if seen.last().map_or(true, |(t, _)| *t != stamp) {
            seen.push((stamp, view.bins[0]));
        }
    }
}

#[test]
fn single_publish_is_processed_exactly_once() {
    let capture = Arc::new(Cab::new(0, CaptureBlock::pool(3)).unwrap());
    let spectrum = Arc::new(Cab::new(1, SpectrumBlock::pool(3)).unwrap());

    publish_constant(&capture, 1000);

    let manager: TaskManager<StageConfig> = TaskManager::with_capacity(2).unwrap();
    let (input, output) = (Arc::clone(&capture), Arc::clone(&spectrum));
    let handle = manager
        .spawn(fast_contract(), Some(StageConfig::Spectral), move |mut ctx| {
            spectral_stage(&input, &output, &mut ctx).unwrap();
        })
        .unwrap();

    assert!(wait_for(|| spectrum.latest().is_ok(), Duration::from_secs(5)));
    let first_stamp = spectrum.latest().unwrap().timestamp();

    // Many consumer periods later the same input stamp has produced no
    // second spectrum.
    std::thread::sleep(Duration::from_millis(60));
    let view = spectrum.latest().unwrap();
    assert_eq!(view.timestamp(), first_stamp);
    assert_relative_eq!(view.bins[0], dc_of_constant(1000), max_relative = 1e-4);
    drop(view);

    manager.cancel(handle).unwrap();
    manager.join(handle).unwrap();
}

#[test]
fn late_consumer_sees_only_the_freshest_then_each_newer_once() {
    let capture = Arc::new(Cab::new(0, CaptureBlock::pool(4)).unwrap());
    let spectrum = Arc::new(Cab::new(1, SpectrumBlock::pool(4)).unwrap());

    // T1 then T2 published before the consumer exists.
    publish_constant(&capture, 1000);
    std::thread::sleep(Duration::from_millis(2));
    publish_constant(&capture, 2000);

    let manager: TaskManager<StageConfig> = TaskManager::with_capacity(2).unwrap();
    let (input, output) = (Arc::clone(&capture), Arc::clone(&spectrum));
    let handle = manager
        .spawn(fast_contract(), Some(StageConfig::Spectral), move |mut ctx| {
            spectral_stage(&input, &output, &mut ctx).unwrap();
        })
        .unwrap();

    let mut seen = Vec::new();
    assert!(wait_for(
        || {
            track_stamps(&spectrum, &mut seen);
            !seen.is_empty()
        },
        Duration::from_secs(5)
    ));

    // T3 arrives while the consumer is live.
    publish_constant(&capture, 3000);
    assert!(wait_for(
        || {
            track_stamps(&spectrum, &mut seen);
            seen.len() >= 2
        },
        Duration::from_secs(5)
    ));

    // Settle, then make sure nothing was reprocessed.
    std::thread::sleep(Duration::from_millis(60));
    track_stamps(&spectrum, &mut seen);

    manager.cancel(handle).unwrap();
    manager.join(handle).unwrap();

    // Exactly two spectra: T2 (never T1) and then T3.
    assert_eq!(seen.len(), 2, "stamps seen: {seen:?}");
    assert_relative_eq!(seen[0].1, dc_of_constant(2000), max_relative = 1e-4);
    assert_relative_eq!(seen[1].1, dc_of_constant(3000), max_relative = 1e-4);
}
