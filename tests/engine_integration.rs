//! Engine-level integration tests.
//!
//! Exercises the assembled pipeline with a channel-backed capture source:
//! lifecycle guards, reference recording, and the full
//! capture → spectrum → matcher → sink path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use ostinato::constants::BLOCK_FRAMES;
use ostinato::{sample_channel, Error, OstinatoEngine, PlaybackSink};

/// Stage logs show up under RUST_LOG when a test fails.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Sink that records every trigger.
#[derive(Default)]
struct RecordingSink {
    plays: Mutex<Vec<usize>>,
}

impl RecordingSink {
    fn plays(&self) -> Vec<usize> {
        self.plays.lock().unwrap().clone()
    }
}

impl PlaybackSink for RecordingSink {
    fn play(&self, file: usize) {
        self.plays.lock().unwrap().push(file);
    }
}

/// One block of a sine whose period (128 frames) divides the block length,
/// so any window into a continuous replay stays phase-coherent.
fn tone_block() -> Vec<i16> {
    (0..BLOCK_FRAMES)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * (i % 128) as f32 / 128.0;
            (phase.sin() * 12_000.0) as i16
        })
        .collect()
}

fn feed_one_block(tx: &Sender<i16>) {
    for s in tone_block() {
        tx.send(s).unwrap();
    }
}

fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn lifecycle_guards_and_restart() {
    init_tracing();
    let (_tx, source) = sample_channel(1024);
    let engine = OstinatoEngine::builder()
        .source(Box::new(source))
        .build()
        .unwrap();

    assert!(matches!(engine.stop(), Err(Error::NotRunning)));

    engine.start().unwrap();
    assert!(engine.is_running());
    assert!(matches!(engine.start(), Err(Error::AlreadyRunning)));

    engine.stop().unwrap();
    assert!(!engine.is_running());

    // The pool recycled its slots; a second round works.
    engine.start().unwrap();
    engine.stop().unwrap();
}

#[test]
fn arming_requires_a_recorded_reference() {
    let (_tx, source) = sample_channel(1024);
    let engine = OstinatoEngine::builder()
        .source(Box::new(source))
        .build()
        .unwrap();

    let file = engine.files().open("samples/snare.wav").unwrap();
    assert!(matches!(
        engine.arm_file(file),
        Err(Error::Pipeline(ostinato::pipeline::Error::NoReference { .. }))
    ));
}

#[test]
fn arm_disarm_round_trip() {
    let (tx, source) = sample_channel(BLOCK_FRAMES * 2);
    let engine = OstinatoEngine::builder()
        .source(Box::new(source))
        .build()
        .unwrap();
    let file = engine.files().open("samples/clap.wav").unwrap();

    feed_one_block(&tx);
    engine.record_reference(file).unwrap();
    assert!(engine.files().info(file).unwrap().has_reference);

    engine.arm_file(file).unwrap();
    assert!(matches!(
        engine.arm_file(file),
        Err(Error::AlreadyArmed { .. })
    ));

    engine.disarm_file(file).unwrap();
    assert!(matches!(
        engine.disarm_file(file),
        Err(Error::NotArmed { .. })
    ));
}

#[test]
fn recognizes_recorded_reference_end_to_end() {
    init_tracing();
    let (tx, source) = sample_channel(BLOCK_FRAMES * 16);
    let sink = Arc::new(RecordingSink::default());
    let engine = OstinatoEngine::builder()
        .source(Box::new(source))
        .sink(Arc::clone(&sink) as Arc<dyn PlaybackSink>)
        .threshold(0.8)
        .build()
        .unwrap();

    let file = engine.files().open("samples/chime.wav").unwrap();

    // Record the reference synchronously through the same source.
    feed_one_block(&tx);
    engine.record_reference(file).unwrap();

    // Keep replaying the tone as the live signal.
    let stop_feeding = Arc::new(AtomicBool::new(false));
    let feeder = {
        let tx = tx.clone();
        let stop = Arc::clone(&stop_feeding);
        std::thread::spawn(move || {
            'outer: while !stop.load(Ordering::Acquire) {
                for s in tone_block() {
                    if stop.load(Ordering::Acquire) {
                        break 'outer;
                    }
                    while tx.try_send(s).is_err() {
                        if stop.load(Ordering::Acquire) {
                            break 'outer;
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    }
                }
            }
        })
    };

    engine.start().unwrap();
    engine.arm_file(file).unwrap();

    let triggered = wait_for(|| !sink.plays().is_empty(), Duration::from_secs(15));
    assert!(
        triggered,
        "matcher never fired; misses: {:?}",
        engine.stage_misses()
    );

    // Rendering access works while the pipeline runs.
    assert!(engine.latest_capture().is_ok());
    assert!(engine.latest_spectrum().is_ok());

    engine.stop().unwrap();
    stop_feeding.store(true, Ordering::Release);
    feeder.join().unwrap();

    assert!(sink.plays().iter().all(|f| *f == file));
}
