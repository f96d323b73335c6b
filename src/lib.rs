//! # Ostinato - Real-time Audio Pattern Recognition
//!
//! Periodic-task pipeline that listens to a capture source, transforms
//! each block into a half-complex spectrum, and fires playback when a live
//! spectrum matches a pre-recorded reference. Built from modular
//! subsystems:
//!
//! - **ostinato-rt** - Periodic task manager, deadline accounting,
//!   priority-inheriting mutex/condvar
//! - **ostinato-cab** - Cyclic asynchronous buffer (publish latest, read
//!   latest, never torn)
//! - **ostinato-analysis** - Half-complex spectra and cross-correlation
//! - **ostinato-pipeline** - Capture/spectral/matcher stage bodies, file
//!   registry, capture sources
//!
//! ## Quick Start
//!
//! ```no_run
//! use ostinato::{sample_channel, OstinatoEngine};
//!
//! let (frames, source) = sample_channel(44_100);
//! let engine = OstinatoEngine::builder()
//!     .source(Box::new(source))
//!     .build()?;
//!
//! let kick = engine.files().open("samples/kick.wav")?;
//! engine.record_reference(kick)?;
//!
//! engine.start()?;
//! engine.arm_file(kick)?;
//!
//! // ... feed frames, render engine.latest_spectrum(), etc.
//!
//! engine.stop()?;
//! # Ok::<(), ostinato::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `audio-input` - Hardware capture through CPAL

/// Re-export of ostinato-rt for direct access
pub use ostinato_rt as rt;

pub use ostinato_rt::{
    sync, time, SchedPolicy, TaskContext, TaskHandle, TaskManager, TaskState, TimingContract,
};

/// Re-export of ostinato-cab for direct access
pub use ostinato_cab as cab;

pub use ostinato_cab::{Cab, ReadGuard, WriteGuard};

/// Re-export of ostinato-analysis for direct access
pub use ostinato_analysis as analysis;

pub use ostinato_analysis::{
    block_energy, normalized_correlation, CrossCorrelator, HalfComplexFft,
};

/// Re-export of ostinato-pipeline for direct access
pub use ostinato_pipeline as pipeline;

pub use ostinato_pipeline::{
    constants, sample_channel, CaptureBlock, CaptureError, CaptureSource, ChannelSource, FileBank,
    FileInfo, NullSink, PlaybackSink, SpectrumBlock, StageConfig,
};

#[cfg(feature = "audio-input")]
pub use ostinato_pipeline::{DeviceInput, DeviceSource};

mod error;
pub use error::{Error, Result};

mod builder;
pub use builder::OstinatoEngineBuilder;

mod engine;
pub use engine::{OstinatoEngine, StageMisses};
