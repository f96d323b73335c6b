//! The capture → spectrum → matcher pipeline.
//!
//! Three kinds of periodic stage bodies chained through two CABs:
//!
//! - [`capture_stage`]: drains a non-blocking [`CaptureSource`] into a
//!   reserved capture buffer, publishing one full block per period
//! - [`spectral_stage`]: transforms the freshest capture block into a
//!   half-complex spectrum plus its self-correlation
//! - [`matcher_stage`]: scores the freshest spectrum against a recorded
//!   reference and fires a [`PlaybackSink`] above the match threshold
//!
//! Consumers are gated on publish *timestamps*, not buffer identity, so a
//! stage running faster than its producer reprocesses nothing and the
//! stage periods stay independent.

pub mod error;
pub use error::{Error, Result};

pub mod constants;

mod capture;
pub use capture::{
    sample_channel, shared, CaptureError, CaptureSource, ChannelSource, SharedSource,
};

#[cfg(feature = "audio-input")]
mod device;
#[cfg(feature = "audio-input")]
pub use device::{DeviceInput, DeviceSource};

mod bank;
pub use bank::{FileBank, FileInfo};

mod sink;
pub use sink::{NullSink, PlaybackSink};

mod stages;
pub use stages::{
    capture_stage, matcher_stage, record_reference, spectral_stage, CaptureBlock, SpectrumBlock,
    StageConfig,
};
