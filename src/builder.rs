//! Builder for configuring and constructing an [`OstinatoEngine`].

use std::sync::Arc;

use ostinato_cab::Cab;
use ostinato_pipeline::constants::{CAPTURE_BUFFERS, MATCH_THRESHOLD, SPECTRUM_BUFFERS};
use ostinato_pipeline::{
    shared, CaptureBlock, CaptureSource, FileBank, NullSink, PlaybackSink, SpectrumBlock,
    StageConfig,
};
use ostinato_rt::{SchedPolicy, TaskManager};

use crate::engine::OstinatoEngine;
use crate::{Error, Result};

/// Configures capture, playback and scheduling before the engine exists.
///
/// The capture source is the one mandatory ingredient. The sink defaults
/// to [`NullSink`], the policy to time-shared scheduling (no privileges
/// required), and the CAB pools to the sizes in
/// [`ostinato_pipeline::constants`].
///
/// # Example
///
/// ```no_run
/// use ostinato::{sample_channel, OstinatoEngine, SchedPolicy};
///
/// let (_frames, source) = sample_channel(44_100);
/// let engine = OstinatoEngine::builder()
///     .source(Box::new(source))
///     .policy(SchedPolicy::Fifo)
///     .build()?;
/// # Ok::<(), ostinato::Error>(())
/// ```
pub struct OstinatoEngineBuilder {
    source: Option<Box<dyn CaptureSource>>,
    sink: Arc<dyn PlaybackSink>,
    policy: SchedPolicy,
    capture_buffers: usize,
    spectrum_buffers: usize,
    threshold: f32,
}

impl Default for OstinatoEngineBuilder {
    fn default() -> Self {
        Self {
            source: None,
            sink: Arc::new(NullSink),
            policy: SchedPolicy::TimeShared,
            capture_buffers: CAPTURE_BUFFERS,
            spectrum_buffers: SPECTRUM_BUFFERS,
            threshold: MATCH_THRESHOLD,
        }
    }
}

impl OstinatoEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The capture source every stage ultimately reads from. Mandatory.
    pub fn source(mut self, source: Box<dyn CaptureSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Playback sink fired by matchers.
    pub fn sink(mut self, sink: Arc<dyn PlaybackSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Scheduling discipline for the stage threads. Real-time policies
    /// normally require elevated privileges.
    pub fn policy(mut self, policy: SchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Capture CAB pool size. Must cover concurrent readers + 1.
    pub fn capture_buffers(mut self, n: usize) -> Self {
        self.capture_buffers = n;
        self
    }

    /// Spectrum CAB pool size. Must cover one matcher per armed file plus
    /// any rendering reader, + 1.
    pub fn spectrum_buffers(mut self, n: usize) -> Self {
        self.spectrum_buffers = n;
        self
    }

    /// Normalized correlation score a matcher must clear to trigger.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn build(self) -> Result<OstinatoEngine> {
        let source = self
            .source
            .ok_or_else(|| Error::Config("a capture source is required".into()))?;

        let tasks: TaskManager<StageConfig> = TaskManager::new()?;
        tasks.set_policy(self.policy)?;

        let capture_cab = Arc::new(Cab::new(0, CaptureBlock::pool(self.capture_buffers))?);
        let spectrum_cab = Arc::new(Cab::new(1, SpectrumBlock::pool(self.spectrum_buffers))?);

        OstinatoEngine::assemble(
            tasks,
            shared(source)?,
            self.sink,
            FileBank::new()?,
            capture_cab,
            spectrum_cab,
            self.policy,
            self.threshold,
        )
    }
}
