//! OstinatoEngine that wires the pipeline stages together.

use std::sync::Arc;

use tracing::{debug, error};

use ostinato_cab::Cab;
use ostinato_pipeline::constants::{
    CAPTURE_PERIOD, CAPTURE_PRIORITY, MATCHER_PERIOD, MATCHER_PRIORITY, SPECTRAL_PERIOD,
    SPECTRAL_PRIORITY,
};
use ostinato_pipeline::{
    capture_stage, matcher_stage, record_reference, spectral_stage, CaptureBlock, FileBank,
    PlaybackSink, SharedSource, SpectrumBlock, StageConfig,
};
use ostinato_rt::sync::Mutex;
use ostinato_rt::{SchedPolicy, TaskHandle, TaskManager, TimingContract};

use crate::{Error, OstinatoEngineBuilder, Result};

/// Deadline misses accumulated by the running stages.
#[derive(Debug, Clone, Default)]
pub struct StageMisses {
    pub capture: u32,
    pub spectral: u32,
    /// One entry per armed file: (registry index, miss count).
    pub matchers: Vec<(usize, u32)>,
}

struct Running {
    capture: Option<TaskHandle>,
    spectral: Option<TaskHandle>,
    matchers: Vec<(usize, TaskHandle)>,
}

/// The assembled pipeline.
///
/// Owns the task manager, both CABs, the shared capture source, the
/// playback sink and the file registry. [`OstinatoEngine::start`] launches
/// the capture and spectral stages; each armed file adds one matcher
/// stage. Everything winds down cooperatively through
/// [`OstinatoEngine::stop`], which also runs on drop.
pub struct OstinatoEngine {
    tasks: TaskManager<StageConfig>,
    source: SharedSource,
    sink: Arc<dyn PlaybackSink>,
    bank: FileBank,
    capture_cab: Arc<Cab<CaptureBlock>>,
    spectrum_cab: Arc<Cab<SpectrumBlock>>,
    policy: SchedPolicy,
    threshold: f32,
    running: Mutex<Running>,
}

impl OstinatoEngine {
    /// Create a new engine builder.
    pub fn builder() -> OstinatoEngineBuilder {
        OstinatoEngineBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        tasks: TaskManager<StageConfig>,
        source: SharedSource,
        sink: Arc<dyn PlaybackSink>,
        bank: FileBank,
        capture_cab: Arc<Cab<CaptureBlock>>,
        spectrum_cab: Arc<Cab<SpectrumBlock>>,
        policy: SchedPolicy,
        threshold: f32,
    ) -> Result<Self> {
        Ok(Self {
            tasks,
            source,
            sink,
            bank,
            capture_cab,
            spectrum_cab,
            policy,
            threshold,
            running: Mutex::new(Running {
                capture: None,
                spectral: None,
                matchers: Vec::new(),
            })?,
        })
    }

    /// The file registry: open/close files and adjust their playback
    /// parameters through it.
    pub fn files(&self) -> &FileBank {
        &self.bank
    }

    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn priority(&self, fixed: u8) -> u8 {
        match self.policy {
            SchedPolicy::TimeShared => 0,
            _ => fixed,
        }
    }

    /// Launches the capture and spectral stages.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.capture.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let source = Arc::clone(&self.source);
        let cab = Arc::clone(&self.capture_cab);
        let capture = self.tasks.spawn(
            TimingContract::new(
                CAPTURE_PERIOD,
                CAPTURE_PERIOD,
                self.priority(CAPTURE_PRIORITY),
            ),
            Some(StageConfig::Capture),
            move |mut ctx| {
                if let Err(e) = capture_stage(&source, &cab, &mut ctx) {
                    error!("capture stage exited with error: {e}");
                }
            },
        )?;

        let input = Arc::clone(&self.capture_cab);
        let output = Arc::clone(&self.spectrum_cab);
        let spectral = self.tasks.spawn(
            TimingContract::new(
                SPECTRAL_PERIOD,
                SPECTRAL_PERIOD,
                self.priority(SPECTRAL_PRIORITY),
            ),
            Some(StageConfig::Spectral),
            move |mut ctx| {
                if let Err(e) = spectral_stage(&input, &output, &mut ctx) {
                    error!("spectral stage exited with error: {e}");
                }
            },
        );

        match spectral {
            Ok(spectral) => {
                running.capture = Some(capture);
                running.spectral = Some(spectral);
                debug!("pipeline started");
                Ok(())
            }
            Err(e) => {
                drop(running);
                let _ = self.tasks.cancel(capture);
                let _ = self.tasks.join(capture);
                Err(e.into())
            }
        }
    }

    /// True while the capture/spectral pair is running.
    pub fn is_running(&self) -> bool {
        self.running.lock().capture.is_some()
    }

    /// Records a reference block for `index` through the shared capture
    /// source.
    ///
    /// Genuinely blocking: returns once a full block has been acquired and
    /// transformed. While it runs it competes with the capture stage for
    /// incoming frames, so record references before `start` or while the
    /// pipeline is stopped.
    pub fn record_reference(&self, index: usize) -> Result<()> {
        let reference = record_reference(&self.source)?;
        self.bank.set_reference(index, Arc::new(reference))?;
        debug!(file = index, "reference recorded");
        Ok(())
    }

    /// Launches a matcher stage scoring live spectra against the recorded
    /// reference of `index`.
    pub fn arm_file(&self, index: usize) -> Result<()> {
        let reference = self.bank.reference(index)?;

        let mut running = self.running.lock();
        if running.matchers.iter().any(|(file, _)| *file == index) {
            return Err(Error::AlreadyArmed { index });
        }

        let input = Arc::clone(&self.spectrum_cab);
        let sink = Arc::clone(&self.sink);
        let threshold = self.threshold;
        let handle = self.tasks.spawn(
            TimingContract::new(
                MATCHER_PERIOD,
                MATCHER_PERIOD,
                self.priority(MATCHER_PRIORITY),
            ),
            Some(StageConfig::Matcher { file: index }),
            move |mut ctx| {
                if let Err(e) = matcher_stage(&input, reference, sink, threshold, &mut ctx) {
                    error!("matcher stage exited with error: {e}");
                }
            },
        )?;

        running.matchers.push((index, handle));
        debug!(file = index, "matcher armed");
        Ok(())
    }

    /// Stops and joins the matcher bound to `index`.
    pub fn disarm_file(&self, index: usize) -> Result<()> {
        let handle = {
            let mut running = self.running.lock();
            let position = running
                .matchers
                .iter()
                .position(|(file, _)| *file == index)
                .ok_or(Error::NotArmed { index })?;
            running.matchers.swap_remove(position).1
        };

        self.tasks.cancel(handle)?;
        self.tasks.join(handle)?;
        Ok(())
    }

    /// Read view of the freshest capture block, for rendering.
    pub fn latest_capture(&self) -> ostinato_cab::Result<ostinato_cab::ReadGuard<'_, CaptureBlock>> {
        self.capture_cab.latest()
    }

    /// Read view of the freshest spectrum, for rendering.
    pub fn latest_spectrum(
        &self,
    ) -> ostinato_cab::Result<ostinato_cab::ReadGuard<'_, SpectrumBlock>> {
        self.spectrum_cab.latest()
    }

    /// Deadline misses per running stage.
    pub fn stage_misses(&self) -> StageMisses {
        let running = self.running.lock();
        let count = |handle: Option<TaskHandle>| {
            handle
                .and_then(|h| self.tasks.deadline_misses(h).ok())
                .unwrap_or(0)
        };
        StageMisses {
            capture: count(running.capture),
            spectral: count(running.spectral),
            matchers: running
                .matchers
                .iter()
                .map(|(file, h)| (*file, self.tasks.deadline_misses(*h).unwrap_or(0)))
                .collect(),
        }
    }

    /// Requests cooperative cancellation of every stage and joins them,
    /// consumers first.
    pub fn stop(&self) -> Result<()> {
        let (capture, spectral, matchers) = {
            let mut running = self.running.lock();
            if running.capture.is_none() && running.matchers.is_empty() {
                return Err(Error::NotRunning);
            }
            (
                running.capture.take(),
                running.spectral.take(),
                std::mem::take(&mut running.matchers),
            )
        };

        for (_, handle) in &matchers {
            let _ = self.tasks.cancel(*handle);
        }
        if let Some(handle) = spectral {
            let _ = self.tasks.cancel(handle);
        }
        if let Some(handle) = capture {
            let _ = self.tasks.cancel(handle);
        }

        for (_, handle) in matchers {
            self.tasks.join(handle)?;
        }
        if let Some(handle) = spectral {
            self.tasks.join(handle)?;
        }
        if let Some(handle) = capture {
            self.tasks.join(handle)?;
        }

        debug!("pipeline stopped");
        Ok(())
    }
}

impl Drop for OstinatoEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
