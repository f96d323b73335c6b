//! Playback output abstraction.

use tracing::info;

/// Fire-and-forget audio output, indexed by registry file.
///
/// Matcher stages call this from their periodic loop, so implementations
/// must return promptly; queue the actual playback elsewhere.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, file: usize);
}

/// Sink that only logs trigger events. Useful as a default and in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn play(&self, file: usize) {
        info!(file, "playback triggered");
    }
}
