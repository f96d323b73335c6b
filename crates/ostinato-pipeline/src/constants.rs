//! Pipeline-wide constants.
//!
//! Block length is a power of two so the transforms stay fast; the bigger
//! the block, the bigger the end-to-end latency.

use std::time::Duration;

/// Desired acquisition rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Frames in one capture block.
pub const BLOCK_FRAMES: usize = 8 * 1024;

/// Zero-padding factor applied before the forward transform.
pub const ZERO_PAD_FACTOR: usize = 2;

/// Transform length: one block plus its zero padding.
pub const PADDED_FRAMES: usize = BLOCK_FRAMES * ZERO_PAD_FACTOR;

/// Maximum number of audio files open at once.
pub const MAX_FILES: usize = 8;

/// Display width of a file name in the registry, ellipsis included.
pub const MAX_NAME_LENGTH: usize = 32;

/// Buffers in the capture CAB: spectral stage + a rendering reader + the
/// writer, with headroom.
pub const CAPTURE_BUFFERS: usize = 4;

/// Buffers in the spectrum CAB: one matcher per open file + a rendering
/// reader + the writer.
pub const SPECTRUM_BUFFERS: usize = MAX_FILES + 2;

/// Period of the capture stage: the wall-clock length of one block.
pub const CAPTURE_PERIOD: Duration =
    Duration::from_millis(BLOCK_FRAMES as u64 * 1000 / SAMPLE_RATE as u64);

/// Period of the spectral stage. Independent of the capture period; the
/// staleness gate absorbs any mismatch.
pub const SPECTRAL_PERIOD: Duration = CAPTURE_PERIOD;

/// Period of each matcher stage.
pub const MATCHER_PERIOD: Duration = CAPTURE_PERIOD;

/// Normalized correlation score above which a matcher triggers playback.
pub const MATCH_THRESHOLD: f32 = 0.6;

/// Fixed priorities under the real-time policies, rate-monotonic order
/// with the producer first.
pub const CAPTURE_PRIORITY: u8 = 3;
pub const SPECTRAL_PRIORITY: u8 = 2;
pub const MATCHER_PRIORITY: u8 = 1;

/// Conversion between signed 16-bit device frames and unit-range floats.
pub const I16_SCALE: f32 = 32_768.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_period_matches_block_length() {
        // 8192 frames at 44.1 kHz is a hair under 186 ms.
        assert_eq!(CAPTURE_PERIOD, Duration::from_millis(185));
    }

    #[test]
    fn spectrum_pool_covers_all_matchers() {
        assert!(SPECTRUM_BUFFERS >= MAX_FILES + 2);
        assert!(CAPTURE_BUFFERS >= 3);
    }
}
