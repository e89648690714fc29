pub mod estimator;
pub mod output;
pub mod playback;
pub mod visualizer;
pub mod wav;

pub use estimator::{estimate, Estimate, SpectralEstimator};
pub use output::RodioSink;
pub use playback::{Session, SessionState};
pub use visualizer::{Snapshot, SnapshotSource, SpectrumVisualizer, Visualization};
pub use wav::WavDecoder;

use std::time::Duration;

use crate::error::{Error, Result};

/// Native format reported by a decoder when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Immutable per-session stream layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames requested from the decoder per loop iteration.
    pub block_frames: usize,
}

impl StreamParams {
    pub fn new(format: StreamFormat, blocks_per_second: u32) -> Result<Self> {
        if format.sample_rate == 0 {
            return Err(Error::config("sample rate must be positive"));
        }
        if format.channels == 0 {
            return Err(Error::config("channel count must be positive"));
        }
        if blocks_per_second == 0 {
            return Err(Error::config("blocks_per_second must be positive"));
        }

        let block_frames = (format.sample_rate / blocks_per_second).max(1) as usize;
        Ok(Self {
            sample_rate: format.sample_rate,
            channels: format.channels,
            block_frames,
        })
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Interleaved sample count of one full block.
    pub fn block_samples(&self) -> usize {
        self.block_frames * self.channels as usize
    }

    /// A block shorter than a full block marks the end of the stream.
    pub fn is_tail(&self, samples: usize) -> bool {
        samples < self.block_samples()
    }

    pub fn block_duration(&self) -> Duration {
        self.frames_to_duration(self.block_frames as u64)
    }

    pub fn frames_to_duration(&self, frames: u64) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

/// Source of interleaved f32 sample blocks.
///
/// `read_block` must return in bounded time: the playback loop only checks
/// for cancellation between calls, so a decoder that never returns cannot be
/// stopped. Returning fewer than `frames * channels` samples ends the stream.
pub trait Decoder: Send {
    fn format(&self) -> StreamFormat;

    fn read_block(&mut self, frames: usize) -> anyhow::Result<Vec<f32>>;

    /// Release the underlying source. Called once by the owning session.
    fn close(&mut self);
}

/// Destination for decoded blocks, played at the stream's native rate.
///
/// `push` may block while the device buffer is full, but like
/// [`Decoder::read_block`] it must return in bounded time: `close()` joins
/// the playback thread, so a push that never returns hangs it. A sink that
/// stops draining should fail the push instead.
pub trait OutputSink: Send {
    fn push(&mut self, samples: &[f32]) -> anyhow::Result<()>;

    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(sample_rate: u32, channels: u16) -> StreamFormat {
        StreamFormat {
            sample_rate,
            channels,
        }
    }

    #[test]
    fn test_block_frames_follow_cadence() {
        let params = StreamParams::new(format(44100, 2), 10).unwrap();
        assert_eq!(params.block_frames, 4410);
        assert_eq!(params.block_samples(), 8820);
        assert_eq!(params.block_duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_tail_detection() {
        let params = StreamParams::new(format(100, 2), 10).unwrap();
        assert!(!params.is_tail(20));
        assert!(params.is_tail(19));
        assert!(params.is_tail(0));
    }

    #[test]
    fn test_tiny_rate_still_reads_a_frame() {
        let params = StreamParams::new(format(5, 1), 10).unwrap();
        assert_eq!(params.block_frames, 1);
    }

    #[test]
    fn test_rejects_invalid_format() {
        assert!(matches!(
            StreamParams::new(format(0, 2), 10),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            StreamParams::new(format(44100, 0), 10),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            StreamParams::new(format(44100, 2), 0),
            Err(Error::Configuration(_))
        ));
    }
}
