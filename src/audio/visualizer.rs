use log::{debug, info, trace};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use super::estimator::{Estimate, SpectralEstimator};
use crate::config::{ChannelSelection, EstimatorConfig};
use crate::error::{Error, Result};

/// Latest published visualization value.
///
/// `version` increases by one on every publish (including the reset on
/// close), so a renderer can tell whether anything changed since its last
/// poll. The estimate is shared immutably; cloning a snapshot never copies
/// spectrum data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub version: u64,
    pub estimate: Option<Arc<Estimate>>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.estimate.is_none()
    }

    /// Bar heights for drawing; empty before the first block.
    pub fn values(&self) -> Vec<f64> {
        self.estimate
            .as_ref()
            .map(|estimate| estimate.values())
            .unwrap_or_default()
    }
}

/// Stateful consumer fed by the playback loop and polled by renderers.
///
/// Each `configure` call binds a new session and returns its generation.
/// `ingest` and `close` carry that generation, so a session that has been
/// superseded cannot feed or close the visualizer of the next one. Exactly
/// one writer calls `ingest`; any number of threads call `current`.
pub trait Visualization: Send + Sync {
    /// Fix the stream layout for a new session and return its generation.
    /// The layout cannot change for the life of that generation.
    fn configure(&self, sample_rate: u32, channels: u16) -> Result<u64>;

    /// Analyze one interleaved block and publish the result.
    ///
    /// Returns the published version, or `None` when `generation` is closed
    /// or no longer current.
    fn ingest(&self, generation: u64, block: &[f32]) -> Result<Option<u64>>;

    fn current(&self) -> Snapshot;

    /// End the session: drop the held snapshot and ignore later blocks.
    /// Does nothing for a stale generation.
    fn close(&self, generation: u64);
}

/// Read side handed to renderers.
pub trait SnapshotSource {
    fn current_snapshot(&self) -> Snapshot;
}

impl<T: Visualization + ?Sized> SnapshotSource for T {
    fn current_snapshot(&self) -> Snapshot {
        self.current()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    sample_rate: u32,
    channels: u16,
}

#[derive(Debug, Default)]
struct WriterState {
    generation: u64,
    layout: Option<Layout>,
    closed: bool,
}

/// Spectrum visualizer driven by an [`EstimatorConfig`].
///
/// Every variant (power bars, log percentages, RMS loudness) is the same type
/// with a different configuration.
pub struct SpectrumVisualizer {
    estimator: SpectralEstimator,
    channel: ChannelSelection,
    writer: Mutex<WriterState>,
    slot: RwLock<Snapshot>,
}

impl SpectrumVisualizer {
    pub fn new(config: EstimatorConfig, channel: ChannelSelection) -> Result<Self> {
        Ok(Self {
            estimator: SpectralEstimator::new(config)?,
            channel,
            writer: Mutex::new(WriterState::default()),
            slot: RwLock::new(Snapshot::default()),
        })
    }

    pub fn estimator_config(&self) -> &EstimatorConfig {
        self.estimator.config()
    }

    pub fn channel(&self) -> ChannelSelection {
        self.channel
    }

    /// Generation of the most recently configured session; 0 before any.
    pub fn generation(&self) -> u64 {
        self.writer.lock().generation
    }

    fn select_channel(&self, block: &[f32], channels: usize) -> Vec<f32> {
        match self.channel {
            ChannelSelection::Channel(index) => {
                block.iter().skip(index).step_by(channels).copied().collect()
            }
            ChannelSelection::Mixdown => block
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect(),
        }
    }

    fn publish(&self, estimate: Option<Arc<Estimate>>) -> u64 {
        let mut slot = self.slot.write();
        slot.version += 1;
        slot.estimate = estimate;
        slot.version
    }
}

impl Visualization for SpectrumVisualizer {
    fn configure(&self, sample_rate: u32, channels: u16) -> Result<u64> {
        if sample_rate == 0 {
            return Err(Error::config("sample rate must be positive"));
        }
        if channels == 0 {
            return Err(Error::config("channel count must be positive"));
        }
        if let ChannelSelection::Channel(index) = self.channel {
            if index >= channels as usize {
                return Err(Error::config(format!(
                    "analysis channel {} does not exist in a {}-channel stream",
                    index, channels
                )));
            }
        }

        let mut writer = self.writer.lock();
        if writer.layout.is_some() && !writer.closed {
            debug!("Generation {} superseded before close", writer.generation);
        }
        writer.generation += 1;
        writer.layout = Some(Layout {
            sample_rate,
            channels,
        });
        writer.closed = false;

        debug!(
            "Visualizer generation {} configured: {}Hz, {} channel(s), {:?}",
            writer.generation, sample_rate, channels, self.channel
        );
        Ok(writer.generation)
    }

    fn ingest(&self, generation: u64, block: &[f32]) -> Result<Option<u64>> {
        let writer = self.writer.lock();
        let layout = writer
            .layout
            .ok_or_else(|| Error::config("configure must be called before ingest"))?;
        if generation != writer.generation || writer.closed {
            trace!(
                "Ignoring block of {} samples from generation {}",
                block.len(),
                generation
            );
            return Ok(None);
        }

        let samples = self.select_channel(block, layout.channels as usize);
        // Estimation runs outside the snapshot lock; readers keep seeing the
        // previous value until the swap below.
        let estimate = self
            .estimator
            .estimate(&samples, layout.sample_rate as f64)?;

        Ok(Some(self.publish(Some(Arc::new(estimate)))))
    }

    fn current(&self) -> Snapshot {
        self.slot.read().clone()
    }

    fn close(&self, generation: u64) {
        let mut writer = self.writer.lock();
        if writer.closed || generation != writer.generation {
            return;
        }
        writer.closed = true;
        let version = self.publish(None);
        info!(
            "Visualizer generation {} closed at version {}",
            generation, version
        );
    }
}
