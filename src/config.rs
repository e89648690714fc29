use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Smallest FFT size; a two-point Hann window is all zeros.
pub const MIN_FFT_SIZE: usize = 4;

/// Largest FFT size accepted by [`EstimatorConfig::validate`].
pub const MAX_FFT_SIZE: usize = 1 << 16;

/// Window applied to every Welch segment before the DFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// Symmetric Hann window, `0.5 * (1 - cos(2*pi*i / (n - 1)))`.
    #[default]
    Hann,
    /// No tapering.
    Rectangular,
}

impl WindowFunction {
    pub fn coefficients(self, size: usize) -> Vec<f64> {
        match self {
            WindowFunction::Rectangular => vec![1.0; size],
            WindowFunction::Hann if size < 2 => vec![1.0; size],
            WindowFunction::Hann => (0..size)
                .map(|i| {
                    let phase = 2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64;
                    0.5 * (1.0 - phase.cos())
                })
                .collect(),
        }
    }
}

/// What the estimator hands back for one block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputTransform {
    /// Welch power values, optionally truncated to the lowest `bins` bins.
    Power { bins: Option<usize> },
    /// `100 + trunc(log10(power) * multiplier)` per bin.
    LogPercent { bins: Option<usize>, multiplier: f64 },
    /// Root-mean-square amplitude of the raw samples.
    Rms,
}

impl Default for OutputTransform {
    fn default() -> Self {
        OutputTransform::Power { bins: None }
    }
}

/// Settings for the Welch spectral estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Segment length and DFT size; must be a power of two.
    pub fft_size: usize,
    /// Samples shared by consecutive segments; must be below `fft_size`.
    pub overlap: usize,
    pub window: WindowFunction,
    /// Remove each segment's mean before windowing.
    pub detrend: bool,
    /// Divide power by the sample rate (power spectral density).
    pub scaling: bool,
    /// Lowest value ever reported; keeps later log scaling finite.
    pub floor: f64,
    pub transform: OutputTransform,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            fft_size: 8,
            overlap: 0,
            window: WindowFunction::Hann,
            detrend: false,
            scaling: false,
            floor: 0.001,
            transform: OutputTransform::default(),
        }
    }
}

impl EstimatorConfig {
    /// Number of one-sided spectrum bins the DFT produces.
    pub fn spectrum_len(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Length of every estimate produced with this configuration.
    pub fn output_len(&self) -> usize {
        let full = self.spectrum_len();
        match self.transform {
            OutputTransform::Rms => 1,
            OutputTransform::Power { bins } | OutputTransform::LogPercent { bins, .. } => {
                bins.map_or(full, |b| b.min(full))
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fft_size < MIN_FFT_SIZE || !self.fft_size.is_power_of_two() {
            return Err(Error::config(format!(
                "fft_size must be a power of two >= {}, got {}",
                MIN_FFT_SIZE,
                self.fft_size
            )));
        }
        if self.fft_size > MAX_FFT_SIZE {
            return Err(Error::config(format!(
                "fft_size {} exceeds the maximum of {}",
                self.fft_size, MAX_FFT_SIZE
            )));
        }
        if self.overlap >= self.fft_size {
            return Err(Error::config(format!(
                "overlap ({}) must be smaller than fft_size ({})",
                self.overlap, self.fft_size
            )));
        }
        if !self.floor.is_finite() || self.floor <= 0.0 {
            return Err(Error::config(format!(
                "floor must be a positive finite number, got {}",
                self.floor
            )));
        }
        match self.transform {
            OutputTransform::Power { bins: Some(0) }
            | OutputTransform::LogPercent { bins: Some(0), .. } => {
                Err(Error::config("bins must be at least 1"))
            }
            OutputTransform::LogPercent { multiplier, .. } if !multiplier.is_finite() => {
                Err(Error::config("log multiplier must be finite"))
            }
            _ => Ok(()),
        }
    }
}

/// Which channel of an interleaved block feeds the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelection {
    /// A single channel by zero-based index.
    Channel(usize),
    /// Per-frame average of every channel.
    Mixdown,
}

impl Default for ChannelSelection {
    fn default() -> Self {
        ChannelSelection::Channel(0)
    }
}

/// Top-level settings for a playback session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Target push cadence; one block covers `1 / blocks_per_second` seconds.
    pub blocks_per_second: u32,
    pub channel: ChannelSelection,
    pub estimator: EstimatorConfig,
    /// Blocks an output sink may hold before `push` waits for playback.
    pub sink_queue_depth: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            blocks_per_second: 10,
            channel: ChannelSelection::default(),
            estimator: EstimatorConfig::default(),
            sink_queue_depth: 2,
        }
    }
}

impl PlayerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: PlayerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.blocks_per_second == 0 {
            return Err(Error::config("blocks_per_second must be positive"));
        }
        if self.sink_queue_depth == 0 {
            return Err(Error::config("sink_queue_depth must be positive"));
        }
        self.estimator.validate()
    }
}
