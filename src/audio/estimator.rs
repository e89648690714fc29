use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::{EstimatorConfig, OutputTransform};
use crate::error::{Error, Result};

/// Result of one estimator run.
#[derive(Debug, Clone, PartialEq)]
pub enum Estimate {
    /// Averaged one-sided power per bin, with each bin's centre frequency in Hz.
    Power {
        values: Vec<f64>,
        frequencies: Vec<f64>,
    },
    /// Log-scaled integer percentages per bin.
    Percent(Vec<i32>),
    /// RMS amplitude.
    Loudness(f64),
}

impl Estimate {
    pub fn len(&self) -> usize {
        match self {
            Estimate::Power { values, .. } => values.len(),
            Estimate::Percent(values) => values.len(),
            Estimate::Loudness(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as floats regardless of variant, for renderers that only draw bars.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Estimate::Power { values, .. } => values.clone(),
            Estimate::Percent(values) => values.iter().map(|&v| v as f64).collect(),
            Estimate::Loudness(rms) => vec![*rms],
        }
    }
}

/// Welch power spectrum / RMS estimator.
///
/// Holds only what follows from its configuration (the planned DFT and the
/// window), so one instance can serve any number of threads at once.
pub struct SpectralEstimator {
    config: EstimatorConfig,
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    window_power: f64,
}

impl SpectralEstimator {
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let window = config.window.coefficients(config.fft_size);
        let window_power = window.iter().map(|w| w * w).sum();

        Ok(Self {
            config,
            fft,
            window,
            window_power,
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate one channel of samples recorded at `sample_rate` Hz.
    ///
    /// Input shorter than one segment is zero-padded to a single segment.
    pub fn estimate(&self, samples: &[f32], sample_rate: f64) -> Result<Estimate> {
        if samples.is_empty() {
            return Err(Error::EmptyInput);
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(Error::config(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }

        let floor = self.config.floor;
        match self.config.transform {
            OutputTransform::Rms => Ok(Estimate::Loudness(clamp_floor(rms(samples), floor))),
            OutputTransform::Power { bins } => {
                let (mut values, mut frequencies) = self.welch(samples, sample_rate);
                if let Some(bins) = bins {
                    values.truncate(bins);
                    frequencies.truncate(bins);
                }
                Ok(Estimate::Power {
                    values,
                    frequencies,
                })
            }
            OutputTransform::LogPercent { bins, multiplier } => {
                let (mut values, _) = self.welch(samples, sample_rate);
                if let Some(bins) = bins {
                    values.truncate(bins);
                }
                Ok(Estimate::Percent(to_percent(&values, multiplier)))
            }
        }
    }

    fn welch(&self, samples: &[f32], sample_rate: f64) -> (Vec<f64>, Vec<f64>) {
        let nfft = self.config.fft_size;
        let step = nfft - self.config.overlap;

        let mut input: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        if input.len() < nfft {
            input.resize(nfft, 0.0);
        }

        let segments = (input.len() - nfft) / step + 1;
        let bins = self.config.spectrum_len();
        let mut power = vec![0.0; bins];

        let mut buffer = vec![Complex::new(0.0, 0.0); nfft];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()];

        for segment in input.windows(nfft).step_by(step).take(segments) {
            let mean = if self.config.detrend {
                segment.iter().sum::<f64>() / nfft as f64
            } else {
                0.0
            };

            for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex::new((x - mean) * w, 0.0);
            }
            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (j, p) in power.iter_mut().enumerate() {
                let mut d = buffer[j].norm_sqr() / segments as f64;
                // Fold the negative frequencies into the one-sided spectrum.
                if j > 0 && j < bins - 1 {
                    d *= 2.0;
                }
                *p += d;
            }
        }

        let mut norm = self.window_power;
        if self.config.scaling {
            norm *= sample_rate;
        }
        for p in power.iter_mut() {
            *p = clamp_floor(*p / norm, self.config.floor);
        }

        let bin_width = sample_rate / nfft as f64;
        let frequencies = (0..bins).map(|i| i as f64 * bin_width).collect();

        (power, frequencies)
    }
}

/// One-shot estimate without keeping the planned DFT around.
pub fn estimate(samples: &[f32], sample_rate: f64, config: &EstimatorConfig) -> Result<Estimate> {
    SpectralEstimator::new(config.clone())?.estimate(samples, sample_rate)
}

fn rms(samples: &[f32]) -> f64 {
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

// NaN compares false, so it lands on the floor too.
fn clamp_floor(value: f64, floor: f64) -> f64 {
    if value >= floor {
        value
    } else {
        floor
    }
}

fn to_percent(values: &[f64], multiplier: f64) -> Vec<i32> {
    values
        .iter()
        .map(|v| 100 + (v.log10() * multiplier) as i32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowFunction;

    fn config(fft_size: usize, transform: OutputTransform) -> EstimatorConfig {
        EstimatorConfig {
            fft_size,
            transform,
            ..Default::default()
        }
    }

    fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate).sin() as f32)
            .collect()
    }

    #[test]
    fn test_output_length_and_floor() {
        let transforms = [
            OutputTransform::Power { bins: None },
            OutputTransform::Power { bins: Some(3) },
            OutputTransform::LogPercent {
                bins: None,
                multiplier: 10.0,
            },
            OutputTransform::Rms,
        ];
        for transform in transforms {
            for fft_size in [8, 16, 64] {
                let config = config(fft_size, transform);
                let estimator = SpectralEstimator::new(config.clone()).unwrap();
                for len in [1, 5, fft_size, 1000] {
                    let samples = sine(440.0, 44100.0, len);
                    let result = estimator.estimate(&samples, 44100.0).unwrap();
                    assert_eq!(result.len(), config.output_len());
                    if let Estimate::Power { values, frequencies } = &result {
                        assert_eq!(values.len(), frequencies.len());
                        assert!(values.iter().all(|&v| v >= config.floor));
                    }
                    if let Estimate::Loudness(rms) = result {
                        assert!(rms >= config.floor);
                    }
                }
            }
        }
    }

    #[test]
    fn test_all_zero_block_sits_on_floor() {
        let zeros = vec![0.0f32; 4410];

        let power = estimate(&zeros, 44100.0, &EstimatorConfig::default()).unwrap();
        match power {
            Estimate::Power { values, .. } => {
                assert_eq!(values.len(), 5);
                assert!(values.iter().all(|&v| v == 0.001));
            }
            other => panic!("unexpected estimate {:?}", other),
        }

        let loudness = estimate(&zeros, 44100.0, &config(8, OutputTransform::Rms)).unwrap();
        assert_eq!(loudness, Estimate::Loudness(0.001));

        let percent = estimate(
            &zeros,
            44100.0,
            &config(
                8,
                OutputTransform::LogPercent {
                    bins: None,
                    multiplier: 10.0,
                },
            ),
        )
        .unwrap();
        assert_eq!(percent, Estimate::Percent(vec![70; 5]));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let estimator = SpectralEstimator::new(EstimatorConfig::default()).unwrap();
        assert_eq!(estimator.estimate(&[], 44100.0), Err(Error::EmptyInput));
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        let estimator = SpectralEstimator::new(EstimatorConfig::default()).unwrap();
        for rate in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                estimator.estimate(&[0.5], rate),
                Err(Error::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = config(10, OutputTransform::default());
        assert!(SpectralEstimator::new(bad).is_err());
    }

    #[test]
    fn test_constant_signal_energy_lands_in_dc() {
        let config = EstimatorConfig {
            fft_size: 8,
            window: WindowFunction::Rectangular,
            ..Default::default()
        };
        let ones = vec![1.0f32; 32];
        let Estimate::Power { values, .. } = estimate(&ones, 8.0, &config).unwrap() else {
            panic!("expected power");
        };
        assert!((values[0] - 8.0).abs() < 1e-9);
        assert!(values[1..].iter().all(|&v| v == 0.001));

        let detrended = EstimatorConfig {
            detrend: true,
            ..config.clone()
        };
        let Estimate::Power { values, .. } = estimate(&ones, 8.0, &detrended).unwrap() else {
            panic!("expected power");
        };
        assert!(values.iter().all(|&v| v == 0.001));

        let density = EstimatorConfig {
            scaling: true,
            ..config
        };
        let Estimate::Power { values, .. } = estimate(&ones, 4.0, &density).unwrap() else {
            panic!("expected power");
        };
        assert!((values[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_tone_peaks_in_its_bin() {
        let sample_rate = 64.0;
        let config = config(64, OutputTransform::Power { bins: None });
        let samples = sine(8.0, sample_rate, 256);
        let Estimate::Power { values, frequencies } =
            estimate(&samples, sample_rate, &config).unwrap()
        else {
            panic!("expected power");
        };

        let peak = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 8);
        assert_eq!(frequencies[peak], 8.0);
    }

    #[test]
    fn test_log_percent_scaling() {
        let config = EstimatorConfig {
            fft_size: 8,
            window: WindowFunction::Rectangular,
            transform: OutputTransform::LogPercent {
                bins: Some(2),
                multiplier: 10.0,
            },
            ..Default::default()
        };
        let ones = vec![1.0f32; 16];
        // log10(8) * 10 = 9.03, truncated.
        assert_eq!(
            estimate(&ones, 8.0, &config).unwrap(),
            Estimate::Percent(vec![109, 70])
        );
    }

    #[test]
    fn test_rms_loudness() {
        let samples: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let loudness = estimate(&samples, 44100.0, &config(8, OutputTransform::Rms)).unwrap();
        let Estimate::Loudness(rms) = loudness else {
            panic!("expected loudness");
        };
        assert!((rms - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_is_deterministic() {
        let config = EstimatorConfig {
            fft_size: 16,
            overlap: 8,
            ..Default::default()
        };
        let estimator = SpectralEstimator::new(config).unwrap();
        let samples = sine(1000.0, 44100.0, 300);
        let a = estimator.estimate(&samples, 44100.0).unwrap();
        let b = estimator.estimate(&samples, 44100.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_across_threads() {
        let estimator = Arc::new(SpectralEstimator::new(EstimatorConfig::default()).unwrap());
        let expected = estimator.estimate(&sine(440.0, 44100.0, 512), 44100.0).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let estimator = Arc::clone(&estimator);
                std::thread::spawn(move || {
                    estimator.estimate(&sine(440.0, 44100.0, 512), 44100.0).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
