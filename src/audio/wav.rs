use anyhow::{anyhow, Context, Result};
use hound::{SampleFormat, WavReader};
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use super::{Decoder, StreamFormat};

/// WAV file decoder producing interleaved f32 blocks in [-1, 1].
pub struct WavDecoder {
    reader: Option<WavReader<BufReader<File>>>,
    format: StreamFormat,
    sample_format: SampleFormat,
    bits_per_sample: u16,
    total_frames: u32,
}

impl WavDecoder {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)
            .with_context(|| format!("failed to open WAV file {}", path.display()))?;

        let spec = reader.spec();
        if spec.sample_format == SampleFormat::Int && !(1..=32).contains(&spec.bits_per_sample) {
            return Err(anyhow!(
                "unsupported integer sample width: {} bits",
                spec.bits_per_sample
            ));
        }

        let total_frames = reader.duration();
        info!(
            "Loaded audio file: {:?} ({}Hz, {} channel(s), {}-bit {:?}, {} frames)",
            path,
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            spec.sample_format,
            total_frames
        );

        Ok(Self {
            reader: Some(reader),
            format: StreamFormat {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
            },
            sample_format: spec.sample_format,
            bits_per_sample: spec.bits_per_sample,
            total_frames,
        })
    }

    /// Length of the whole file.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_frames as f64 / self.format.sample_rate as f64)
    }
}

impl Decoder for WavDecoder {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn read_block(&mut self, frames: usize) -> Result<Vec<f32>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| anyhow!("WAV decoder is closed"))?;
        let wanted = frames * self.format.channels as usize;

        let samples = match self.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .take(wanted)
                .collect::<std::result::Result<Vec<_>, _>>(),
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (self.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .take(wanted)
                    .map(|sample| sample.map(|v| v as f32 * scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
        };

        samples.context("failed to read WAV samples")
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            info!("WAV decoder closed");
        }
    }
}
