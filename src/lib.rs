//! Streaming audio playback with a live spectral snapshot.
//!
//! A [`Session`] pulls fixed-size blocks from a [`Decoder`] on a background
//! thread, pushes each block to an [`OutputSink`], then feeds the same block
//! to a [`Visualization`]. Renderers poll the visualization for the latest
//! [`Snapshot`] at their own pace.
//!
//! ```rust,no_run
//! use spectral_player::{PlayerConfig, RodioSink, Session, SpectrumVisualizer, WavDecoder};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = PlayerConfig::default();
//! let (_stream, handle) = rodio::OutputStream::try_default()?;
//! let visualizer = Arc::new(SpectrumVisualizer::new(config.estimator.clone(), config.channel)?);
//!
//! let mut session = Session::open(
//!     Box::new(WavDecoder::open("sample.wav")?),
//!     |format| RodioSink::open(&handle, format, config.sink_queue_depth),
//!     visualizer.clone(),
//!     &config,
//! )?;
//! session.start()?;
//! // ... poll visualizer.current() from the render loop ...
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;

pub use audio::{
    estimate, Decoder, Estimate, OutputSink, RodioSink, Session, SessionState, Snapshot,
    SnapshotSource, SpectralEstimator, SpectrumVisualizer, StreamFormat, StreamParams,
    Visualization, WavDecoder,
};
pub use config::{ChannelSelection, EstimatorConfig, OutputTransform, PlayerConfig, WindowFunction};
pub use error::{Error, Result};
