use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use rodio::OutputStream;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use spectral_player::{
    Estimate, PlayerConfig, RodioSink, Session, SessionState, Snapshot, SnapshotSource,
    SpectrumVisualizer, WavDecoder,
};

const BAR_WIDTH: usize = 40;

#[derive(Parser)]
#[command(name = "spectral-player")]
#[command(about = "Play a WAV file while printing its live spectrum")]
#[command(version)]
struct Args {
    /// WAV file to play
    audio_file: String,

    /// Player configuration (JSON); defaults are used when omitted
    #[arg(long, short)]
    config: Option<String>,

    /// Display refresh rate in frames per second
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,

    /// Show verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = match &args.config {
        Some(path) => PlayerConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path))?,
        None => PlayerConfig::default(),
    };

    let (_stream, handle) = OutputStream::try_default().context("no audio output device")?;
    let decoder = WavDecoder::open(&args.audio_file)?;
    let total = decoder.duration();
    let visualizer = Arc::new(SpectrumVisualizer::new(config.estimator.clone(), config.channel)?);

    let mut session = Session::open(
        Box::new(decoder),
        |format| RodioSink::open(&handle, format, config.sink_queue_depth),
        visualizer.clone(),
        &config,
    )?;
    session.start()?;
    info!("Playing {} ({:.1}s)", args.audio_file, total.as_secs_f64());

    let frame = Duration::from_secs_f64(1.0 / args.fps.max(1.0));
    let deadline = args
        .seconds
        .map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    let mut last_version = 0;

    while session.is_running() {
        let snapshot = visualizer.current_snapshot();
        if snapshot.version != last_version {
            last_version = snapshot.version;
            print!("\r{} {:>6.1}s", render_bars(&snapshot), session.position().as_secs_f64());
            std::io::stdout().flush()?;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            session.stop();
        }
        thread::sleep(frame);
    }
    println!();

    let outcome = session.wait();
    if let Ok(SessionState::Finished) = outcome {
        // Let the blocks still queued in the sink play out.
        let params = session.params();
        thread::sleep(params.block_duration() * config.sink_queue_depth as u32);
    }
    session.close();

    let state = outcome?;
    info!("Done ({:?}).", state);
    Ok(())
}

/// One text bar per value; power bins are drawn on a log scale above the floor.
fn render_bars(snapshot: &Snapshot) -> String {
    let Some(estimate) = snapshot.estimate.as_deref() else {
        return String::new();
    };

    let heights: Vec<usize> = match estimate {
        Estimate::Power { values, .. } => values
            .iter()
            .map(|v| ((v.log10() + 3.0) * 6.0).clamp(0.0, BAR_WIDTH as f64) as usize)
            .collect(),
        Estimate::Percent(values) => values
            .iter()
            .map(|&v| (v.clamp(0, 100) as usize * BAR_WIDTH) / 100)
            .collect(),
        Estimate::Loudness(rms) => vec![(rms.clamp(0.0, 1.0) * BAR_WIDTH as f64) as usize],
    };

    heights
        .iter()
        .map(|&h| format!("{:<width$}", "#".repeat(h), width = BAR_WIDTH))
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_renders_nothing() {
        assert_eq!(render_bars(&Snapshot::default()), "");
    }

    #[test]
    fn test_bars_scale_with_values() {
        let snapshot = Snapshot {
            version: 1,
            estimate: Some(Arc::new(Estimate::Percent(vec![0, 50, 100]))),
        };
        let line = render_bars(&snapshot);
        let bars: Vec<&str> = line.split('|').collect();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].trim_end(), "");
        assert_eq!(bars[1].trim_end().len(), BAR_WIDTH / 2);
        assert_eq!(bars[2].trim_end().len(), BAR_WIDTH);
    }

    #[test]
    fn test_power_floor_draws_empty_bar() {
        let snapshot = Snapshot {
            version: 1,
            estimate: Some(Arc::new(Estimate::Power {
                values: vec![0.001, 1.0],
                frequencies: vec![0.0, 100.0],
            })),
        };
        let line = render_bars(&snapshot);
        let bars: Vec<&str> = line.split('|').collect();
        assert_eq!(bars[0].trim_end(), "");
        assert_eq!(bars[1].trim_end().len(), 18);
    }
}
