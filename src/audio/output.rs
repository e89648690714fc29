use anyhow::{bail, Context, Result};
use log::info;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStreamHandle, Sink};
use std::thread;
use std::time::{Duration, Instant};

use super::{OutputSink, StreamFormat};

const QUEUE_POLL: Duration = Duration::from_millis(5);

/// How long a full queue may go without draining before `push` gives up.
/// A block lasts at most one second, so a healthy device drains well within it.
const STALL_TIMEOUT: Duration = Duration::from_secs(3);

/// Output sink backed by a `rodio::Sink`.
///
/// rodio queues appended buffers without blocking, so `push` waits while
/// `max_queued` blocks are still pending. That keeps the decode loop at
/// playback speed instead of decoding the whole stream up front. If the
/// queue stops draining (the `OutputStream` was dropped, or the device went
/// away), `push` fails instead of waiting forever.
pub struct RodioSink {
    sink: Sink,
    format: StreamFormat,
    max_queued: usize,
}

impl RodioSink {
    /// The `OutputStream` behind `handle` must outlive the sink.
    pub fn open(
        handle: &OutputStreamHandle,
        format: StreamFormat,
        max_queued: usize,
    ) -> Result<Self> {
        let sink = Sink::try_new(handle).context("failed to create audio output sink")?;
        info!(
            "Audio output opened: {}Hz, {} channel(s)",
            format.sample_rate, format.channels
        );

        Ok(Self {
            sink,
            format,
            max_queued: max_queued.max(1),
        })
    }

    pub fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    /// Blocks still waiting to be played.
    pub fn queued(&self) -> usize {
        self.sink.len()
    }
}

impl OutputSink for RodioSink {
    fn push(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        wait_for_room(|| self.sink.len(), self.max_queued, STALL_TIMEOUT)?;
        self.sink.append(SamplesBuffer::new(
            self.format.channels,
            self.format.sample_rate,
            samples.to_vec(),
        ));
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.stop();
        info!("Audio output stopped");
    }
}

/// Poll `queued` until it drops below `max_queued`. Fails once the queue has
/// not shrunk for `stall_timeout`.
fn wait_for_room<F>(mut queued: F, max_queued: usize, stall_timeout: Duration) -> Result<()>
where
    F: FnMut() -> usize,
{
    let mut pending = queued();
    let mut last_progress = Instant::now();
    while pending >= max_queued {
        if last_progress.elapsed() >= stall_timeout {
            bail!(
                "audio output stalled: {} block(s) queued for {:?}",
                pending,
                stall_timeout
            );
        }
        thread::sleep(QUEUE_POLL);
        let now = queued();
        if now < pending {
            last_progress = Instant::now();
        }
        pending = now;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_available_returns_immediately() {
        let mut polls = 0;
        wait_for_room(
            || {
                polls += 1;
                1
            },
            2,
            Duration::from_millis(50),
        )
        .unwrap();
        assert_eq!(polls, 1);
    }

    #[test]
    fn test_waits_while_queue_drains() {
        let mut pending = 6;
        wait_for_room(
            || {
                pending -= 1;
                pending
            },
            2,
            Duration::from_millis(50),
        )
        .unwrap();
        assert_eq!(pending, 1);
    }

    #[test]
    fn test_stalled_queue_fails() {
        let started = Instant::now();
        let err = wait_for_room(|| 4, 2, Duration::from_millis(30)).unwrap_err();
        assert!(err.to_string().contains("stalled"));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
