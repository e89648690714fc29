use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::visualizer::Visualization;
use super::{Decoder, OutputSink, StreamFormat, StreamParams};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};

/// Lifecycle of a playback session.
///
/// `Idle -> Running -> {Stopped, Finished, Failed}`. A session stopped
/// before it was started goes straight from `Idle` to `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    /// Cancelled through `stop()` or `close()`.
    Stopped,
    /// The decoder returned a tail block.
    Finished,
    /// A decode or output error ended the stream.
    Failed(Error),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Stopped | SessionState::Finished | SessionState::Failed(_)
        )
    }
}

struct Shared {
    cancel: AtomicBool,
    state: Mutex<SessionState>,
    frames_played: AtomicU64,
    /// Decoder and sink. The worker holds this lock for the whole loop; the
    /// slot keeps them if the worker panics or never spawns.
    resources: Mutex<Option<Resources>>,
}

struct Resources {
    decoder: Box<dyn Decoder>,
    sink: Box<dyn OutputSink>,
}

impl Resources {
    fn release(mut self) {
        self.decoder.close();
        self.sink.stop();
    }
}

/// One decoder streaming into one output sink and one visualizer.
///
/// The streaming loop runs on its own thread once `start()` is called.
/// `close()` joins that thread before releasing the decoder and sink, so
/// they are never torn down under an in-flight iteration.
pub struct Session {
    params: StreamParams,
    visualizer: Arc<dyn Visualization>,
    generation: u64,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

impl Session {
    /// Open the output for the decoder's format and bind everything into an
    /// idle session. Whatever was opened is released again on failure.
    pub fn open<S, F>(
        mut decoder: Box<dyn Decoder>,
        open_sink: F,
        visualizer: Arc<dyn Visualization>,
        config: &PlayerConfig,
    ) -> Result<Self>
    where
        S: OutputSink + 'static,
        F: FnOnce(StreamFormat) -> anyhow::Result<S>,
    {
        if let Err(e) = config.validate() {
            decoder.close();
            return Err(e);
        }

        let format = decoder.format();
        let sink = match open_sink(format) {
            Ok(sink) => sink,
            Err(e) => {
                decoder.close();
                return Err(Error::OutputOpen(format!("{:#}", e)));
            }
        };

        Self::new(decoder, Box::new(sink), visualizer, config.blocks_per_second)
    }

    /// Bind an already opened decoder and sink.
    ///
    /// The visualizer is configured for this session; a session built
    /// earlier on the same visualizer can no longer feed or close it.
    pub fn new(
        decoder: Box<dyn Decoder>,
        sink: Box<dyn OutputSink>,
        visualizer: Arc<dyn Visualization>,
        blocks_per_second: u32,
    ) -> Result<Self> {
        let resources = Resources { decoder, sink };
        let format = resources.decoder.format();

        let configured = StreamParams::new(format, blocks_per_second).and_then(|params| {
            let generation = visualizer.configure(format.sample_rate, format.channels)?;
            Ok((params, generation))
        });
        let (params, generation) = match configured {
            Ok(configured) => configured,
            Err(e) => {
                resources.release();
                return Err(e);
            }
        };

        info!(
            "Session ready: {}Hz, {} channel(s), {} frames per block",
            params.sample_rate, params.channels, params.block_frames
        );

        Ok(Self {
            params,
            visualizer,
            generation,
            shared: Arc::new(Shared {
                cancel: AtomicBool::new(false),
                state: Mutex::new(SessionState::Idle),
                frames_played: AtomicU64::new(0),
                resources: Mutex::new(Some(resources)),
            }),
            worker: None,
            closed: false,
        })
    }

    /// Launch the streaming loop without blocking the caller.
    pub fn start(&mut self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if *state != SessionState::Idle || self.closed {
            return Err(Error::AlreadyStarted);
        }
        *state = SessionState::Running;
        drop(state);

        let params = self.params;
        let generation = self.generation;
        let visualizer = Arc::clone(&self.visualizer);
        let shared = Arc::clone(&self.shared);

        let spawned = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || stream_loop(params, generation, visualizer, shared));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!("Playback started");
                Ok(())
            }
            Err(e) => {
                let err = Error::from(e);
                error!("Failed to spawn playback thread: {}", err);
                *self.shared.state.lock() = SessionState::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Ask the loop to exit at its next iteration boundary. Never blocks;
    /// calling it again, or after the stream ended, changes nothing.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        match state.clone() {
            SessionState::Running => {
                self.shared.cancel.store(true, Ordering::Release);
                info!("Playback stop requested");
            }
            SessionState::Idle => {
                self.shared.cancel.store(true, Ordering::Release);
                *state = SessionState::Stopped;
                info!("Playback stopped before start");
            }
            terminal => debug!("Stop ignored, session already {:?}", terminal),
        }
    }

    /// Block until the loop exits and report how it ended.
    ///
    /// Returns the terminal state, or the recorded error if the stream
    /// failed. An idle session returns `Ok(Idle)` immediately.
    pub fn wait(&mut self) -> Result<SessionState> {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Playback worker panicked");
                *self.shared.state.lock() = SessionState::Failed(Error::WorkerPanicked);
            }
        }

        match self.state() {
            SessionState::Failed(err) => Err(err),
            state => Ok(state),
        }
    }

    /// Stop the loop, join it and release the decoder, sink and snapshot.
    /// Safe in any state; later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.stop();
        if let Err(e) = self.wait() {
            warn!("Closing session that failed: {}", e);
        }
        if let Some(resources) = self.shared.resources.lock().take() {
            resources.release();
        }
        self.visualizer.close(self.generation);
        self.closed = true;
        info!(
            "Session closed after {} frames ({:.1}s)",
            self.frames_played(),
            self.position().as_secs_f64()
        );
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        *self.shared.state.lock() == SessionState::Running
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn params(&self) -> StreamParams {
        self.params
    }

    /// Visualizer generation bound to this session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Frames handed to the output sink so far.
    pub fn frames_played(&self) -> u64 {
        self.shared.frames_played.load(Ordering::Acquire)
    }

    /// Stream time covered by the frames pushed so far.
    pub fn position(&self) -> Duration {
        self.params.frames_to_duration(self.frames_played())
    }

    /// The visualizer fed by this session, for renderers to poll.
    pub fn visualizer(&self) -> Arc<dyn Visualization> {
        Arc::clone(&self.visualizer)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn stream_loop(
    params: StreamParams,
    generation: u64,
    visualizer: Arc<dyn Visualization>,
    shared: Arc<Shared>,
) {
    let mut slot = shared.resources.lock();
    let Some(resources) = slot.as_mut() else {
        error!("Playback started without a decoder and sink");
        let err = Error::config("session resources already released");
        *shared.state.lock() = SessionState::Failed(err);
        return;
    };

    let block_samples = params.block_samples();
    let channels = params.channels as u64;
    let mut block: u64 = 0;

    let terminal = loop {
        if shared.cancel.load(Ordering::Acquire) {
            info!("Playback stopped after {} block(s)", block);
            break SessionState::Stopped;
        }

        let samples = match resources.decoder.read_block(params.block_frames) {
            Ok(samples) if samples.len() > block_samples => {
                let err = Error::Decode {
                    block,
                    message: format!(
                        "decoder returned {} samples for a {}-sample block",
                        samples.len(),
                        block_samples
                    ),
                };
                error!("{}", err);
                break SessionState::Failed(err);
            }
            Ok(samples) => samples,
            Err(e) => {
                let err = Error::Decode {
                    block,
                    message: format!("{:#}", e),
                };
                error!("{}", err);
                break SessionState::Failed(err);
            }
        };

        if let Err(e) = resources.sink.push(&samples) {
            let err = Error::Output {
                block,
                message: format!("{:#}", e),
            };
            error!("{}", err);
            break SessionState::Failed(err);
        }
        shared
            .frames_played
            .fetch_add(samples.len() as u64 / channels, Ordering::AcqRel);

        match visualizer.ingest(generation, &samples) {
            Ok(version) => trace!("Block {} published as {:?}", block, version),
            Err(Error::EmptyInput) => debug!("Block {} is empty, snapshot kept", block),
            Err(e) => warn!("Block {} not visualized: {}", block, e),
        }

        block += 1;
        if params.is_tail(samples.len()) {
            info!("Playback finished after {} block(s)", block);
            break SessionState::Finished;
        }
    };

    *shared.state.lock() = terminal;
}
