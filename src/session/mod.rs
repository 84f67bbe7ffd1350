//! `RecordingSession` — one command-recording lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! RecordingSession::start(config, source_factory, sinks)
//!     ├─► capture thread:    source.read_frame() → queue.push()
//!     └─► processing thread: queue.pop() → VAD → UtteranceWriter → events
//!
//! stop() → running = false, queue.close() (wakes a parked pop),
//!          both threads joined, in-flight utterance finalized
//! ```
//!
//! ## Threading
//!
//! cpal streams are `!Send`, so the audio source is constructed *inside* the
//! capture thread via `source_factory`; a sync mpsc channel reports the open
//! result back to `start()`. The processing thread is only spawned once the
//! device is confirmed open. The `FrameQueue` is the sole state shared
//! between the two threads; the VAD baseline and encoder state live entirely
//! on the processing thread.

pub mod events;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{AudioSource, DEFAULT_BUFFER_MULTIPLIER},
    buffering::{frame::PcmFrame, FrameQueue},
    error::{CaptureError, Result},
    format::AudioFormat,
    vad::{BaselineVad, VadEvent, VoiceActivityDetector, DEFAULT_SENSITIVITY},
    wav::{UtteranceWriter, WavSink},
};

use events::SessionEvent;

/// Configuration for one recording session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// PCM format, fixed for the session. The pipeline encodes 16-bit PCM,
    /// so `bits_per_sample` must be 16. Default: 16 kHz mono 16-bit.
    pub format: AudioFormat,
    /// Interleaved samples per capture read. Default: 320 (20 ms at 16 kHz).
    pub frame_samples: usize,
    /// Rising VAD threshold ratio. Default: 2.0.
    pub start_sensitivity: f64,
    /// Falling VAD threshold ratio. Default: 2.0.
    pub stop_sensitivity: f64,
    /// Capture ring size as a multiple of one frame, applied when the
    /// session opens the microphone itself
    /// ([`start_with_default_mic`](RecordingSession::start_with_default_mic)).
    /// Default: 10.
    pub buffer_multiplier: usize,
    /// Frame queue capacity. `None` (default) is unbounded — no frame is
    /// ever dropped between capture and analysis. A bounded queue drops the
    /// incoming frame when full (see `FrameQueue`).
    pub queue_capacity: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            frame_samples: 320,
            start_sensitivity: DEFAULT_SENSITIVITY,
            stop_sensitivity: DEFAULT_SENSITIVITY,
            buffer_multiplier: DEFAULT_BUFFER_MULTIPLIER,
            queue_capacity: None,
        }
    }
}

/// Supplies an output sink per utterance.
///
/// The session never invents file names; the surrounding application decides
/// where each utterance lands and hands over an opened sink.
pub trait SinkProvider: Send + 'static {
    fn next_sink(&mut self) -> Result<(PathBuf, Box<dyn WavSink>)>;
}

impl<F> SinkProvider for F
where
    F: FnMut() -> Result<(PathBuf, Box<dyn WavSink>)> + Send + 'static,
{
    fn next_sink(&mut self) -> Result<(PathBuf, Box<dyn WavSink>)> {
        self()
    }
}

/// Handle to a running session. Stop it with [`stop`](Self::stop) or by
/// dropping it.
///
/// All methods take `&self`; wrap the session in an `Arc` to stop it from a
/// thread other than the one that started it.
pub struct RecordingSession {
    running: Arc<AtomicBool>,
    queue: Arc<FrameQueue>,
    capture: Mutex<Option<JoinHandle<()>>>,
    processing: Mutex<Option<JoinHandle<()>>>,
}

impl RecordingSession {
    /// Open the audio source and start capturing.
    ///
    /// Blocks until the source is confirmed open (or failed), then returns
    /// the session handle and the event receiver. Events arrive in emission
    /// order and are consumed on the caller's own thread.
    ///
    /// # Errors
    /// Whatever `source_factory` fails with — typically
    /// `CaptureError::NoDefaultInputDevice`, `AlreadyOpen` or `Device`.
    /// No retry is attempted; retry policy belongs to the caller.
    pub fn start<S, F, P>(
        config: SessionConfig,
        source_factory: F,
        sinks: P,
    ) -> Result<(Self, Receiver<SessionEvent>)>
    where
        S: AudioSource + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
        P: SinkProvider,
    {
        config.format.validate()?;
        if config.format.bits_per_sample != 16 {
            // The pipeline frame type is i16; a header claiming another
            // depth over a 16-bit payload would be self-contradicting.
            return Err(CaptureError::InvalidFormat(format!(
                "capture pipeline encodes 16-bit PCM frames, not {} bits per sample",
                config.format.bits_per_sample
            )));
        }
        if config.frame_samples == 0 {
            return Err(CaptureError::InvalidFormat(
                "frame_samples must be > 0".into(),
            ));
        }

        let running = Arc::new(AtomicBool::new(true));
        let queue = Arc::new(match config.queue_capacity {
            Some(cap) => FrameQueue::bounded(cap),
            None => FrameQueue::unbounded(),
        });
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<SessionEvent>();

        // Sync handshake: the capture thread signals open success/failure.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        let capture = {
            let running = Arc::clone(&running);
            let queue = Arc::clone(&queue);
            let event_tx = event_tx.clone();
            std::thread::spawn(move || {
                // The source must be created and dropped on this thread.
                let mut source = match source_factory() {
                    Ok(source) => {
                        let _ = open_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        running.store(false, Ordering::SeqCst);
                        queue.close();
                        return;
                    }
                };

                capture_loop(&mut source, &running, &queue, &event_tx);

                // Remaining queued frames are still drained by the consumer.
                queue.close();
                debug!("capture thread exiting; releasing device");
            })
        };

        match open_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = capture.join();
                return Err(e);
            }
            Err(_) => {
                // Channel closed before a message was sent — factory panicked.
                let _ = capture.join();
                return Err(CaptureError::Other(anyhow::anyhow!(
                    "capture thread died before opening the device"
                )));
            }
        }

        info!(
            sample_rate = config.format.sample_rate_hz,
            channels = config.format.channels,
            frame_samples = config.frame_samples,
            "session started — listening"
        );

        let processing = {
            let queue = Arc::clone(&queue);
            let config = config.clone();
            std::thread::spawn(move || processing_loop(&config, &queue, sinks, &event_tx))
        };

        Ok((
            Self {
                running,
                queue,
                capture: Mutex::new(Some(capture)),
                processing: Mutex::new(Some(processing)),
            },
            event_rx,
        ))
    }

    /// Start a session on the system default microphone.
    ///
    /// Convenience over [`start`](Self::start) that builds the
    /// [`MicSource`](crate::audio::MicSource) from the config — format,
    /// frame size and `buffer_multiplier` all apply. The source is still
    /// constructed inside the capture thread.
    pub fn start_with_default_mic<P: SinkProvider>(
        config: SessionConfig,
        sinks: P,
    ) -> Result<(Self, Receiver<SessionEvent>)> {
        let format = config.format;
        let frame_samples = config.frame_samples;
        let buffer_multiplier = config.buffer_multiplier;
        Self::start(
            config,
            move || crate::audio::MicSource::open(format, frame_samples, buffer_multiplier),
            sinks,
        )
    }

    /// Stop the session from any thread.
    ///
    /// Wakes a processing thread parked in `pop()` immediately, drains the
    /// queue, finalizes any in-flight utterance, and joins both threads.
    /// Idempotent.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("session stop requested");
        }
        self.queue.close();
        if let Some(handle) = self.capture.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.processing.lock().take() {
            let _ = handle.join();
        }
    }

    /// Whether the capture side is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Capture context: blocks only inside `read_frame` and `push`.
fn capture_loop<S: AudioSource>(
    source: &mut S,
    running: &AtomicBool,
    queue: &FrameQueue,
    event_tx: &Sender<SessionEvent>,
) {
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match source.read_frame() {
            Ok(frame) => {
                if queue.push(frame).is_err() {
                    break; // queue closed by stop()
                }
            }
            Err(CaptureError::SourceClosed) => break,
            Err(e) => {
                // Device failure is fatal to the session; the caller owns
                // any retry policy.
                if running.load(Ordering::SeqCst) {
                    error!("capture failed: {e}");
                    let _ = event_tx.send(SessionEvent::CaptureFailed {
                        reason: e.to_string(),
                    });
                    running.store(false, Ordering::SeqCst);
                }
                break;
            }
        }
    }
}

struct ActiveUtterance {
    seq: u64,
    path: PathBuf,
    writer: UtteranceWriter<Box<dyn WavSink>>,
}

/// Processing context: blocks only inside `pop`; VAD and encoding run
/// synchronously here so the capture thread never waits on them.
fn processing_loop<P: SinkProvider>(
    config: &SessionConfig,
    queue: &FrameQueue,
    mut sinks: P,
    event_tx: &Sender<SessionEvent>,
) {
    let _ = event_tx.send(SessionEvent::Started);

    let mut vad = BaselineVad::new(config.start_sensitivity, config.stop_sensitivity);
    let mut active: Option<ActiveUtterance> = None;
    let mut next_seq = 0u64;
    let mut completed = 0u64;

    while let Some(frame) = queue.pop() {
        match vad.classify(&frame) {
            VadEvent::Silence => {}

            VadEvent::SpeechStart => {
                let seq = next_seq;
                next_seq += 1;
                match begin_utterance(config.format, &mut sinks, &frame) {
                    Ok((path, writer)) => {
                        debug!(utterance = seq, path = %path.display(), "utterance started");
                        let _ = event_tx.send(SessionEvent::SpeechStart { utterance: seq });
                        active = Some(ActiveUtterance { seq, path, writer });
                    }
                    Err((path, e)) => {
                        warn!("could not open utterance sink: {e}");
                        let _ = event_tx.send(SessionEvent::UtteranceAborted {
                            utterance: seq,
                            path: path.unwrap_or_default(),
                            reason: e.to_string(),
                        });
                        // Recalibrate rather than trust a baseline we
                        // stopped tracking mid-segment.
                        vad.reset();
                    }
                }
            }

            VadEvent::SpeechContinue => {
                if let Some(mut utterance) = active.take() {
                    match utterance.writer.append_frame(&frame) {
                        Ok(()) => active = Some(utterance),
                        Err(e) => {
                            // Abort only this utterance; partial data stays
                            // in place for the caller to inspect or delete.
                            warn!(
                                utterance = utterance.seq,
                                path = %utterance.path.display(),
                                "encoding failed mid-utterance: {e}"
                            );
                            let _ = event_tx.send(SessionEvent::UtteranceAborted {
                                utterance: utterance.seq,
                                path: utterance.path,
                                reason: e.to_string(),
                            });
                            vad.reset();
                        }
                    }
                }
            }

            VadEvent::SpeechEnd => {
                if let Some(utterance) = active.take() {
                    if finish_utterance(utterance, event_tx) {
                        completed += 1;
                    }
                }
            }
        }
    }

    // Queue closed and drained: finalize an in-flight utterance instead of
    // discarding it.
    if let Some(utterance) = active.take() {
        debug!(
            utterance = utterance.seq,
            "stop requested mid-speech — finalizing in-flight utterance"
        );
        if finish_utterance(utterance, event_tx) {
            completed += 1;
        }
    }

    info!(utterances = completed, "session finished");
    let _ = event_tx.send(SessionEvent::Finished);
}

type BeginError = (Option<PathBuf>, CaptureError);

fn begin_utterance<P: SinkProvider>(
    format: AudioFormat,
    sinks: &mut P,
    first_frame: &PcmFrame,
) -> std::result::Result<(PathBuf, UtteranceWriter<Box<dyn WavSink>>), BeginError> {
    let (path, sink) = sinks.next_sink().map_err(|e| (None, e))?;
    let mut writer =
        UtteranceWriter::begin(format, sink).map_err(|e| (Some(path.clone()), e))?;
    writer
        .append_frame(first_frame)
        .map_err(|e| (Some(path.clone()), e))?;
    Ok((path, writer))
}

fn finish_utterance(mut utterance: ActiveUtterance, event_tx: &Sender<SessionEvent>) -> bool {
    match utterance.writer.finalize() {
        Ok(wav) => {
            info!(
                utterance = utterance.seq,
                path = %utterance.path.display(),
                payload_len = wav.payload_len,
                "utterance completed"
            );
            let _ = event_tx.send(SessionEvent::UtteranceCompleted {
                utterance: utterance.seq,
                path: utterance.path,
                payload_len: wav.payload_len,
            });
            true
        }
        Err(CaptureError::AlreadyFinalized) => {
            // Documented policy: a redundant finalize is logged and ignored.
            warn!(utterance = utterance.seq, "utterance already finalized");
            false
        }
        Err(e) => {
            warn!(
                utterance = utterance.seq,
                path = %utterance.path.display(),
                "finalize failed: {e}"
            );
            let _ = event_tx.send(SessionEvent::UtteranceAborted {
                utterance: utterance.seq,
                path: utterance.path,
                reason: e.to_string(),
            });
            false
        }
    }
}
