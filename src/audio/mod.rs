//! Microphone capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** allocate, block on a lock, or perform I/O. The callback
//! therefore only converts device samples to i16 and `push_slice`s them into
//! a lock-free SPSC ring buffer; [`AudioSource::read_frame`] assembles whole
//! frames from the consumer half on the capture thread.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). A `MicSource` must be created and dropped on the same thread; the
//! session accomplishes this by constructing the source inside the capture
//! thread via a factory closure.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::frame::PcmFrame,
    error::{CaptureError, Result},
    format::AudioFormat,
};

/// A blocking producer of fixed-size PCM frames.
///
/// `read_frame` suspends the calling thread until a full frame of samples is
/// available, fails with `CaptureError::Device`/`Stream` if the underlying
/// device fails, and with `CaptureError::SourceClosed` once the source has
/// been stopped and drained. The device is released when the source is
/// dropped.
pub trait AudioSource {
    /// The format this source was opened with.
    fn format(&self) -> AudioFormat;

    /// Interleaved samples per frame.
    fn frame_samples(&self) -> usize;

    /// Block until one full frame has been captured.
    fn read_frame(&mut self) -> Result<PcmFrame>;
}

/// Default ratio between the capture ring buffer and one frame. Oversizing
/// the device-side buffer trades latency for robustness against consumer
/// stalls.
pub const DEFAULT_BUFFER_MULTIPLIER: usize = 10;

#[cfg(feature = "audio-cpal")]
pub use cpal_source::MicSource;

#[cfg(feature = "audio-cpal")]
mod cpal_source {
    use super::*;

    use parking_lot::Mutex;
    use ringbuf::{
        traits::{Consumer, Producer, Split},
        HeapCons, HeapProd, HeapRb,
    };
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };
    use std::time::Duration;
    use tracing::{error, info, warn};

    /// Only one physical microphone handle may exist at a time; concurrent
    /// access to the device is undefined.
    static DEVICE_CLAIMED: AtomicBool = AtomicBool::new(false);

    /// Exactly-once release of the process-wide device claim, including the
    /// failed-open paths.
    struct DeviceClaim;

    impl DeviceClaim {
        fn acquire() -> Result<Self> {
            if DEVICE_CLAIMED.swap(true, Ordering::AcqRel) {
                return Err(CaptureError::AlreadyOpen);
            }
            Ok(Self)
        }
    }

    impl Drop for DeviceClaim {
        fn drop(&mut self) {
            DEVICE_CLAIMED.store(false, Ordering::Release);
        }
    }

    /// Sleep while waiting for the ring to fill (avoids busy-waiting a core).
    const EMPTY_SLEEP: Duration = Duration::from_millis(5);

    /// Live microphone input. **Not `Send`** — see the module docs.
    pub struct MicSource {
        /// Kept alive so the stream is not dropped prematurely.
        _stream: Stream,
        consumer: HeapCons<i16>,
        running: Arc<AtomicBool>,
        /// First stream error reported by the cpal error callback. Once set,
        /// `read_frame` stops waiting for samples and fails instead.
        failure: Arc<Mutex<Option<String>>>,
        format: AudioFormat,
        frame_samples: usize,
        _claim: DeviceClaim,
    }

    /// Error callback shared by all sample-format arms: logs every stream
    /// error and records the first one for `read_frame` to report.
    fn failure_callback(failure: Arc<Mutex<Option<String>>>) -> impl FnMut(cpal::StreamError) {
        move |err| {
            error!("audio stream error: {err}");
            let mut slot = failure.lock();
            if slot.is_none() {
                *slot = Some(err.to_string());
            }
        }
    }

    impl MicSource {
        /// Open the system default input device at the requested format.
        ///
        /// The capture ring holds `frame_samples * buffer_multiplier`
        /// samples (default multiplier 10× — a generous margin over one
        /// frame so a stalled consumer does not tear the stream).
        ///
        /// # Errors
        /// - `CaptureError::AlreadyOpen` if another `MicSource` is live.
        /// - `CaptureError::NoDefaultInputDevice` when no microphone exists.
        /// - `CaptureError::Stream` if cpal fails to build or start the stream.
        pub fn open(
            format: AudioFormat,
            frame_samples: usize,
            buffer_multiplier: usize,
        ) -> Result<Self> {
            format.validate()?;
            if format.bits_per_sample != 16 {
                // All device formats are converted to i16 on capture.
                return Err(CaptureError::InvalidFormat(format!(
                    "microphone capture produces 16-bit PCM frames, not {} bits per sample",
                    format.bits_per_sample
                )));
            }
            if frame_samples == 0 {
                return Err(CaptureError::InvalidFormat(
                    "frame_samples must be > 0".into(),
                ));
            }
            let claim = DeviceClaim::acquire()?;

            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or(CaptureError::NoDefaultInputDevice)?;

            info!(
                device = device.name().unwrap_or_default().as_str(),
                sample_rate = format.sample_rate_hz,
                channels = format.channels,
                "opening input device"
            );

            let supported = device
                .default_input_config()
                .map_err(|e| CaptureError::Device(e.to_string()))?;

            let config = StreamConfig {
                channels: format.channels,
                sample_rate: SampleRate(format.sample_rate_hz),
                buffer_size: cpal::BufferSize::Default,
            };

            let capacity = frame_samples * buffer_multiplier.max(1);
            let (mut producer, consumer) = HeapRb::<i16>::new(capacity).split();

            let running = Arc::new(AtomicBool::new(true));
            let running_cb = Arc::clone(&running);
            let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

            let stream = match supported.sample_format() {
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        let written = producer.push_slice(data);
                        if written < data.len() {
                            warn!(
                                "capture ring full: dropped {} i16 samples",
                                data.len() - written
                            );
                        }
                    },
                    failure_callback(Arc::clone(&failure)),
                    None,
                ),

                SampleFormat::F32 => {
                    let mut conv: Vec<i16> = Vec::new();
                    device.build_input_stream(
                        &config,
                        move |data: &[f32], _info| {
                            if !running_cb.load(Ordering::Relaxed) {
                                return;
                            }
                            conv.resize(data.len(), 0);
                            for (dst, src) in conv.iter_mut().zip(data) {
                                *dst = (src.clamp(-1.0, 1.0) * 32767.0) as i16;
                            }
                            let written = producer.push_slice(&conv);
                            if written < conv.len() {
                                warn!(
                                    "capture ring full: dropped {} f32 samples",
                                    conv.len() - written
                                );
                            }
                        },
                        failure_callback(Arc::clone(&failure)),
                        None,
                    )
                }

                SampleFormat::U8 => {
                    let mut conv: Vec<i16> = Vec::new();
                    device.build_input_stream(
                        &config,
                        move |data: &[u8], _info| {
                            if !running_cb.load(Ordering::Relaxed) {
                                return;
                            }
                            conv.resize(data.len(), 0);
                            for (dst, src) in conv.iter_mut().zip(data) {
                                *dst = (i16::from(*src) - 128) << 8;
                            }
                            let written = producer.push_slice(&conv);
                            if written < conv.len() {
                                warn!(
                                    "capture ring full: dropped {} u8 samples",
                                    conv.len() - written
                                );
                            }
                        },
                        failure_callback(Arc::clone(&failure)),
                        None,
                    )
                }

                fmt => {
                    return Err(CaptureError::Stream(format!(
                        "unsupported sample format: {fmt:?}"
                    )))
                }
            }
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

            stream
                .play()
                .map_err(|e| CaptureError::Stream(e.to_string()))?;

            Ok(Self {
                _stream: stream,
                consumer,
                running,
                failure,
                format,
                frame_samples,
                _claim: claim,
            })
        }

        /// Signal the callback to stop feeding the ring. `read_frame` drains
        /// what remains and then reports `SourceClosed`.
        pub fn stop(&self) {
            self.running.store(false, Ordering::Release);
        }
    }

    impl AudioSource for MicSource {
        fn format(&self) -> AudioFormat {
            self.format
        }

        fn frame_samples(&self) -> usize {
            self.frame_samples
        }

        fn read_frame(&mut self) -> Result<PcmFrame> {
            let mut samples = vec![0i16; self.frame_samples];
            let mut filled = 0;
            while filled < self.frame_samples {
                let n = self.consumer.pop_slice(&mut samples[filled..]);
                filled += n;
                if filled == self.frame_samples {
                    break;
                }
                if n == 0 {
                    // A dead stream delivers no more samples; without this
                    // check the wait below would never end.
                    if let Some(reason) = self.failure.lock().take() {
                        return Err(CaptureError::Stream(reason));
                    }
                    if !self.running.load(Ordering::Acquire) {
                        // A torn partial frame would corrupt payload
                        // alignment; discard it.
                        return Err(CaptureError::SourceClosed);
                    }
                    std::thread::sleep(EMPTY_SLEEP);
                }
            }
            Ok(PcmFrame::new(samples))
        }
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
pub struct MicSource;

#[cfg(not(feature = "audio-cpal"))]
impl MicSource {
    pub fn open(
        _format: AudioFormat,
        _frame_samples: usize,
        _buffer_multiplier: usize,
    ) -> Result<Self> {
        Err(CaptureError::Stream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn stop(&self) {}
}

#[cfg(not(feature = "audio-cpal"))]
impl AudioSource for MicSource {
    fn format(&self) -> AudioFormat {
        AudioFormat::default()
    }

    fn frame_samples(&self) -> usize {
        0
    }

    fn read_frame(&mut self) -> Result<PcmFrame> {
        Err(CaptureError::SourceClosed)
    }
}
