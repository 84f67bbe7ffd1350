//! # uttercap
//!
//! Streaming microphone capture with RMS voice-activity segmentation to
//! standards-compliant PCM WAV files.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioSource (capture thread) → FrameQueue → processing thread
//!                                                              │
//!                                                     BaselineVad decision
//!                                                              │
//!                                        UtteranceWriter (per speech segment)
//!                                                              │
//!                                            crossbeam Sender<SessionEvent>
//! ```
//!
//! The capture thread blocks only in `read_frame` and `push`; RMS analysis
//! and file I/O happen on the processing thread so the capture side never
//! misses samples. A detected speech segment becomes exactly one WAV file;
//! the surrounding application supplies the sink (and the file name) per
//! utterance and reacts to [`SessionEvent`]s on its own thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod error;
pub mod format;
pub mod session;
pub mod vad;
pub mod wav;

// Convenience re-exports for downstream crates
pub use audio::{AudioSource, MicSource};
pub use buffering::{frame::PcmFrame, FrameQueue, PushOutcome};
pub use error::CaptureError;
pub use format::AudioFormat;
pub use session::{events::SessionEvent, RecordingSession, SessionConfig, SinkProvider};
pub use vad::{BaselineVad, VadEvent, VadState, VoiceActivityDetector};
pub use wav::{UtteranceWriter, WavFile, WavSink};
