//! Voice Activity Detection (VAD) abstraction.
//!
//! The `VoiceActivityDetector` trait is the extensibility seam: the session
//! drives whatever detector it is given, frame by frame, and only reacts to
//! the emitted [`VadEvent`]s.

pub mod baseline;

pub use baseline::{BaselineVad, DEFAULT_SENSITIVITY};

use crate::buffering::frame::PcmFrame;

/// Per-frame classification emitted by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// The frame is below the speech threshold; nothing to persist.
    Silence,
    /// A speech segment begins with this frame. The frame belongs to the
    /// new utterance.
    SpeechStart,
    /// Speech continues; the frame belongs to the current utterance.
    SpeechContinue,
    /// The speech segment ended. This frame is silence again and is *not*
    /// part of the utterance.
    SpeechEnd,
}

/// Detector state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// No baseline yet; the first frame calibrates it.
    Calibrating,
    Silence,
    Speaking,
}

/// Trait for all VAD implementations.
///
/// Implementors are stateful (running baselines, hysteresis state, etc.)
/// and are owned exclusively by the processing thread.
pub trait VoiceActivityDetector: Send + 'static {
    /// Classify one frame and advance the internal state machine.
    fn classify(&mut self, frame: &PcmFrame) -> VadEvent;

    /// Current state machine position.
    fn state(&self) -> VadState;

    /// Drop all internal state and return to `Calibrating`.
    fn reset(&mut self);
}
