//! PCM format description and byte-layout arithmetic.

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};

/// PCM audio format, fixed for the lifetime of a session.
///
/// Determines the frame byte layout and every derived WAV header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate_hz: u32,
    /// Channel count: 1 (mono) or 2 (stereo).
    pub channels: u16,
    /// Bits per sample: 8, 16 or 32.
    pub bits_per_sample: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

impl AudioFormat {
    /// Check that the format is one this crate can capture and encode.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(CaptureError::InvalidFormat("sample rate must be > 0".into()));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(CaptureError::InvalidFormat(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 32) {
            return Err(CaptureError::InvalidFormat(format!(
                "unsupported bit depth: {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    /// Bytes occupied by one sample of one channel.
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// Bytes per sample block across all channels (WAV `BlockAlign`).
    pub fn block_align(&self) -> u16 {
        self.channels * self.bytes_per_sample()
    }

    /// Bytes of payload per second of audio (WAV `ByteRate`).
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate_hz * u32::from(self.block_align())
    }
}
