//! Typed PCM frame passed from the capture thread to the processing thread.

use byteorder::{ByteOrder, LittleEndian};

/// One fixed-size batch of interleaved signed 16-bit samples from a single
/// capture read.
///
/// A frame is exclusively owned by whichever stage currently holds it —
/// the producer until it is enqueued, the consumer after dequeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    samples: Vec<i16>,
}

impl PcmFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// A frame of `len` zero samples.
    pub fn silent(len: usize) -> Self {
        Self {
            samples: vec![0; len],
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of interleaved samples (all channels).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Payload size of this frame once encoded as 16-bit little-endian PCM.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    /// Encode the samples as little-endian PCM bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.byte_len()];
        LittleEndian::write_i16_into(&self.samples, &mut bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_little_endian() {
        let frame = PcmFrame::new(vec![1, -2, 0x1234]);
        assert_eq!(frame.byte_len(), 6);
        assert_eq!(
            frame.to_le_bytes(),
            vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]
        );
    }

    #[test]
    fn silent_frame_is_all_zero_bytes() {
        let frame = PcmFrame::silent(4);
        assert_eq!(frame.len(), 4);
        assert!(frame.to_le_bytes().iter().all(|&b| b == 0));
    }
}
