//! PCM WAV container serialization.
//!
//! A WAV file is a 44-byte RIFF header followed by raw PCM payload. The two
//! size fields in the header depend on the payload length, which is unknown
//! while an utterance is still being captured. [`UtteranceWriter`] therefore
//! writes a placeholder header up front, appends payload as it arrives, and
//! rewrites the header with the final sizes on [`finalize`].
//!
//! Header layout (all multi-byte fields little-endian):
//!
//! | offset | field |
//! |--------|-------|
//! | 0  | `"RIFF"` |
//! | 4  | chunk size = payload + 36 |
//! | 8  | `"WAVE"` |
//! | 12 | `"fmt "` |
//! | 16 | fmt sub-chunk size = 16 |
//! | 20 | audio format = 1 (PCM) |
//! | 22 | channel count |
//! | 24 | sample rate |
//! | 28 | byte rate |
//! | 32 | block align |
//! | 34 | bits per sample |
//! | 36 | `"data"` |
//! | 40 | data sub-chunk size = payload |
//!
//! [`finalize`]: UtteranceWriter::finalize

use std::io::{self, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::buffering::frame::PcmFrame;
use crate::error::{CaptureError, Result};
use crate::format::AudioFormat;

/// Fixed size of the RIFF/fmt/data header preceding the payload.
pub const HEADER_LEN: u32 = 44;

/// Bytes the RIFF chunk size exceeds the payload by (header minus the
/// 8-byte RIFF preamble).
pub const RIFF_OVERHEAD: u32 = 36;

/// Anything an utterance can be written to. Files and in-memory cursors
/// both qualify.
pub trait WavSink: Write + Seek + Send {}
impl<T: Write + Seek + Send> WavSink for T {}

/// A finalized WAV artifact: header fields consistent with the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFile {
    pub format: AudioFormat,
    /// Raw PCM payload length in bytes (the data sub-chunk size).
    pub payload_len: u32,
}

impl WavFile {
    /// Value of the header's RIFF chunk-size field.
    pub fn riff_chunk_size(&self) -> u32 {
        self.payload_len + RIFF_OVERHEAD
    }

    /// Total on-disk size: header plus payload.
    pub fn total_len(&self) -> u64 {
        u64::from(HEADER_LEN) + u64::from(self.payload_len)
    }
}

fn write_header<W: Write>(sink: &mut W, format: &AudioFormat, payload_len: u32) -> io::Result<()> {
    sink.write_all(b"RIFF")?;
    sink.write_u32::<LittleEndian>(payload_len + RIFF_OVERHEAD)?;
    sink.write_all(b"WAVE")?;
    sink.write_all(b"fmt ")?;
    sink.write_u32::<LittleEndian>(16)?; // PCM fmt sub-chunk size
    sink.write_u16::<LittleEndian>(1)?; // audio format: uncompressed PCM
    sink.write_u16::<LittleEndian>(format.channels)?;
    sink.write_u32::<LittleEndian>(format.sample_rate_hz)?;
    sink.write_u32::<LittleEndian>(format.byte_rate())?;
    sink.write_u16::<LittleEndian>(format.block_align())?;
    sink.write_u16::<LittleEndian>(format.bits_per_sample)?;
    sink.write_all(b"data")?;
    sink.write_u32::<LittleEndian>(payload_len)?;
    Ok(())
}

/// Accumulates the PCM payload of one utterance behind a placeholder header.
///
/// Created per detected speech segment, many per session; owned exclusively
/// by the processing thread for its lifetime.
pub struct UtteranceWriter<W: WavSink> {
    sink: W,
    format: AudioFormat,
    payload_len: u32,
    finalized: bool,
}

impl<W: WavSink> UtteranceWriter<W> {
    /// Open a new utterance: validates the format and writes a 44-byte
    /// placeholder header (both size fields zero) to the sink.
    pub fn begin(format: AudioFormat, mut sink: W) -> Result<Self> {
        format.validate()?;
        write_header(&mut sink, &format, 0)?;
        Ok(Self {
            sink,
            format,
            payload_len: 0,
            finalized: false,
        })
    }

    /// Append raw PCM payload bytes.
    ///
    /// # Errors
    /// `AlreadyFinalized` after [`finalize`](Self::finalize); `Io` if the
    /// sink write fails (bytes already written stay in place) or if the
    /// payload would exceed the u32 the header can describe.
    pub fn append(&mut self, pcm: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(CaptureError::AlreadyFinalized);
        }
        let new_len = self
            .payload_len
            .checked_add(u32::try_from(pcm.len()).map_err(|_| oversize_payload())?)
            .ok_or_else(oversize_payload)?;
        if new_len > u32::MAX - RIFF_OVERHEAD {
            return Err(oversize_payload());
        }
        self.sink.write_all(pcm)?;
        self.payload_len = new_len;
        Ok(())
    }

    /// Append one frame, encoded as little-endian 16-bit PCM.
    pub fn append_frame(&mut self, frame: &PcmFrame) -> Result<()> {
        self.append(&frame.to_le_bytes())
    }

    /// Payload bytes accumulated so far.
    pub fn payload_len(&self) -> u32 {
        self.payload_len
    }

    /// Rewrite the header with the final sizes, flush, and seal the writer.
    ///
    /// A second call fails with `AlreadyFinalized` and leaves the sink
    /// untouched — the header is never rewritten twice. Callers that may
    /// race a natural end-of-speech against an explicit stop can log and
    /// ignore that error.
    pub fn finalize(&mut self) -> Result<WavFile> {
        if self.finalized {
            return Err(CaptureError::AlreadyFinalized);
        }
        self.sink.seek(SeekFrom::Start(0))?;
        write_header(&mut self.sink, &self.format, self.payload_len)?;
        self.sink.seek(SeekFrom::End(0))?;
        self.sink.flush()?;
        self.finalized = true;
        debug!(payload_len = self.payload_len, "utterance finalized");
        Ok(WavFile {
            format: self.format,
            payload_len: self.payload_len,
        })
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Consume the writer and hand back the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

fn oversize_payload() -> CaptureError {
    CaptureError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        "wav payload exceeds the 4 GiB a RIFF header can describe",
    ))
}
