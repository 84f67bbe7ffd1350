//! Events delivered to the external UI/session-boundary collaborator.
//!
//! Events are handed off over a channel and consumed on the observer's own
//! thread — never invoked directly from the processing thread. Delivery
//! order is emission order.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle and boundary events of one recording session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    /// The session is listening; frames are flowing.
    Started,
    /// A speech segment began; an utterance file is now being written.
    SpeechStart {
        /// Zero-based index of the utterance within this session.
        utterance: u64,
    },
    /// A speech segment ended and its WAV file was finalized.
    UtteranceCompleted {
        utterance: u64,
        /// Path supplied by the sink provider for this utterance.
        path: PathBuf,
        /// Final data sub-chunk size in bytes.
        payload_len: u32,
    },
    /// Encoding I/O failed mid-utterance. Partial data already written is
    /// left in place; the session keeps listening.
    UtteranceAborted {
        utterance: u64,
        path: PathBuf,
        reason: String,
    },
    /// The capture device failed; the session is shutting down.
    CaptureFailed { reason: String },
    /// The session stopped; no further events follow.
    Finished,
}
