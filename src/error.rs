use thiserror::Error;

/// All errors produced by uttercap.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("capture device is already open")]
    AlreadyOpen,

    #[error("audio source is closed")]
    SourceClosed,

    #[error("frame queue is closed")]
    QueueClosed,

    #[error("utterance is already finalized")]
    AlreadyFinalized,

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
