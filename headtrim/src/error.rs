use crate::utils::InvalidPointerError;

#[derive(Debug, thiserror::Error)]
pub enum Kind {
    #[error("input is not in the format handled by this transcoder")]
    FormatMismatch,
    #[error("unsupported sample format 0x{format:04X}")]
    UnsupportedVariant { format: u16 },
    #[error("could not set up FLAC codec: {0}")]
    CodecInit(&'static str),
    #[error("FLAC encoder failed: {0}")]
    Encode(&'static str),
    #[error("unknown file type")]
    UnknownContainer,
    #[error("chunk {tag:?} declares a negative length {length}")]
    MalformedChunk { tag: String, length: i32 },
    #[error("record ended before all of its fields could be read")]
    Truncated,
    #[error("delay must be a non-negative number of milliseconds, got {0}")]
    InvalidRequest(f64),
    #[error("could not parse config: {0}")]
    Config(String),
    #[error("could not install tracing subscriber: {0}")]
    Tracing(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error {
    kind: Kind,
}

impl Error {
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn into_kind(self) -> Kind {
        self.kind
    }

    /// Whether a transcoder declined the input rather than failed on it.
    pub fn is_format_mismatch(&self) -> bool {
        matches!(self.kind, Kind::FormatMismatch)
    }
}

impl<K: Into<Kind>> From<K> for Error {
    fn from(value: K) -> Self {
        Self { kind: value.into() }
    }
}

impl<T> From<Kind> for Result<T, Error> {
    fn from(value: Kind) -> Self {
        Err(value.into())
    }
}

impl From<InvalidPointerError> for Kind {
    fn from(_value: InvalidPointerError) -> Self {
        Self::Truncated
    }
}
