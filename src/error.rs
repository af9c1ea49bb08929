//! Central error type for reading and filtering chunked recordings.
//!
//! Alle Fehler sind `Clone + PartialEq`, damit Tests sie direkt vergleichen
//! können. IO-Fehler behalten ihre `ErrorKind`.

use core::fmt;
use std::borrow::Cow;
use std::io;

/// All errors raised while parsing, filtering or writing a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Underlying read/write/seek failure, propagated unchanged.
    Io { kind: io::ErrorKind, message: String },
    /// The chunk does not start with the `FLR\0` magic.
    InvalidMagic([u8; 4]),
    /// Major version of the chunk header is not understood.
    UnsupportedVersion { major: u16, minor: u16 },
    /// The chunk header is inconsistent (sizes/offsets out of range).
    MalformedHeader(Cow<'static, str>),
    /// The chunk was never finished by its producer (chunk size 0).
    UnfinishedChunk { position: u64 },
    /// A record inside a chunk is structurally broken.
    CorruptRecord { position: u64, reason: Cow<'static, str> },
    /// A record of the wrong kind was found where another was expected.
    UnexpectedRecordType { position: u64, expected: u64, found: u64 },
    /// The declared size of a checkpoint differs from the bytes it actually holds.
    CheckpointSizeMismatch { position: u64, declared: u64, actual: u64 },
    /// A constant pool of a type the metadata does not describe.
    UnknownPoolType(u64),
    /// A compressed integer does not fit the target width.
    IntegerOverflow,
    /// A value is too large for the fixed-width padded encoding.
    PaddedValueTooLarge(u64),
    /// `write_event` was called with `end < start`.
    MalformedRange { start: u64, end: u64 },
    /// Chunk writer method called in the wrong chunk state.
    ChunkState(Cow<'static, str>),
    /// A checkpoint handle that is no longer (or never was) queued.
    UnknownCheckpoint(u64),
    /// A pool entry was added before any pool was opened on the checkpoint.
    NoOpenPool { checkpoint: u64 },
    /// The output was already released.
    OutputClosed,
    /// An event selector pattern is empty or otherwise unusable.
    InvalidPattern(String),
    /// A value handed to the recording builder does not fit the field it is written to.
    FieldMismatch { type_id: u64, field: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { kind, message } => write!(f, "IO error ({kind:?}): {message}"),
            Self::InvalidMagic(magic) => write!(f, "invalid chunk magic {magic:02X?}, expected \"FLR\\0\""),
            Self::UnsupportedVersion { major, minor } => write!(f, "unsupported recording version {major}.{minor}"),
            Self::MalformedHeader(msg) => write!(f, "malformed chunk header: {msg}"),
            Self::UnfinishedChunk { position } => write!(f, "chunk at {position} was never finished (size 0)"),
            Self::CorruptRecord { position, reason } => write!(f, "corrupt record at {position}: {reason}"),
            Self::UnexpectedRecordType { position, expected, found } => {
                write!(f, "expected record type {expected} at {position}, found {found}")
            }
            Self::CheckpointSizeMismatch { position, declared, actual } => write!(
                f,
                "checkpoint at {position} declares {declared} bytes but holds {actual}"
            ),
            Self::UnknownPoolType(type_id) => write!(f, "constant pool for type {type_id} not described by metadata"),
            Self::IntegerOverflow => write!(f, "compressed integer overflow"),
            Self::PaddedValueTooLarge(value) => write!(f, "value {value} exceeds padded 28-bit field"),
            Self::MalformedRange { start, end } => {
                write!(f, "start position must come before end position, start={start}, end={end}")
            }
            Self::ChunkState(msg) => write!(f, "chunk state: {msg}"),
            Self::UnknownCheckpoint(position) => write!(f, "no queued checkpoint at {position}"),
            Self::NoOpenPool { checkpoint } => write!(f, "checkpoint at {checkpoint} has no open pool"),
            Self::OutputClosed => write!(f, "output already closed"),
            Self::InvalidPattern(pattern) => write!(f, "invalid event pattern '{pattern}'"),
            Self::FieldMismatch { type_id, field } => {
                write!(f, "value does not match field '{field}' of type {type_id}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl Error {
    /// Erstellt einen `CorruptRecord` Fehler mit Grund.
    pub fn corrupt(position: u64, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptRecord {
            position,
            reason: reason.into(),
        }
    }

    /// Erstellt einen `MalformedHeader` Fehler mit Nachricht.
    pub fn malformed_header(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    /// Erstellt einen `ChunkState` Fehler mit Nachricht.
    pub fn chunk_state(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::ChunkState(msg.into())
    }

    /// `ErrorKind` des zugrundeliegenden IO-Fehlers, falls vorhanden.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
