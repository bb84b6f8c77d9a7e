use nom::error::{ErrorKind, ParseError};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors raised while reading, decoding or summarizing a TSH trace
///
/// The first group (`Eof` .. `NomError`) is the streaming protocol of
/// [`TshReader`](crate::TshReader): `Eof` and `Incomplete` are expected during a read loop
/// and are not failures. All other variants are fatal for the trace being processed.
#[derive(Debug)]
pub enum TshError {
    /// No more records
    Eof,
    /// Not enough data buffered, `refill()` and retry
    Incomplete(usize),
    /// Input ended in the middle of a record
    UnexpectedEof,
    /// The underlying reader failed
    ReadError,
    /// A record does not fit in the reader buffer
    BufferTooSmall,
    NomError(ErrorKind),

    /// An I/O error on the trace or dump file
    Io(io::Error),
    /// File size is not a multiple of the record length
    CorruptTrace { path: PathBuf, size: u64 },
    /// The 24-bit microsecond field holds one second or more
    MalformedMicroseconds(u32),
    /// Timestamps went backwards while flow extraction was active
    NonMonotonicTimestamp { previous: f64, current: f64 },
    /// Too many segments share one timestamp on one interface
    TooManyCollisions { interface: u8, timestamp: String },
    /// Per-protocol packet totals do not add up to the record count
    Inconsistent { counted: u64, records: u64 },
    /// A protocol number appears twice in a protocol table
    DuplicateProtocol(u8),
    /// A protocol table line could not be parsed (1-based line number)
    ProtocolTableSyntax(usize),
}

impl TshError {
    /// Returns true if more data must be read before decoding can go on
    pub fn is_incomplete(&self) -> bool {
        matches!(self, TshError::Incomplete(_))
    }
}

impl fmt::Display for TshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TshError::Eof => write!(f, "End of file"),
            TshError::Incomplete(n) => write!(f, "Incomplete read: {} more bytes needed", n),
            TshError::UnexpectedEof => write!(f, "Unexpected end of file, truncated record"),
            TshError::ReadError => write!(f, "Read error"),
            TshError::BufferTooSmall => write!(f, "Buffer is too small"),
            TshError::NomError(kind) => write!(f, "Internal parser error {:?}", kind),
            TshError::Io(e) => write!(f, "I/O error: {}", e),
            TshError::CorruptTrace { path, size } => write!(
                f,
                "{}: size {} is not a multiple of the record length",
                path.display(),
                size
            ),
            TshError::MalformedMicroseconds(us) => {
                write!(f, "Malformed timestamp: {} microseconds", us)
            }
            TshError::NonMonotonicTimestamp { previous, current } => write!(
                f,
                "Timestamp {:.6} is earlier than previous timestamp {:.6}",
                current, previous
            ),
            TshError::TooManyCollisions {
                interface,
                timestamp,
            } => write!(
                f,
                "Too many segments at timestamp {} on interface {}",
                timestamp, interface
            ),
            TshError::Inconsistent { counted, records } => write!(
                f,
                "Transport packet total {} does not match record count {}",
                counted, records
            ),
            TshError::DuplicateProtocol(n) => {
                write!(f, "Protocol number {} defined more than once", n)
            }
            TshError::ProtocolTableSyntax(line) => {
                write!(f, "Malformed protocol table entry at line {}", line)
            }
        }
    }
}

impl std::error::Error for TshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TshError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TshError {
    fn from(e: io::Error) -> Self {
        TshError::Io(e)
    }
}

impl<I> ParseError<I> for TshError {
    fn from_error_kind(_input: I, kind: ErrorKind) -> Self {
        TshError::NomError(kind)
    }
    fn append(_input: I, kind: ErrorKind, _other: Self) -> Self {
        TshError::NomError(kind)
    }
}
