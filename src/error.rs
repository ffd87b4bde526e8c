/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::error::Error;
use std::fmt::{Display, Debug, Formatter};
use std::io::Error as IoError;

/// The error type for **netio** operations
///
/// Every fallible operation in this crate returns `Result<T, NetError>`. The
/// variants form a closed classification: transport failures keep their
/// underlying [`std::io::Error`](std::io::Error) in
/// [`Failed`](NetError::Failed), while everything the library decides on its
/// own (deadlines, framing, codecs, exclusive use) gets a dedicated variant.
pub enum NetError {
    /// The underlying transport operation failed while the target was still
    /// open. Carries the originating I/O error.
    Failed(IoError),
    /// The target was closed while the operation was pending, either by an
    /// expired deadline or by an explicit close from another thread.
    Aborted,
    /// A staged operation's remaining time budget was already exhausted
    /// before the operation could start.
    TimedOut,
    /// A frame arrived malformed: the header or payload ended early.
    InvalidFrame,
    /// A frame header announced a payload larger than the configured
    /// maximum message size.
    TooBig,
    /// The user-supplied encoder rejected the outgoing message.
    Encoding,
    /// The user-supplied decoder rejected the incoming payload.
    Decoding,
    /// The resource is exclusively held by another in-flight operation.
    Busy,
}

impl Debug for NetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(inner) => write!(f, "NetError::Failed({:?})", inner),
            Self::Aborted => write!(f, "NetError::Aborted"),
            Self::TimedOut => write!(f, "NetError::TimedOut"),
            Self::InvalidFrame => write!(f, "NetError::InvalidFrame"),
            Self::TooBig => write!(f, "NetError::TooBig"),
            Self::Encoding => write!(f, "NetError::Encoding"),
            Self::Decoding => write!(f, "NetError::Decoding"),
            Self::Busy => write!(f, "NetError::Busy"),
        }
    }
}

impl Display for NetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NetError::Failed(inner) => write!(f, "The network operation failed: {}", inner),
            NetError::Aborted => write!(f, "The network operation was aborted, because the target was closed!"),
            NetError::TimedOut => write!(f, "The time budget was exhausted before the operation could start!"),
            NetError::InvalidFrame => write!(f, "The received frame was malformed!"),
            NetError::TooBig => write!(f, "The received frame exceeds the maximum message size!"),
            NetError::Encoding => write!(f, "The outgoing message could not be encoded!"),
            NetError::Decoding => write!(f, "The received payload could not be decoded!"),
            NetError::Busy => write!(f, "The resource is busy with another operation!"),
        }
    }
}

impl Error for NetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NetError::Failed(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<IoError> for NetError {
    fn from(error: IoError) -> Self {
        NetError::Failed(error)
    }
}
