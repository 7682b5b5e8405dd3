//! Error taxonomy for connection operations.
//!
//! Every failure that crosses an operation boundary is one [`ConnError`]
//! variant carrying the context message of the underlying cause. OS errors are
//! mapped into the variant matching the operation that was in flight, so
//! callers can tell a failed read from a failed open without string matching.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type ConnResult<T> = Result<T, ConnError>;

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("invalid connection")]
    InvalidConnection,

    #[error("cannot open the connection: {0}")]
    CannotOpenConnection(String),

    #[error("cannot open file '{path}': {reason}")]
    CannotOpenFile { path: String, reason: String },

    #[error("cannot open fifo '{path}': {reason}")]
    CannotOpenFifo { path: String, reason: String },

    #[error("unsupported open mode '{0}'")]
    UnsupportedMode(String),

    #[error("unsupported conversion from '{0}'")]
    UnsupportedEncodingConversion(String),

    #[error("error reading from the connection: {0}")]
    ErrorReadingConnection(String),

    #[error("error writing to the connection: {0}")]
    ErrorWritingConnection(String),

    #[error("error flushing the connection: {0}")]
    ErrorFlushingConnection(String),

    #[error("cannot read from this connection")]
    CannotReadConnection,

    #[error("cannot write to this connection")]
    CannotWriteConnection,

    #[error("can only read from a binary connection")]
    OnlyReadBinaryConnection,

    #[error("can only write to a binary connection")]
    OnlyWriteBinaryConnection,

    #[error("truncation not supported for {0} connections")]
    TruncateUnsupportedForConnection(String),

    #[error("not a socket connection")]
    NotASocketConnection,

    #[error("'con' is not a textConnection")]
    NotATextConnection,

    #[error("'con' is not {0}")]
    NotARawConnection(String),

    #[error("too few lines read in readLines")]
    TooFewLinesRead,

    #[error("'seek' not enabled for this connection")]
    SeekNotEnabled,

    #[error("connection is not open")]
    NotOpen,

    #[error("all connections are in use")]
    AllConnectionsInUse,

    #[error("non-blocking mode is not supported for {0} connections")]
    BlockingRequired(String),

    #[error("invalid '{0}' argument")]
    InvalidArgument(String),

    #[error("{0}")]
    Generic(String),
}

impl ConnError {
    pub(crate) fn reading(err: io::Error) -> Self {
        ConnError::ErrorReadingConnection(err.to_string())
    }

    pub(crate) fn writing(err: io::Error) -> Self {
        ConnError::ErrorWritingConnection(err.to_string())
    }

    pub(crate) fn flushing(err: io::Error) -> Self {
        ConnError::ErrorFlushingConnection(err.to_string())
    }

    pub(crate) fn generic(err: io::Error) -> Self {
        ConnError::Generic(err.to_string())
    }
}
