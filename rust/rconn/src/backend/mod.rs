//! Backing stores behind a connection.
//!
//! [`Backend`] is a closed sum over every store the subsystem knows. The
//! connection layer talks to it through a handful of byte-level calls
//! (`open`, `read`, `write_all`, `flush`, `close`) plus capability queries
//! answered by matching on the variant. A connection's variant is fixed at
//! construction; re-opening changes the mode, never the variant.

pub mod channel;
pub mod compressed;
pub mod fifo;
pub mod file;
pub mod pipe;
pub mod raw;
pub mod socket;
pub mod terminal;
pub mod text;
pub mod url;

use std::fmt;
use std::io;

use crate::error::{ConnError, ConnResult};
use crate::mode::{OpenMode, SeekOrigin, SeekRw};

pub use channel::{ChannelBackend, ExternalChannel, StreamChannel};
pub use compressed::{CompressedBackend, Compression};
pub use fifo::FifoBackend;
pub use file::FileBackend;
pub use pipe::PipeBackend;
pub use raw::RawBackend;
pub use socket::SocketBackend;
pub use terminal::{StdStream, TerminalBackend};
pub use text::TextBackend;
pub use url::UrlBackend;

// ---------------------------------------------------------------------------
// ConnectionClass
// ---------------------------------------------------------------------------

/// The class name reported by `summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionClass {
    Terminal,
    File,
    GzFile,
    BzFile,
    XzFile,
    Fifo,
    Pipe,
    Socket,
    Url,
    Text,
    Raw,
    Channel,
}

impl ConnectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionClass::Terminal => "terminal",
            ConnectionClass::File => "file",
            ConnectionClass::GzFile => "gzfile",
            ConnectionClass::BzFile => "bzfile",
            ConnectionClass::XzFile => "xzfile",
            ConnectionClass::Fifo => "fifo",
            ConnectionClass::Pipe => "pipe",
            ConnectionClass::Socket => "sockconn",
            ConnectionClass::Url => "url",
            ConnectionClass::Text => "textConnection",
            ConnectionClass::Raw => "rawConnection",
            ConnectionClass::Channel => "channel",
        }
    }
}

impl fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

pub enum Backend {
    Terminal(TerminalBackend),
    File(FileBackend),
    Compressed(CompressedBackend),
    Fifo(FifoBackend),
    Pipe(PipeBackend),
    Socket(SocketBackend),
    Url(UrlBackend),
    Text(TextBackend),
    Raw(RawBackend),
    Channel(ChannelBackend),
}

macro_rules! dispatch {
    ($self:expr, $b:ident => $body:expr) => {
        match $self {
            Backend::Terminal($b) => $body,
            Backend::File($b) => $body,
            Backend::Compressed($b) => $body,
            Backend::Fifo($b) => $body,
            Backend::Pipe($b) => $body,
            Backend::Socket($b) => $body,
            Backend::Url($b) => $body,
            Backend::Text($b) => $body,
            Backend::Raw($b) => $body,
            Backend::Channel($b) => $body,
        }
    };
}

impl Backend {
    pub fn class(&self) -> ConnectionClass {
        match self {
            Backend::Terminal(_) => ConnectionClass::Terminal,
            Backend::File(_) => ConnectionClass::File,
            Backend::Compressed(c) => c.kind().class(),
            Backend::Fifo(_) => ConnectionClass::Fifo,
            Backend::Pipe(_) => ConnectionClass::Pipe,
            Backend::Socket(_) => ConnectionClass::Socket,
            Backend::Url(_) => ConnectionClass::Url,
            Backend::Text(_) => ConnectionClass::Text,
            Backend::Raw(_) => ConnectionClass::Raw,
            Backend::Channel(_) => ConnectionClass::Channel,
        }
    }

    /// Acquire the underlying resource for `mode`. Fails with an open-time
    /// error when the variant cannot honour the mode.
    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        dispatch!(self, b => b.open(mode))
    }

    pub fn close(&mut self) -> io::Result<()> {
        dispatch!(self, b => b.close())
    }

    /// Returns 0 at end of input. Non-blocking sockets also return 0 when no
    /// data is ready.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        dispatch!(self, b => b.read(buf))
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        dispatch!(self, b => b.write_all(buf))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        dispatch!(self, b => b.flush())
    }

    pub fn is_seekable(&self) -> bool {
        match self {
            Backend::File(f) => f.is_seekable(),
            Backend::Raw(_) => true,
            Backend::Channel(c) => c.is_seekable(),
            Backend::Terminal(_)
            | Backend::Compressed(_)
            | Backend::Fifo(_)
            | Backend::Pipe(_)
            | Backend::Socket(_)
            | Backend::Url(_)
            | Backend::Text(_) => false,
        }
    }

    /// Move (or, for [`SeekOrigin::Enquire`], report) a position. Returns the
    /// position before the call.
    pub fn seek(&mut self, origin: SeekOrigin, offset: i64, rw: SeekRw) -> ConnResult<u64> {
        let result = match self {
            Backend::File(f) if f.is_seekable() => f.seek(origin, offset, rw),
            Backend::Raw(r) => r.seek(origin, offset),
            Backend::Channel(c) if c.is_seekable() => c.seek(origin, offset),
            _ => return Err(ConnError::SeekNotEnabled),
        };
        result.map_err(ConnError::generic)
    }

    /// Cut a file at its write position.
    pub fn truncate(&mut self) -> ConnResult<()> {
        match self {
            Backend::File(f) => f.truncate().map_err(ConnError::generic),
            other => Err(ConnError::TruncateUnsupportedForConnection(
                other.class().to_string(),
            )),
        }
    }

    /// Whether this variant accepts a non-blocking configuration.
    pub fn supports_non_blocking(&self) -> bool {
        !matches!(self, Backend::Fifo(_) | Backend::Pipe(_))
    }

    pub fn as_socket(&self) -> Option<&SocketBackend> {
        match self {
            Backend::Socket(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backend::{}", self.class())
    }
}

pub(crate) fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is not open")
}
