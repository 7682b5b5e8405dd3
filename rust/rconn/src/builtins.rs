//! Builtin-level entry points.
//!
//! These are the functions a language runtime binds into its base namespace.
//! Every one takes the session's [`ConnectionRegistry`] explicitly.
//! Constructors validate and, for non-lazy modes, open the backend before a
//! handle is allocated, so a failed constructor never leaves a registered
//! connection behind.

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::{
    Backend, ChannelBackend, CompressedBackend, Compression, ExternalChannel, FifoBackend,
    FileBackend, PipeBackend, RawBackend, SocketBackend, TextBackend, UrlBackend,
};
use crate::codec::{BinType, BinVector, ByteOrderCodec};
use crate::connection::{char_payload, Connection, ConnectionSummary, PAD_WARNING};
use crate::encoding::Encoding;
use crate::error::{ConnError, ConnResult};
use crate::mode::{OpenMode, SeekOrigin, SeekRw};
use crate::registry::{ConnectionRegistry, Handle};

// ---------------------------------------------------------------------------
// Argument structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileOptions {
    pub description: String,
    pub open: String,
    pub blocking: bool,
    pub encoding: String,
    pub method: String,
    /// Disables transparent decompression of compressed content.
    pub raw: bool,
}

impl FileOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            open: String::new(),
            blocking: true,
            encoding: "native.enc".into(),
            method: "default".into(),
            raw: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressedOptions {
    pub description: String,
    pub open: String,
    pub encoding: String,
    /// `None` uses the configured default level for the format.
    pub compression: Option<i32>,
}

impl CompressedOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            open: String::new(),
            encoding: "native.enc".into(),
            compression: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub host: String,
    pub port: u16,
    pub server: bool,
    pub blocking: bool,
    pub open: String,
    pub encoding: String,
    /// `None` uses the configured socket timeout.
    pub timeout: Option<Duration>,
}

impl SocketOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            server: false,
            blocking: false,
            open: "a+".into(),
            encoding: "native.enc".into(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UrlOptions {
    pub description: String,
    pub open: String,
    pub blocking: bool,
    pub encoding: String,
    pub method: String,
}

impl UrlOptions {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            open: String::new(),
            blocking: true,
            encoding: "native.enc".into(),
            method: "default".into(),
        }
    }
}

/// Initial content of a raw connection.
#[derive(Debug, Clone, Default)]
pub enum RawObject {
    #[default]
    Null,
    Bytes(Vec<u8>),
    Text(String),
}

/// Where `readBin`/`readChar` take bytes from.
#[derive(Debug, Clone, Copy)]
pub enum BinSource<'a> {
    Connection(Handle),
    Raw(&'a [u8]),
}

/// Where `writeBin`/`writeChar` put bytes. [`BinTarget::Raw`] returns them.
#[derive(Debug, Clone, Copy)]
pub enum BinTarget {
    Connection(Handle),
    Raw,
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn register(
    registry: &ConnectionRegistry,
    description: String,
    backend: Backend,
    mode: OpenMode,
    encoding: Encoding,
    blocking: bool,
) -> ConnResult<Handle> {
    if !blocking && !backend.supports_non_blocking() {
        return Err(ConnError::BlockingRequired(backend.class().to_string()));
    }
    let mut conn = Connection::new(
        description,
        backend,
        mode,
        encoding,
        registry.warnings().clone(),
        registry.config().read_cache_size,
    )
    .with_blocking(blocking);
    if !mode.is_lazy() {
        conn.open(mode.as_str())?;
    }
    registry.allocate(conn)
}

fn check_method(method: &str) -> ConnResult<()> {
    match method {
        "" | "default" | "internal" | "libcurl" => Ok(()),
        _ => Err(ConnError::InvalidArgument("method".into())),
    }
}

fn is_remote_url(description: &str) -> bool {
    ["http://", "https://", "ftp://", "ftps://"]
        .iter()
        .any(|scheme| description.starts_with(scheme))
}

fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            match std::env::var_os("HOME") {
                Some(home) => PathBuf::from(home).join(rest.trim_start_matches('/')),
                None => PathBuf::from(path),
            }
        }
        _ => PathBuf::from(path),
    }
}

/// `file()`. An empty description creates an anonymous temporary file
/// opened `"w+"`; remote URLs are handed to [`url`].
pub fn file(registry: &ConnectionRegistry, opts: FileOptions) -> ConnResult<Handle> {
    let mode = OpenMode::parse(&opts.open)?;
    let encoding = Encoding::lookup(&opts.encoding, registry.native_encoding())?;
    check_method(&opts.method)?;

    if opts.description.is_empty() {
        let backend = FileBackend::anonymous()
            .map_err(|e| ConnError::CannotOpenConnection(e.to_string()))?;
        return register(
            registry,
            String::new(),
            Backend::File(backend),
            OpenMode::READ_WRITE_TRUNC,
            encoding,
            opts.blocking,
        );
    }
    if is_remote_url(&opts.description) {
        return url(
            registry,
            UrlOptions {
                description: opts.description,
                open: opts.open,
                blocking: opts.blocking,
                encoding: opts.encoding,
                method: opts.method,
            },
        );
    }
    let path = expand_path(
        opts.description
            .strip_prefix("file://")
            .unwrap_or(&opts.description),
    );
    let backend = FileBackend::new(path, !opts.raw);
    register(
        registry,
        opts.description,
        Backend::File(backend),
        mode,
        encoding,
        opts.blocking,
    )
}

fn compressed_file(
    registry: &ConnectionRegistry,
    kind: Compression,
    opts: CompressedOptions,
) -> ConnResult<Handle> {
    let mode = OpenMode::parse(&opts.open)?;
    let encoding = Encoding::lookup(&opts.encoding, registry.native_encoding())?;
    let config = registry.config();
    let level = opts.compression.unwrap_or(match kind {
        Compression::Gzip => config.gzip_level as i32,
        Compression::Bzip2 => config.bzip2_level as i32,
        Compression::Xz => config.xz_level,
    });
    if !kind.level_range().contains(&level) {
        return Err(ConnError::InvalidArgument("compress".into()));
    }
    let backend = CompressedBackend::new(expand_path(&opts.description), kind, level);
    register(
        registry,
        opts.description,
        Backend::Compressed(backend),
        mode,
        encoding,
        true,
    )
}

pub fn gzfile(registry: &ConnectionRegistry, opts: CompressedOptions) -> ConnResult<Handle> {
    compressed_file(registry, Compression::Gzip, opts)
}

pub fn bzfile(registry: &ConnectionRegistry, opts: CompressedOptions) -> ConnResult<Handle> {
    compressed_file(registry, Compression::Bzip2, opts)
}

pub fn xzfile(registry: &ConnectionRegistry, opts: CompressedOptions) -> ConnResult<Handle> {
    compressed_file(registry, Compression::Xz, opts)
}

/// `textConnection()`. `"r"` reads `text`; `"w"` collects output; `"a"`
/// collects output after the lines in `text`.
pub fn text_connection(
    registry: &ConnectionRegistry,
    description: &str,
    text: Option<Vec<String>>,
    open: &str,
    encoding: &str,
) -> ConnResult<Handle> {
    let requested = OpenMode::parse(open)?;
    Encoding::lookup(encoding, registry.native_encoding())?;
    let mode = if requested.is_lazy() {
        OpenMode::READ
    } else {
        requested
    };
    let backend = match mode.as_str() {
        "r" => {
            let lines = text.ok_or_else(|| ConnError::InvalidArgument("text".into()))?;
            TextBackend::reader(&lines)
        }
        "w" => TextBackend::writer(Vec::new()),
        "a" => TextBackend::writer(text.unwrap_or_default()),
        other => return Err(ConnError::UnsupportedMode(other.to_string())),
    };
    register(
        registry,
        description.to_string(),
        Backend::Text(backend),
        mode,
        Encoding::Utf8,
        true,
    )
}

/// Lines written so far to a text connection.
pub fn text_connection_value(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<Vec<String>> {
    registry.with_connection(handle, |conn| match conn.backend() {
        Backend::Text(text) => Ok(text.value().to_vec()),
        _ => Err(ConnError::NotATextConnection),
    })
}

pub fn raw_connection(
    registry: &ConnectionRegistry,
    description: &str,
    object: RawObject,
    open: &str,
) -> ConnResult<Handle> {
    let requested = OpenMode::parse(open)?;
    let mode = if requested.is_lazy() {
        OpenMode::READ
    } else {
        requested
    };
    let data = match object {
        RawObject::Null => Vec::new(),
        RawObject::Bytes(bytes) => bytes,
        RawObject::Text(text) => text.into_bytes(),
    };
    register(
        registry,
        description.to_string(),
        Backend::Raw(RawBackend::new(data)),
        mode,
        Encoding::Utf8,
        true,
    )
}

/// The full buffer of a raw connection open for writing.
pub fn raw_connection_value(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<Vec<u8>> {
    registry.with_connection(handle, |conn| {
        let writable = conn.is_open() && conn.can_write();
        match conn.backend() {
            Backend::Raw(raw) if writable => Ok(raw.value().to_vec()),
            Backend::Raw(_) => Err(ConnError::NotARawConnection(
                "an output rawConnection".into(),
            )),
            _ => Err(ConnError::NotARawConnection("a rawConnection".into())),
        }
    })
}

/// `socketConnection()`. A server waits for one client when opened.
pub fn socket_connection(registry: &ConnectionRegistry, opts: SocketOptions) -> ConnResult<Handle> {
    let mode = OpenMode::parse(&opts.open)?;
    let encoding = Encoding::lookup(&opts.encoding, registry.native_encoding())?;
    let timeout = opts
        .timeout
        .unwrap_or_else(|| registry.config().socket_timeout());
    let backend = SocketBackend::new(
        opts.host,
        opts.port,
        opts.server,
        opts.blocking,
        timeout,
    );
    register(
        registry,
        backend.description(),
        Backend::Socket(backend),
        mode,
        encoding,
        opts.blocking,
    )
}

/// `url()`. `file://` URLs become file connections; HTTP(S) bodies are read
/// into memory when the connection opens.
pub fn url(registry: &ConnectionRegistry, opts: UrlOptions) -> ConnResult<Handle> {
    check_method(&opts.method)?;
    if let Some(path) = opts.description.strip_prefix("file://") {
        return file(
            registry,
            FileOptions {
                description: path.to_string(),
                open: opts.open,
                blocking: opts.blocking,
                encoding: opts.encoding,
                method: opts.method,
                raw: false,
            },
        );
    }
    let mode = OpenMode::parse(&opts.open)?;
    let encoding = Encoding::lookup(&opts.encoding, registry.native_encoding())?;
    if !UrlBackend::is_supported_scheme(&opts.description) {
        return Err(ConnError::CannotOpenConnection(format!(
            "unsupported URL scheme in '{}'",
            opts.description
        )));
    }
    let backend = UrlBackend::new(opts.description.clone(), registry.config().url_timeout());
    register(
        registry,
        opts.description,
        Backend::Url(backend),
        mode,
        encoding,
        opts.blocking,
    )
}

/// `fifo()`. Non-blocking fifos are refused before anything is allocated.
pub fn fifo(
    registry: &ConnectionRegistry,
    path: &str,
    open: &str,
    blocking: bool,
    encoding: &str,
) -> ConnResult<Handle> {
    if !blocking {
        return Err(ConnError::BlockingRequired("fifo".into()));
    }
    let mode = OpenMode::parse(open)?;
    let encoding = Encoding::lookup(encoding, registry.native_encoding())?;
    register(
        registry,
        path.to_string(),
        Backend::Fifo(FifoBackend::new(expand_path(path))),
        mode,
        encoding,
        true,
    )
}

/// `pipe()`. The command runs under the configured shell.
pub fn pipe(registry: &ConnectionRegistry, command: &str, open: &str, encoding: &str) -> ConnResult<Handle> {
    let mode = OpenMode::parse(open)?;
    let encoding = Encoding::lookup(encoding, registry.native_encoding())?;
    let backend = PipeBackend::new(command, registry.config().shell.clone());
    register(
        registry,
        command.to_string(),
        Backend::Pipe(backend),
        mode,
        encoding,
        true,
    )
}

/// Wrap a host-supplied byte channel.
pub fn channel_connection(
    registry: &ConnectionRegistry,
    description: &str,
    channel: Box<dyn ExternalChannel>,
    open: &str,
) -> ConnResult<Handle> {
    let mode = OpenMode::parse(open)?;
    register(
        registry,
        description.to_string(),
        Backend::Channel(ChannelBackend::new(channel)),
        mode,
        registry.native_encoding(),
        true,
    )
}

pub fn stdin() -> Handle {
    Handle::STDIN
}

pub fn stdout() -> Handle {
    Handle::STDOUT
}

pub fn stderr() -> Handle {
    Handle::STDERR
}

// ---------------------------------------------------------------------------
// Lifecycle and queries
// ---------------------------------------------------------------------------

pub fn open(registry: &ConnectionRegistry, handle: Handle, mode: &str) -> ConnResult<()> {
    registry.with_connection(handle, |conn| conn.open(mode))
}

pub fn close(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<()> {
    registry.close(handle)
}

/// `rw`: 0 either direction, 1 reading, 2 writing.
pub fn is_open(registry: &ConnectionRegistry, handle: Handle, rw: u8) -> ConnResult<bool> {
    registry.with_connection(handle, |conn| {
        let open = conn.is_open();
        match rw {
            0 => Ok(open),
            1 => Ok(open && conn.can_read()),
            2 => Ok(open && conn.can_write()),
            _ => Err(ConnError::InvalidArgument("rw".into())),
        }
    })
}

pub fn is_seekable(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<bool> {
    registry.with_connection(handle, |conn| Ok(conn.is_seekable()))
}

pub fn is_incomplete(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<bool> {
    registry.with_connection(handle, |conn| Ok(conn.is_incomplete()))
}

pub fn summary(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<ConnectionSummary> {
    registry.with_connection(handle, |conn| Ok(conn.summary()))
}

pub fn get_connection(registry: &ConnectionRegistry, index: i64) -> ConnResult<Handle> {
    registry.handle_for(index)
}

pub fn get_all_connections(registry: &ConnectionRegistry) -> Vec<Handle> {
    registry.all()
}

// ---------------------------------------------------------------------------
// Positioning
// ---------------------------------------------------------------------------

/// `offset = None` only reports the position.
pub fn seek(
    registry: &ConnectionRegistry,
    handle: Handle,
    offset: Option<i64>,
    origin: SeekOrigin,
    rw: SeekRw,
) -> ConnResult<u64> {
    registry.with_connection(handle, |conn| conn.seek(offset, origin, rw))
}

pub fn truncate(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<()> {
    registry.with_connection(handle, |conn| conn.truncate())
}

pub fn flush(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<()> {
    registry.with_connection(handle, |conn| conn.flush())
}

// ---------------------------------------------------------------------------
// Text I/O
// ---------------------------------------------------------------------------

/// `readLines()`. With `n > 0` and `ok = false`, a short read fails.
pub fn read_lines(
    registry: &ConnectionRegistry,
    handle: Handle,
    n: i64,
    ok: bool,
    warn: bool,
    skip_nul: bool,
) -> ConnResult<Vec<String>> {
    let lines = registry.with_connection(handle, |conn| {
        let mut guard = conn.force_open(OpenMode::READ_TEXT)?;
        let lines = guard.read_lines(n, warn, skip_nul)?;
        guard.release()?;
        Ok(lines)
    })?;
    if n > 0 && (lines.len() as i64) < n && !ok {
        return Err(ConnError::TooFewLinesRead);
    }
    Ok(lines)
}

pub fn write_lines(
    registry: &ConnectionRegistry,
    handle: Handle,
    lines: &[String],
    sep: &str,
    use_bytes: bool,
) -> ConnResult<()> {
    registry.with_connection(handle, |conn| {
        let mut guard = conn.force_open(OpenMode::WRITE_TEXT)?;
        guard.write_lines(lines, sep, use_bytes)?;
        guard.release()
    })
}

pub fn push_back(
    registry: &ConnectionRegistry,
    handle: Handle,
    lines: &[String],
    newline: bool,
) -> ConnResult<()> {
    registry.with_connection(handle, |conn| conn.push_back(lines, newline))
}

pub fn push_back_length(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<usize> {
    registry.with_connection(handle, |conn| Ok(conn.push_back_length()))
}

pub fn clear_push_back(registry: &ConnectionRegistry, handle: Handle) -> ConnResult<()> {
    registry.with_connection(handle, |conn| {
        conn.clear_push_back();
        Ok(())
    })
}

/// `readChar()`. An empty `nchars` returns nothing without touching the
/// source.
pub fn read_char(
    registry: &ConnectionRegistry,
    source: BinSource<'_>,
    nchars: &[usize],
    use_bytes: bool,
) -> ConnResult<Vec<String>> {
    if nchars.is_empty() {
        return Ok(Vec::new());
    }
    match source {
        BinSource::Raw(bytes) => Ok(chars_from_slice(bytes, nchars)),
        BinSource::Connection(handle) => registry.with_connection(handle, |conn| {
            let mut guard = conn.force_open(OpenMode::READ_BINARY)?;
            let strings = guard.read_chars(nchars, use_bytes)?;
            guard.release()?;
            Ok(strings)
        }),
    }
}

fn chars_from_slice(bytes: &[u8], nchars: &[usize]) -> Vec<String> {
    let mut out = Vec::with_capacity(nchars.len());
    let mut pos = 0;
    for &n in nchars {
        let end = (pos + n).min(bytes.len());
        if end == pos && n > 0 {
            break;
        }
        let chunk = &bytes[pos..end];
        let chunk = chunk.split(|&b| b == 0).next().unwrap_or(chunk);
        out.push(String::from_utf8_lossy(chunk).into_owned());
        pos = end;
    }
    out
}

/// `writeChar()`. Returns the bytes when targeting a raw vector.
pub fn write_char(
    registry: &ConnectionRegistry,
    target: BinTarget,
    strings: &[String],
    nchars: Option<&[usize]>,
    eos: Option<&[String]>,
    use_bytes: bool,
) -> ConnResult<Option<Vec<u8>>> {
    match target {
        BinTarget::Raw => {
            let payload = char_payload(strings, nchars, eos, registry.native_encoding(), use_bytes)?;
            if payload.padded {
                registry.warnings().push(PAD_WARNING);
            }
            Ok(Some(payload.bytes))
        }
        BinTarget::Connection(handle) => registry.with_connection(handle, |conn| {
            let mut guard = conn.force_open(OpenMode::WRITE_BINARY)?;
            guard.write_chars(strings, nchars, eos, use_bytes)?;
            guard.release()?;
            Ok(None)
        }),
    }
}

// ---------------------------------------------------------------------------
// Binary I/O
// ---------------------------------------------------------------------------

/// `readBin()` from a connection or an in-memory byte vector.
pub fn read_bin(
    registry: &ConnectionRegistry,
    source: BinSource<'_>,
    what: BinType,
    n: usize,
    size: Option<usize>,
    signed: bool,
    swap: bool,
) -> ConnResult<BinVector> {
    let codec = ByteOrderCodec::new(swap);
    match source {
        BinSource::Raw(bytes) => codec.decode(bytes, what, size, signed, n),
        BinSource::Connection(handle) => registry.with_connection(handle, |conn| {
            let mut guard = conn.force_open(OpenMode::READ_BINARY)?;
            let values = guard.read_bin(what, n, size, signed, codec)?;
            guard.release()?;
            Ok(values)
        }),
    }
}

/// `writeBin()`. Returns the encoded bytes when targeting a raw vector.
pub fn write_bin(
    registry: &ConnectionRegistry,
    target: BinTarget,
    values: &BinVector,
    size: Option<usize>,
    swap: bool,
) -> ConnResult<Option<Vec<u8>>> {
    let codec = ByteOrderCodec::new(swap);
    match target {
        BinTarget::Raw => codec.encode(values, size).map(Some),
        BinTarget::Connection(handle) => registry.with_connection(handle, |conn| {
            let mut guard = conn.force_open(OpenMode::WRITE_BINARY)?;
            guard.write_bin(values, size, codec)?;
            guard.release()?;
            Ok(None)
        }),
    }
}

// ---------------------------------------------------------------------------
// Socket readiness
// ---------------------------------------------------------------------------

/// `socketSelect()`. `write` is recycled over `handles`. A `timeout` of
/// `None` or a negative number of seconds waits indefinitely.
pub fn sock_select(
    registry: &ConnectionRegistry,
    handles: &[Handle],
    write: &[bool],
    timeout: Option<f64>,
) -> ConnResult<Vec<bool>> {
    let for_write = |i: usize| match write.len() {
        0 => false,
        len => write[i % len],
    };
    let mut ready = vec![false; handles.len()];
    let mut pending = Vec::new();
    for (i, &handle) in handles.iter().enumerate() {
        let conn = registry.get(handle)?;
        let conn = conn.lock();
        let socket = conn
            .backend()
            .as_socket()
            .ok_or(ConnError::NotASocketConnection)?;
        if !for_write(i) && conn.has_buffered_input() {
            ready[i] = true;
            continue;
        }
        pending.push((i, socket_fd(socket)?, for_write(i)));
    }
    if pending.is_empty() {
        return Ok(ready);
    }

    let wait = if ready.iter().any(|&r| r) {
        Some(Duration::ZERO)
    } else {
        timeout.and_then(select_timeout)
    };
    let polled = poll_sockets(&pending, wait)?;
    for (&(i, _, _), is_ready) in pending.iter().zip(polled) {
        ready[i] = is_ready;
    }
    Ok(ready)
}

/// Negative, infinite and NaN timeouts wait indefinitely.
fn select_timeout(secs: f64) -> Option<Duration> {
    if secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(unix)]
type SocketFd = std::os::fd::RawFd;
#[cfg(not(unix))]
type SocketFd = ();

#[cfg(unix)]
fn socket_fd(socket: &SocketBackend) -> ConnResult<SocketFd> {
    socket.raw_fd().ok_or(ConnError::NotOpen)
}

#[cfg(not(unix))]
fn socket_fd(_socket: &SocketBackend) -> ConnResult<SocketFd> {
    Err(ConnError::Generic(
        "socketSelect is not supported on this platform".into(),
    ))
}

#[cfg(unix)]
fn poll_sockets(pending: &[(usize, SocketFd, bool)], wait: Option<Duration>) -> ConnResult<Vec<bool>> {
    let fds: Vec<_> = pending.iter().map(|&(_, fd, w)| (fd, w)).collect();
    crate::backend::socket::poll_ready(&fds, wait).map_err(ConnError::generic)
}

#[cfg(not(unix))]
fn poll_sockets(_pending: &[(usize, SocketFd, bool)], _wait: Option<Duration>) -> ConnResult<Vec<bool>> {
    Err(ConnError::Generic(
        "socketSelect is not supported on this platform".into(),
    ))
}
