//! The connection: one backend plus the state every backend shares.
//!
//! A [`Connection`] owns its backend, its mode, a push-back buffer and a read
//! cache. Line, character and binary readers all consume bytes through the
//! same cache, so mixing `readLines` and `readBin` on one connection sees a
//! single consistent stream.
//!
//! Lifecycle:
//!
//! ```text
//! Unopened --open(mode)--> Open(mode) --close()--> Destroyed
//! Open(mode) --open(mode')--> Open(mode')          (warns "already open")
//! Open(mode) --guard drop--> Unopened              (only if the guard opened it)
//! ```

use std::ops::{Deref, DerefMut};

use serde::Serialize;

use crate::backend::{Backend, ConnectionClass, StdStream, TerminalBackend};
use crate::codec::{BinType, BinVector, ByteOrderCodec};
use crate::encoding::Encoding;
use crate::error::{ConnError, ConnResult};
use crate::mode::{OpenMode, SeekOrigin, SeekRw};
use crate::pushback::{PushBackBuffer, PushedLine};
use crate::registry::Handle;
use crate::warnings::WarningLog;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Unopened,
    Open(OpenMode),
    /// Explicitly closed. Terminal.
    Destroyed,
}

/// Bytes read from the backend but not yet consumed.
#[derive(Debug)]
struct ReadCache {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl ReadCache {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            start: 0,
            end: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.end - self.start
    }

    fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

/// The tuple reported by `summary(con)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub description: String,
    pub class: String,
    pub mode: String,
    pub text: String,
    pub opened: String,
    #[serde(rename = "can read")]
    pub can_read: String,
    #[serde(rename = "can write")]
    pub can_write: String,
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Connection {
    handle: Option<Handle>,
    description: String,
    backend: Backend,
    declared: OpenMode,
    state: ConnState,
    encoding: Encoding,
    push_back: PushBackBuffer,
    blocking: bool,
    incomplete: bool,
    cache: ReadCache,
    warnings: WarningLog,
}

impl Connection {
    /// An unopened connection. `declared` is the mode given at construction;
    /// a lazy mode defers the choice to the first operation.
    pub fn new(
        description: impl Into<String>,
        backend: Backend,
        declared: OpenMode,
        encoding: Encoding,
        warnings: WarningLog,
        cache_size: usize,
    ) -> Self {
        Self {
            handle: None,
            description: description.into(),
            backend,
            declared,
            state: ConnState::Unopened,
            encoding,
            push_back: PushBackBuffer::new(),
            blocking: true,
            incomplete: false,
            cache: ReadCache::new(cache_size),
            warnings,
        }
    }

    pub(crate) fn standard(stream: StdStream, warnings: WarningLog, cache_size: usize) -> Self {
        let mode = if stream == StdStream::Stdin {
            OpenMode::READ
        } else {
            OpenMode::WRITE
        };
        let mut conn = Self::new(
            stream.name(),
            Backend::Terminal(TerminalBackend::new(stream)),
            mode,
            Encoding::Utf8,
            warnings,
            cache_size,
        );
        conn.state = ConnState::Open(mode);
        conn
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub(crate) fn set_handle(&mut self, handle: Handle) {
        self.handle = Some(handle);
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn class(&self) -> ConnectionClass {
        self.backend.class()
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnState::Open(_))
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == ConnState::Destroyed
    }

    pub fn is_seekable(&self) -> bool {
        self.backend.is_seekable()
    }

    /// Unopened connections report `true`.
    pub fn can_read(&self) -> bool {
        match self.state {
            ConnState::Open(mode) => mode.can_read(),
            _ => true,
        }
    }

    pub fn can_write(&self) -> bool {
        match self.state {
            ConnState::Open(mode) => mode.can_write(),
            _ => true,
        }
    }

    /// The mode in effect, or the declared one while unopened.
    pub fn mode(&self) -> OpenMode {
        match self.state {
            ConnState::Open(mode) => mode,
            _ => self.declared,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut Backend {
        &mut self.backend
    }

    fn ensure_live(&self) -> ConnResult<()> {
        if self.is_destroyed() {
            Err(ConnError::InvalidConnection)
        } else {
            Ok(())
        }
    }

    fn open_mode(&self) -> ConnResult<OpenMode> {
        match self.state {
            ConnState::Open(mode) => Ok(mode),
            ConnState::Unopened => Err(ConnError::NotOpen),
            ConnState::Destroyed => Err(ConnError::InvalidConnection),
        }
    }

    fn ensure_readable(&self) -> ConnResult<OpenMode> {
        let mode = self.open_mode()?;
        if mode.can_read() {
            Ok(mode)
        } else {
            Err(ConnError::CannotReadConnection)
        }
    }

    fn ensure_writable(&self) -> ConnResult<OpenMode> {
        let mode = self.open_mode()?;
        if mode.can_write() {
            Ok(mode)
        } else {
            Err(ConnError::CannotWriteConnection)
        }
    }

    fn warn(&self, message: String) {
        self.warnings.push(message);
    }

    // -- Lifecycle ----------------------------------------------------------

    fn fallback_mode(&self) -> OpenMode {
        if self.declared.is_lazy() {
            OpenMode::READ
        } else {
            self.declared
        }
    }

    /// Open in `mode` (`""` reuses the declared mode). An open connection is
    /// closed and re-opened with a warning.
    pub fn open(&mut self, mode: &str) -> ConnResult<()> {
        self.ensure_live()?;
        let requested = OpenMode::parse(mode)?;
        let mode = if requested.is_lazy() {
            self.fallback_mode()
        } else {
            requested
        };
        if self.is_open() {
            self.warn("connection is already open".to_string());
            if let Err(e) = self.close_backend() {
                tracing::warn!(description = %self.description, error = %e, "close before reopen failed");
            }
        }
        self.open_backend(mode)?;
        self.declared = mode;
        Ok(())
    }

    fn open_backend(&mut self, mode: OpenMode) -> ConnResult<()> {
        self.backend.open(mode)?;
        self.state = ConnState::Open(mode);
        self.cache.clear();
        self.incomplete = false;
        tracing::debug!(handle = ?self.handle, description = %self.description, %mode, "connection opened");
        Ok(())
    }

    /// Open with `default` unless already open. The returned guard closes the
    /// connection again when dropped, but only if this call opened it.
    pub fn force_open(&mut self, default: OpenMode) -> ConnResult<OpenGuard<'_>> {
        self.ensure_live()?;
        if self.is_open() {
            return Ok(OpenGuard {
                conn: self,
                opened_here: false,
            });
        }
        let mode = if self.declared.is_lazy() {
            default
        } else {
            self.declared
        };
        self.open_backend(mode)?;
        Ok(OpenGuard {
            conn: self,
            opened_here: true,
        })
    }

    /// Release the backend but keep the connection usable.
    pub(crate) fn close_backend(&mut self) -> ConnResult<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.state = ConnState::Unopened;
        self.cache.clear();
        let flushed = self.backend.flush();
        let closed = self.backend.close();
        flushed.and(closed).map_err(ConnError::generic)
    }

    /// Flush, release the backend and mark the connection dead. The
    /// connection is destroyed even when the close fails.
    pub fn destroy(&mut self) -> ConnResult<()> {
        self.ensure_live()?;
        let result = self.close_backend();
        self.state = ConnState::Destroyed;
        self.push_back.clear();
        tracing::debug!(handle = ?self.handle, description = %self.description, "connection destroyed");
        result
    }

    // -- Read cache ---------------------------------------------------------

    fn fill_cache(&mut self) -> ConnResult<bool> {
        if self.cache.remaining() > 0 {
            return Ok(true);
        }
        let n = self
            .backend
            .read(&mut self.cache.buf)
            .map_err(ConnError::reading)?;
        self.cache.start = 0;
        self.cache.end = n;
        Ok(n > 0)
    }

    fn next_byte(&mut self) -> ConnResult<Option<u8>> {
        if !self.fill_cache()? {
            return Ok(None);
        }
        let b = self.cache.buf[self.cache.start];
        self.cache.start += 1;
        Ok(Some(b))
    }

    fn peek_byte(&mut self) -> ConnResult<Option<u8>> {
        if !self.fill_cache()? {
            return Ok(None);
        }
        Ok(Some(self.cache.buf[self.cache.start]))
    }

    /// Up to `n` bytes; fewer only at end of input.
    fn read_bytes(&mut self, n: usize) -> ConnResult<Vec<u8>> {
        let mut out = Vec::with_capacity(n.min(self.cache.buf.len()));
        while out.len() < n && self.fill_cache()? {
            let take = (n - out.len()).min(self.cache.remaining());
            let start = self.cache.start;
            out.extend_from_slice(&self.cache.buf[start..start + take]);
            self.cache.start += take;
        }
        Ok(out)
    }

    /// Hand cached bytes back to a seekable backend so its position matches
    /// what the caller has consumed.
    fn discard_read_cache(&mut self) -> ConnResult<()> {
        if !self.backend.is_seekable() {
            return Ok(());
        }
        let rem = self.cache.remaining();
        if rem > 0 {
            let back = i64::try_from(rem).map_err(|_| ConnError::Generic("read cache too large".into()))?;
            self.backend.seek(SeekOrigin::Current, -back, SeekRw::Read)?;
        }
        self.cache.clear();
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> ConnResult<()> {
        self.ensure_writable()?;
        self.discard_read_cache()?;
        self.backend.write_all(bytes).map_err(ConnError::writing)
    }

    // -- Lines --------------------------------------------------------------

    /// Read up to `n` lines (`n < 0` reads to the end). Push-back is drained
    /// first.
    pub fn read_lines(&mut self, n: i64, warn: bool, skip_nul: bool) -> ConnResult<Vec<String>> {
        let mode = self.ensure_readable()?;
        let limit = usize::try_from(n).ok();
        let wants_more = |got: usize| limit.map_or(true, |l| got < l);
        let mut lines = Vec::new();
        if limit == Some(0) {
            return Ok(lines);
        }

        let mut carry = None;
        while wants_more(lines.len()) {
            match self.push_back.next_line() {
                Some(PushedLine::Complete(line)) => lines.push(line),
                Some(PushedLine::Partial(prefix)) => {
                    carry = Some(prefix);
                    break;
                }
                None => break,
            }
        }

        self.incomplete = false;
        while wants_more(lines.len()) {
            let (bytes, terminated) = match self.read_backend_line(skip_nul)? {
                Some(read) => read,
                None if carry.is_some() => (Vec::new(), false),
                None => break,
            };
            let mut line = carry.take().unwrap_or_default();
            line.push_str(&self.decode_line(bytes, lines.len() + 1, skip_nul));
            if !terminated {
                if !self.blocking && mode.is_text() {
                    self.push_back.push(&[line], false);
                    self.incomplete = true;
                } else {
                    if warn {
                        self.warn(format!(
                            "incomplete final line found on '{}'",
                            self.description
                        ));
                    }
                    lines.push(line);
                }
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    /// One line of raw bytes and whether it ended with a terminator. `None`
    /// at end of input.
    fn read_backend_line(&mut self, skip_nul: bool) -> ConnResult<Option<(Vec<u8>, bool)>> {
        let mut bytes = Vec::new();
        loop {
            match self.next_byte()? {
                None if bytes.is_empty() => return Ok(None),
                None => return Ok(Some((bytes, false))),
                Some(b'\n') => return Ok(Some((bytes, true))),
                Some(b'\r') => {
                    if self.peek_byte()? == Some(b'\n') {
                        self.cache.start += 1;
                    }
                    return Ok(Some((bytes, true)));
                }
                Some(0) if skip_nul => {}
                Some(b) => bytes.push(b),
            }
        }
    }

    fn decode_line(&self, mut bytes: Vec<u8>, line_no: usize, skip_nul: bool) -> String {
        if !skip_nul {
            if let Some(nul) = bytes.iter().position(|&b| b == 0) {
                self.warn(format!(
                    "line {line_no} appears to contain an embedded nul"
                ));
                bytes.truncate(nul);
            }
        }
        self.encoding.decode(&bytes)
    }

    /// Write each line followed by `sep`. With `use_bytes` the UTF-8 bytes
    /// are written without re-encoding.
    pub fn write_lines(&mut self, lines: &[String], sep: &str, use_bytes: bool) -> ConnResult<()> {
        self.ensure_writable()?;
        let encode = |s: &str| {
            if use_bytes {
                s.as_bytes().to_vec()
            } else {
                self.encoding.encode(s)
            }
        };
        let sep_bytes = encode(sep);
        let mut out = Vec::new();
        for line in lines {
            out.extend(encode(line));
            out.extend_from_slice(&sep_bytes);
        }
        self.write_bytes(&out)
    }

    // -- Push-back ----------------------------------------------------------

    pub fn push_back(&mut self, lines: &[String], newline: bool) -> ConnResult<()> {
        self.ensure_live()?;
        if !self.is_open() || !self.can_read() {
            return Err(ConnError::Generic(
                "can only push back on open readable connections".into(),
            ));
        }
        self.push_back.push(lines, newline);
        Ok(())
    }

    pub fn push_back_length(&self) -> usize {
        self.push_back.len()
    }

    pub fn clear_push_back(&mut self) {
        self.push_back.clear();
    }

    // -- Characters ---------------------------------------------------------

    /// Read `nchars[i]` bytes per element, cutting each at its first NUL.
    /// Stops early at end of input.
    pub fn read_chars(&mut self, nchars: &[usize], use_bytes: bool) -> ConnResult<Vec<String>> {
        self.ensure_readable()?;
        let mut pending = self.push_back.drain_bytes();
        let mut out = Vec::with_capacity(nchars.len());
        for &n in nchars {
            let from_pending = n.min(pending.len());
            let mut bytes: Vec<u8> = pending.drain(..from_pending).collect();
            if bytes.len() < n {
                bytes.extend(self.read_bytes(n - bytes.len())?);
            }
            if bytes.is_empty() && n > 0 {
                break;
            }
            if let Some(nul) = bytes.iter().position(|&b| b == 0) {
                bytes.truncate(nul);
            }
            out.push(if use_bytes {
                String::from_utf8_lossy(&bytes).into_owned()
            } else {
                self.encoding.decode(&bytes)
            });
        }
        self.push_back.push_bytes(pending);
        Ok(out)
    }

    pub fn write_chars(
        &mut self,
        strings: &[String],
        nchars: Option<&[usize]>,
        eos: Option<&[String]>,
        use_bytes: bool,
    ) -> ConnResult<()> {
        self.ensure_writable()?;
        let payload = char_payload(strings, nchars, eos, self.encoding, use_bytes)?;
        if payload.padded {
            self.warn(PAD_WARNING.to_string());
        }
        self.write_bytes(&payload.bytes)
    }

    // -- Binary -------------------------------------------------------------

    pub fn read_bin(
        &mut self,
        what: BinType,
        n: usize,
        size: Option<usize>,
        signed: bool,
        codec: ByteOrderCodec,
    ) -> ConnResult<BinVector> {
        if self.ensure_readable()?.is_text() {
            return Err(ConnError::OnlyReadBinaryConnection);
        }
        if what == BinType::Character {
            let mut strings = Vec::new();
            while strings.len() < n {
                let mut bytes = Vec::new();
                let mut terminated = false;
                while let Some(b) = self.next_byte()? {
                    if b == 0 {
                        terminated = true;
                        break;
                    }
                    bytes.push(b);
                }
                if bytes.is_empty() && !terminated {
                    break;
                }
                strings.push(String::from_utf8_lossy(&bytes).into_owned());
            }
            return Ok(BinVector::Character(strings));
        }
        let width = what.element_size(size)?;
        let bytes = self.read_bytes(n.saturating_mul(width))?;
        codec.decode(&bytes, what, size, signed, n)
    }

    pub fn write_bin(
        &mut self,
        values: &BinVector,
        size: Option<usize>,
        codec: ByteOrderCodec,
    ) -> ConnResult<()> {
        if self.ensure_writable()?.is_text() {
            return Err(ConnError::OnlyWriteBinaryConnection);
        }
        let bytes = codec.encode(values, size)?;
        self.write_bytes(&bytes)
    }

    // -- Positioning --------------------------------------------------------

    /// Seek and return the previous position. `offset = None` only reports
    /// the position. Any real move drops push-back and cached input.
    pub fn seek(&mut self, offset: Option<i64>, origin: SeekOrigin, rw: SeekRw) -> ConnResult<u64> {
        self.ensure_live()?;
        if !self.backend.is_seekable() {
            return Err(ConnError::SeekNotEnabled);
        }
        self.open_mode()?;
        let Some(offset) = offset.filter(|_| origin != SeekOrigin::Enquire) else {
            let pos = self.backend.seek(SeekOrigin::Enquire, 0, rw)?;
            let buffered = if rw == SeekRw::Write {
                0
            } else {
                self.cache.remaining() as u64
            };
            return Ok(pos.saturating_sub(buffered));
        };
        self.push_back.clear();
        self.discard_read_cache()?;
        self.backend.seek(origin, offset, rw)
    }

    /// Cut a file connection at its write position.
    pub fn truncate(&mut self) -> ConnResult<()> {
        self.ensure_live()?;
        if !matches!(self.backend, Backend::File(_)) {
            return Err(ConnError::TruncateUnsupportedForConnection(
                self.class().to_string(),
            ));
        }
        if !self.is_open() || !self.can_write() {
            return Err(ConnError::Generic(
                "can only truncate connections open for writing".into(),
            ));
        }
        self.discard_read_cache()?;
        self.backend.truncate()
    }

    pub fn flush(&mut self) -> ConnResult<()> {
        self.ensure_live()?;
        if self.is_open() && self.can_write() {
            self.backend.flush().map_err(ConnError::flushing)?;
        }
        Ok(())
    }

    /// True when cached input is waiting; `sockSelect` treats such sockets as
    /// readable without polling.
    pub fn has_buffered_input(&self) -> bool {
        self.cache.remaining() > 0 || !self.push_back.is_empty()
    }

    pub fn summary(&self) -> ConnectionSummary {
        let mode = self.mode();
        let shown = if mode.is_lazy() { OpenMode::READ } else { mode };
        let text = if self.class() == ConnectionClass::Raw || shown.is_binary() {
            "binary"
        } else {
            "text"
        };
        ConnectionSummary {
            description: self.description.clone(),
            class: self.class().to_string(),
            mode: shown.to_string(),
            text: text.to_string(),
            opened: if self.is_open() { "opened" } else { "closed" }.to_string(),
            can_read: yes_no(self.can_read()),
            can_write: yes_no(self.can_write()),
        }
    }
}

// ---------------------------------------------------------------------------
// Character payloads
// ---------------------------------------------------------------------------

pub(crate) const PAD_WARNING: &str =
    "writeChar: more characters requested than are in the string - will zero-pad";

pub(crate) struct CharPayload {
    pub bytes: Vec<u8>,
    pub padded: bool,
}

/// Bytes written by `writeChar`: each string cut or NUL-padded to
/// `nchars[i]` characters, then `eos[i]` and a NUL when a terminator is given.
pub(crate) fn char_payload(
    strings: &[String],
    nchars: Option<&[usize]>,
    eos: Option<&[String]>,
    encoding: Encoding,
    use_bytes: bool,
) -> ConnResult<CharPayload> {
    if nchars.is_some_and(|n| n.len() < strings.len()) {
        return Err(ConnError::InvalidArgument("nchars".into()));
    }
    let encode = |s: &str| {
        if use_bytes {
            s.as_bytes().to_vec()
        } else {
            encoding.encode(s)
        }
    };
    let terminators = eos.filter(|t| !t.is_empty());
    let mut bytes = Vec::new();
    let mut padded = false;
    for (i, s) in strings.iter().enumerate() {
        let have = s.chars().count();
        let want = nchars.map_or(have, |n| n[i]);
        let kept: String = s.chars().take(want).collect();
        bytes.extend(encode(&kept));
        if want > have {
            padded = true;
            bytes.resize(bytes.len() + (want - have), 0);
        }
        if let Some(terms) = terminators {
            bytes.extend(encode(&terms[i % terms.len()]));
            bytes.push(0);
        }
    }
    Ok(CharPayload { bytes, padded })
}

// ---------------------------------------------------------------------------
// OpenGuard
// ---------------------------------------------------------------------------

/// Scoped access from [`Connection::force_open`].
///
/// Closes the connection on drop if and only if `force_open` opened it. Use
/// [`OpenGuard::release`] on the success path to see the close error; on
/// error paths the drop closes quietly and only logs.
pub struct OpenGuard<'a> {
    conn: &'a mut Connection,
    opened_here: bool,
}

impl OpenGuard<'_> {
    pub fn opened_here(&self) -> bool {
        self.opened_here
    }

    pub fn release(mut self) -> ConnResult<()> {
        if self.opened_here {
            self.opened_here = false;
            self.conn.close_backend()
        } else {
            Ok(())
        }
    }
}

impl Deref for OpenGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl DerefMut for OpenGuard<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
    }
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        if self.opened_here {
            if let Err(e) = self.conn.close_backend() {
                tracing::warn!(description = %self.conn.description, error = %e, "close after failed operation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RawBackend, TextBackend};

    fn text_conn(lines: &[&str]) -> Connection {
        let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        let mut conn = Connection::new(
            "text",
            Backend::Text(TextBackend::reader(&lines)),
            OpenMode::READ,
            Encoding::Utf8,
            WarningLog::new(),
            8,
        );
        conn.open("r").unwrap();
        conn
    }

    fn raw_conn(data: &[u8], mode: &str) -> Connection {
        let mut conn = Connection::new(
            "raw",
            Backend::Raw(RawBackend::new(data.to_vec())),
            OpenMode::LAZY,
            Encoding::Utf8,
            WarningLog::new(),
            4,
        );
        conn.open(mode).unwrap();
        conn
    }

    // -- Line splitting -----------------------------------------------------

    #[test]
    fn cr_lf_and_lone_cr_terminate_lines() {
        let mut conn = raw_conn(b"a\r\nb\rc\nd", "r");
        let lines = conn.read_lines(-1, false, false).unwrap();
        assert_eq!(lines, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn lines_span_cache_refills() {
        // Cache of 4 bytes forces several refills per line.
        let mut conn = raw_conn(b"abcdefghij\nklm\n", "r");
        assert_eq!(conn.read_lines(1, true, false).unwrap(), vec!["abcdefghij"]);
        assert_eq!(conn.read_lines(1, true, false).unwrap(), vec!["klm"]);
        assert!(conn.read_lines(1, true, false).unwrap().is_empty());
    }

    #[test]
    fn incomplete_final_line_warns() {
        let mut conn = raw_conn(b"x\ny", "r");
        let lines = conn.read_lines(-1, true, false).unwrap();
        assert_eq!(lines, vec!["x", "y"]);
        assert_eq!(
            conn.warnings.take(),
            vec!["incomplete final line found on 'raw'".to_string()]
        );
    }

    #[test]
    fn non_blocking_text_pushes_back_partial_line() {
        let mut conn = raw_conn(b"x\npart", "r").with_blocking(false);
        assert_eq!(conn.read_lines(-1, true, false).unwrap(), vec!["x"]);
        assert!(conn.is_incomplete());
        assert_eq!(conn.push_back_length(), 1);
        assert!(conn.warnings.is_empty());
    }

    #[test]
    fn embedded_nul_truncates_or_skips() {
        let mut conn = raw_conn(b"ab\0cd\n", "r");
        assert_eq!(conn.read_lines(1, true, false).unwrap(), vec!["ab"]);
        assert_eq!(conn.warnings.len(), 1);

        let mut conn = raw_conn(b"ab\0cd\n", "r");
        assert_eq!(conn.read_lines(1, true, true).unwrap(), vec!["abcd"]);
        assert!(conn.warnings.is_empty());
    }

    // -- Push-back ----------------------------------------------------------

    #[test]
    fn push_back_precedes_backend_data() {
        let mut conn = text_conn(&["backend"]);
        conn.push_back(&["a".into(), "b".into()], true).unwrap();
        assert_eq!(conn.read_lines(1, true, false).unwrap(), vec!["b"]);
        assert_eq!(conn.read_lines(1, true, false).unwrap(), vec!["a"]);
        assert_eq!(conn.read_lines(1, true, false).unwrap(), vec!["backend"]);
    }

    #[test]
    fn partial_push_back_joins_backend_line() {
        let mut conn = text_conn(&["tail"]);
        conn.push_back(&["head-".into()], false).unwrap();
        assert_eq!(conn.read_lines(-1, true, false).unwrap(), vec!["head-tail"]);
    }

    #[test]
    fn push_back_requires_readable_connection() {
        let mut conn = raw_conn(b"", "w");
        assert!(conn.push_back(&["x".into()], true).is_err());
    }

    // -- Guards -------------------------------------------------------------

    #[test]
    fn guard_closes_only_what_it_opened() {
        let mut conn = Connection::new(
            "raw",
            Backend::Raw(RawBackend::new(b"q\n".to_vec())),
            OpenMode::LAZY,
            Encoding::Utf8,
            WarningLog::new(),
            16,
        );
        {
            let mut guard = conn.force_open(OpenMode::READ_TEXT).unwrap();
            assert!(guard.opened_here());
            assert_eq!(guard.read_lines(1, true, false).unwrap(), vec!["q"]);
        }
        assert_eq!(conn.state(), ConnState::Unopened);

        conn.open("r").unwrap();
        let guard = conn.force_open(OpenMode::READ_TEXT).unwrap();
        assert!(!guard.opened_here());
        guard.release().unwrap();
        assert!(conn.is_open());
    }

    #[test]
    fn destroyed_connection_is_invalid() {
        let mut conn = text_conn(&["x"]);
        conn.destroy().unwrap();
        assert!(matches!(conn.open("r"), Err(ConnError::InvalidConnection)));
        assert!(matches!(
            conn.read_lines(1, true, false),
            Err(ConnError::InvalidConnection)
        ));
        assert!(conn.force_open(OpenMode::READ).is_err());
    }

    #[test]
    fn reopen_warns() {
        let mut conn = text_conn(&["x"]);
        conn.open("r").unwrap();
        assert_eq!(conn.warnings.take(), vec!["connection is already open".to_string()]);
    }

    // -- Char payloads ------------------------------------------------------

    #[test]
    fn char_payload_pads_and_terminates() {
        let p = char_payload(
            &["abc".into(), "de".into()],
            Some(&[2, 4]),
            Some(&["|".into()]),
            Encoding::Utf8,
            false,
        )
        .unwrap();
        assert_eq!(p.bytes, b"ab|\0de\0\0|\0".to_vec());
        assert!(p.padded);
    }

    #[test]
    fn char_payload_without_terminator() {
        let p = char_payload(&["xy".into()], None, None, Encoding::Utf8, true).unwrap();
        assert_eq!(p.bytes, b"xy".to_vec());
        assert!(!p.padded);
        assert!(char_payload(&["a".into(), "b".into()], Some(&[1]), None, Encoding::Utf8, false).is_err());
    }

    // -- Summary ------------------------------------------------------------

    #[test]
    fn summary_of_unopened_raw_connection() {
        let conn = Connection::new(
            "bytes",
            Backend::Raw(RawBackend::default()),
            OpenMode::LAZY,
            Encoding::Utf8,
            WarningLog::new(),
            16,
        );
        let s = conn.summary();
        assert_eq!(s.class, "rawConnection");
        assert_eq!(s.mode, "r");
        assert_eq!(s.text, "binary");
        assert_eq!(s.opened, "closed");
        assert_eq!(s.can_read, "yes");
        assert_eq!(s.can_write, "yes");
    }
}
