//! Plain file connections.
//!
//! A file opened for both reading and writing keeps two positions. Each
//! operation restores its own position before touching the descriptor, so
//! writes never disturb where the next read starts and vice versa.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::compressed::{decoder, sniff};
use super::not_open;
use crate::error::{ConnError, ConnResult};
use crate::mode::{OpenMode, SeekOrigin, SeekRw};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastOp {
    Read,
    Write,
}

enum FileStream {
    Plain(File),
    Decoded(Box<dyn Read + Send>),
}

struct FileState {
    stream: FileStream,
    read_pos: u64,
    write_pos: u64,
    last: LastOp,
    appending: bool,
}

pub struct FileBackend {
    path: PathBuf,
    // Keeps an anonymous file alive; deleted when the backend is dropped.
    temp: Option<NamedTempFile>,
    detect_compression: bool,
    state: Option<FileState>,
}

impl FileBackend {
    /// With `detect_compression`, text reads of gzip/bzip2/xz content are
    /// decompressed transparently.
    pub fn new(path: impl Into<PathBuf>, detect_compression: bool) -> Self {
        Self {
            path: path.into(),
            temp: None,
            detect_compression,
            state: None,
        }
    }

    /// A fresh temporary file, removed when the connection goes away.
    pub fn anonymous() -> io::Result<Self> {
        let temp = NamedTempFile::new()?;
        Ok(Self {
            path: temp.path().to_path_buf(),
            temp: Some(temp),
            detect_compression: false,
            state: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_anonymous(&self) -> bool {
        self.temp.is_some()
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        let mut opts = OpenOptions::new();
        opts.read(mode.can_read());
        if mode.appends() {
            opts.append(true).create(true);
        } else if mode.can_write() {
            opts.write(true)
                .create(!mode.requires_existing())
                .truncate(mode.truncates());
        }
        let cannot_open = |e: io::Error| ConnError::CannotOpenFile {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };
        let mut file = opts.open(&self.path).map_err(cannot_open)?;

        let decode = self.detect_compression && mode.is_text() && !mode.can_write();
        let stream = match decode.then(|| sniff(&mut file)).transpose() {
            Ok(Some(Some(kind))) => {
                tracing::debug!(path = %self.path.display(), ?kind, "reading compressed file");
                FileStream::Decoded(decoder(kind, file))
            }
            Ok(_) => FileStream::Plain(file),
            Err(e) => return Err(cannot_open(e)),
        };

        self.state = Some(FileState {
            stream,
            read_pos: 0,
            write_pos: 0,
            last: if mode.can_read() {
                LastOp::Read
            } else {
                LastOp::Write
            },
            appending: mode.appends(),
        });
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        match self.state.take() {
            Some(FileState {
                stream: FileStream::Plain(mut file),
                ..
            }) => file.flush(),
            _ => Ok(()),
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.as_mut().ok_or_else(not_open)?;
        match &mut state.stream {
            FileStream::Decoded(reader) => reader.read(buf),
            FileStream::Plain(file) => {
                if state.last == LastOp::Write {
                    file.seek(SeekFrom::Start(state.read_pos))?;
                    state.last = LastOp::Read;
                }
                let n = file.read(buf)?;
                state.read_pos += n as u64;
                Ok(n)
            }
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let state = self.state.as_mut().ok_or_else(not_open)?;
        match &mut state.stream {
            FileStream::Decoded(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot write to a decompressing connection",
            )),
            FileStream::Plain(file) => {
                if state.last == LastOp::Read {
                    if !state.appending {
                        file.seek(SeekFrom::Start(state.write_pos))?;
                    }
                    state.last = LastOp::Write;
                }
                file.write_all(buf)?;
                state.write_pos = if state.appending {
                    file.stream_position()?
                } else {
                    state.write_pos + buf.len() as u64
                };
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.state.as_mut().map(|s| &mut s.stream) {
            Some(FileStream::Plain(file)) => file.flush(),
            _ => Ok(()),
        }
    }

    /// Plain files seek; a transparently decompressed stream does not.
    pub fn is_seekable(&self) -> bool {
        !matches!(
            self.state,
            Some(FileState {
                stream: FileStream::Decoded(_),
                ..
            })
        )
    }

    pub fn seek(&mut self, origin: SeekOrigin, offset: i64, rw: SeekRw) -> io::Result<u64> {
        let state = self.state.as_mut().ok_or_else(not_open)?;
        let FileStream::Plain(file) = &mut state.stream else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "seek not enabled for this connection",
            ));
        };
        let which = match rw {
            SeekRw::Read => LastOp::Read,
            SeekRw::Write => LastOp::Write,
            SeekRw::Last => state.last,
        };
        let previous = match which {
            LastOp::Read => state.read_pos,
            LastOp::Write => state.write_pos,
        };
        let base = match origin {
            SeekOrigin::Enquire => return Ok(previous),
            SeekOrigin::Start => 0,
            SeekOrigin::Current => previous,
            SeekOrigin::End => file.metadata()?.len(),
        };
        let target = u64::try_from(i128::from(base) + i128::from(offset)).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "cannot seek before the start of the file")
        })?;
        match which {
            LastOp::Read => state.read_pos = target,
            LastOp::Write => state.write_pos = target,
        }
        if which == state.last {
            file.seek(SeekFrom::Start(target))?;
        }
        Ok(previous)
    }

    /// Cut the file at the write position.
    pub fn truncate(&mut self) -> io::Result<()> {
        let state = self.state.as_mut().ok_or_else(not_open)?;
        let FileStream::Plain(file) = &mut state.stream else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot truncate a decompressing connection",
            ));
        };
        let at = if state.appending {
            file.metadata()?.len()
        } else {
            state.write_pos
        };
        file.set_len(at)?;
        state.read_pos = state.read_pos.min(at);
        if state.last == LastOp::Read {
            file.seek(SeekFrom::Start(state.read_pos))?;
        }
        Ok(())
    }
}
