//! Named pipes. Blocking only; the fifo is created on open if missing.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::not_open;
use crate::error::{ConnError, ConnResult};
use crate::mode::OpenMode;

pub struct FifoBackend {
    path: PathBuf,
    file: Option<File>,
}

impl FifoBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        let cannot_open = |e: io::Error| ConnError::CannotOpenFifo {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };
        if !self.path.exists() {
            create_fifo(&self.path).map_err(cannot_open)?;
            tracing::debug!(path = %self.path.display(), "created fifo");
        }
        let mut opts = OpenOptions::new();
        opts.read(mode.can_read());
        if mode.appends() {
            opts.append(true);
        } else if mode.can_write() {
            opts.write(true);
        }
        // Opening one end blocks until the other end is opened.
        let file = opts.open(&self.path).map_err(cannot_open)?;
        self.file = Some(file);
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.file.take();
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.as_mut().ok_or_else(not_open)?.read(buf)
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.as_mut().ok_or_else(not_open)?.write_all(buf)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(unix)]
fn create_fifo(path: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn create_fifo(_path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "fifo connections are not supported on this platform",
    ))
}
