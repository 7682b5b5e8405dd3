//! The process's standard streams, registered as handles 0, 1 and 2.

use std::io::{self, Read, Write};

use crate::error::{ConnError, ConnResult};
use crate::mode::OpenMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    pub fn name(self) -> &'static str {
        match self {
            StdStream::Stdin => "stdin",
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        }
    }
}

#[derive(Debug)]
pub struct TerminalBackend {
    stream: StdStream,
}

impl TerminalBackend {
    pub fn new(stream: StdStream) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> StdStream {
        self.stream
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        let ok = match self.stream {
            StdStream::Stdin => !mode.can_write(),
            StdStream::Stdout | StdStream::Stderr => !mode.can_read(),
        };
        if ok {
            Ok(())
        } else {
            Err(ConnError::CannotOpenConnection(format!(
                "cannot open {} in mode '{mode}'",
                self.stream.name()
            )))
        }
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.flush()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream {
            StdStream::Stdin => io::stdin().lock().read(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot read from an output stream",
            )),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.stream {
            StdStream::Stdout => io::stdout().lock().write_all(buf),
            StdStream::Stderr => io::stderr().lock().write_all(buf),
            StdStream::Stdin => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot write to stdin",
            )),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.stream {
            StdStream::Stdout => io::stdout().flush(),
            StdStream::Stderr => io::stderr().flush(),
            StdStream::Stdin => Ok(()),
        }
    }
}
