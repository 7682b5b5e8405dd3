//! In-memory byte buffer connections.

use std::io;

use crate::error::ConnResult;
use crate::mode::{OpenMode, SeekOrigin};

#[derive(Debug, Default)]
pub struct RawBackend {
    data: Vec<u8>,
    pos: usize,
    appending: bool,
}

impl RawBackend {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        if mode.truncates() {
            self.data.clear();
        }
        self.appending = mode.appends();
        self.pos = if self.appending { self.data.len() } else { 0 };
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = &self.data[self.pos.min(self.data.len())..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }

    /// Overwrites from the current position, growing the buffer as needed.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.appending {
            self.pos = self.data.len();
        }
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    pub fn seek(&mut self, origin: SeekOrigin, offset: i64) -> io::Result<u64> {
        let previous = self.pos as u64;
        let base = match origin {
            SeekOrigin::Enquire => return Ok(previous),
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.pos as i128,
            SeekOrigin::End => self.data.len() as i128,
        };
        let target = base + i128::from(offset);
        if target < 0 || target > self.data.len() as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "attempt to seek outside the range of the raw connection",
            ));
        }
        self.pos = target as usize;
        Ok(previous)
    }

    pub fn value(&self) -> &[u8] {
        &self.data
    }
}
