//! Connections over a byte channel supplied by the embedding runtime.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{ConnError, ConnResult};
use crate::mode::{OpenMode, SeekOrigin};

/// A byte channel the host hands to the subsystem. Only `read` and `write`
/// are required; the rest default to a non-seekable two-way stream.
pub trait ExternalChannel: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "channel is not seekable",
        ))
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Adapts any seekable `Read + Write` value, e.g. an in-memory cursor.
#[derive(Debug)]
pub struct StreamChannel<T>(pub T);

impl<T: Read + Write + Seek + Send> ExternalChannel for StreamChannel<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

pub struct ChannelBackend {
    channel: Box<dyn ExternalChannel>,
}

impl ChannelBackend {
    pub fn new(channel: Box<dyn ExternalChannel>) -> Self {
        Self { channel }
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        if (mode.can_read() && !self.channel.can_read())
            || (mode.can_write() && !self.channel.can_write())
        {
            return Err(ConnError::CannotOpenConnection(format!(
                "channel does not support mode '{mode}'"
            )));
        }
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.channel.close()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }

    pub fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.channel.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "channel accepted no bytes",
                    ))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.channel.flush()
    }

    pub fn is_seekable(&self) -> bool {
        self.channel.is_seekable()
    }

    pub fn seek(&mut self, origin: SeekOrigin, offset: i64) -> io::Result<u64> {
        let previous = self.channel.seek(SeekFrom::Current(0))?;
        let target = match origin {
            SeekOrigin::Enquire => return Ok(previous),
            SeekOrigin::Start => SeekFrom::Start(u64::try_from(offset).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "negative seek offset")
            })?),
            SeekOrigin::Current => SeekFrom::Current(offset),
            SeekOrigin::End => SeekFrom::End(offset),
        };
        self.channel.seek(target)?;
        Ok(previous)
    }
}
