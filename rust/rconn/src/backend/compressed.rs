//! gzip, bzip2 and xz file connections.
//!
//! Writing always uses the declared format. Reading sniffs the magic number
//! first, so a `gzfile()` pointed at an xz or plain file still reads it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use super::{not_open, ConnectionClass};
use crate::error::{ConnError, ConnResult};
use crate::mode::OpenMode;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const XZ_PRESET_EXTREME: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    pub fn class(self) -> ConnectionClass {
        match self {
            Compression::Gzip => ConnectionClass::GzFile,
            Compression::Bzip2 => ConnectionClass::BzFile,
            Compression::Xz => ConnectionClass::XzFile,
        }
    }

    /// Accepted `compression` levels. Negative xz levels select the extreme
    /// variant of the preset.
    pub fn level_range(self) -> RangeInclusive<i32> {
        match self {
            Compression::Gzip | Compression::Bzip2 => 0..=9,
            Compression::Xz => -9..=9,
        }
    }

    pub fn from_magic(head: &[u8]) -> Option<Self> {
        if head.starts_with(GZIP_MAGIC) {
            Some(Compression::Gzip)
        } else if head.starts_with(BZIP2_MAGIC) {
            Some(Compression::Bzip2)
        } else if head.starts_with(XZ_MAGIC) {
            Some(Compression::Xz)
        } else {
            None
        }
    }
}

/// Peek at the first bytes of `file` and rewind.
pub(crate) fn sniff(file: &mut File) -> io::Result<Option<Compression>> {
    let mut head = [0u8; 6];
    let mut filled = 0;
    while filled < head.len() {
        match file.read(&mut head[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(Compression::from_magic(&head[..filled]))
}

pub(crate) fn decoder(kind: Compression, file: File) -> Box<dyn Read + Send> {
    match kind {
        Compression::Gzip => Box::new(MultiGzDecoder::new(file)),
        Compression::Bzip2 => Box::new(MultiBzDecoder::new(file)),
        Compression::Xz => Box::new(XzDecoder::new_multi_decoder(file)),
    }
}

enum Encoder {
    Gzip(GzEncoder<File>),
    Bzip2(BzEncoder<File>),
    Xz(XzEncoder<File>),
}

impl Encoder {
    fn new(kind: Compression, level: i32, file: File) -> Self {
        match kind {
            Compression::Gzip => {
                Encoder::Gzip(GzEncoder::new(file, flate2::Compression::new(level.unsigned_abs())))
            }
            // bzip2 has no level 0.
            Compression::Bzip2 => Encoder::Bzip2(BzEncoder::new(
                file,
                bzip2::Compression::new(level.unsigned_abs().max(1)),
            )),
            Compression::Xz => {
                let mut preset = level.unsigned_abs();
                if level < 0 {
                    preset |= XZ_PRESET_EXTREME;
                }
                Encoder::Xz(XzEncoder::new(file, preset))
            }
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Encoder::Gzip(w) => w,
            Encoder::Bzip2(w) => w,
            Encoder::Xz(w) => w,
        }
    }

    fn finish(self) -> io::Result<()> {
        let mut file = match self {
            Encoder::Gzip(w) => w.finish()?,
            Encoder::Bzip2(w) => w.finish()?,
            Encoder::Xz(w) => w.finish()?,
        };
        file.flush()
    }
}

enum Stream {
    Reader(Box<dyn Read + Send>),
    Writer(Encoder),
}

pub struct CompressedBackend {
    path: PathBuf,
    kind: Compression,
    level: i32,
    stream: Option<Stream>,
}

impl CompressedBackend {
    pub fn new(path: impl Into<PathBuf>, kind: Compression, level: i32) -> Self {
        Self {
            path: path.into(),
            kind,
            level,
            stream: None,
        }
    }

    pub fn kind(&self) -> Compression {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        if mode.can_read() && mode.can_write() {
            return Err(ConnError::CannotOpenConnection(format!(
                "cannot open {} '{}' for both reading and writing",
                self.kind.class(),
                self.path.display()
            )));
        }
        let cannot_open = |e: io::Error| ConnError::CannotOpenFile {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };

        let stream = if mode.can_read() {
            let mut file = File::open(&self.path).map_err(cannot_open)?;
            let detected = sniff(&mut file).map_err(cannot_open)?;
            tracing::debug!(path = %self.path.display(), format = ?detected, "compressed read");
            match detected {
                Some(kind) => Stream::Reader(decoder(kind, file)),
                None => Stream::Reader(Box::new(file)),
            }
        } else {
            let mut opts = OpenOptions::new();
            opts.create(true);
            if mode.appends() {
                opts.append(true);
            } else {
                opts.write(true).truncate(true);
            }
            let file = opts.open(&self.path).map_err(cannot_open)?;
            Stream::Writer(Encoder::new(self.kind, self.level, file))
        };
        self.stream = Some(stream);
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(Stream::Writer(encoder)) => encoder.finish(),
            Some(Stream::Reader(_)) | None => Ok(()),
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(Stream::Reader(r)) => r.read(buf),
            Some(Stream::Writer(_)) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "connection not open for reading",
            )),
            None => Err(not_open()),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(Stream::Writer(w)) => w.writer().write_all(buf),
            Some(Stream::Reader(_)) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "connection not open for writing",
            )),
            None => Err(not_open()),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(Stream::Writer(w)) => w.writer().flush(),
            _ => Ok(()),
        }
    }
}

impl Drop for CompressedBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to finish compressed stream");
        }
    }
}
