//! In-memory text connections.
//!
//! Read mode serves a fixed sequence of lines. Write and append modes collect
//! completed lines; a trailing partial line is kept pending until the next
//! newline or until close.

use std::io;

use crate::error::{ConnError, ConnResult};
use crate::mode::OpenMode;

#[derive(Debug, Default)]
pub struct TextBackend {
    input: Vec<u8>,
    pos: usize,
    output: Vec<String>,
    pending: Vec<u8>,
}

impl TextBackend {
    /// A connection that reads `lines`, each followed by a newline.
    pub fn reader(lines: &[String]) -> Self {
        let mut input = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            input.extend_from_slice(line.as_bytes());
            input.push(b'\n');
        }
        Self {
            input,
            ..Self::default()
        }
    }

    /// A connection that collects output, starting from `existing` lines
    /// (kept only when opened for appending).
    pub fn writer(existing: Vec<String>) -> Self {
        Self {
            output: existing,
            ..Self::default()
        }
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        match mode.as_str() {
            "r" | "rt" => self.pos = 0,
            "w" | "wt" => {
                self.output.clear();
                self.pending.clear();
            }
            "a" | "at" => {}
            other => {
                return Err(ConnError::CannotOpenConnection(format!(
                    "unsupported mode '{other}' for a text connection"
                )))
            }
        }
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.output.push(line);
            self.pending.clear();
        }
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = &self.input[self.pos.min(self.input.len())..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.pending.extend_from_slice(buf);
        while let Some(i) = self.pending.iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&self.pending[..i]).into_owned();
            self.output.push(line);
            self.pending.drain(..=i);
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Completed output lines.
    pub fn value(&self) -> &[String] {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_splits_on_newline() {
        let mut t = TextBackend::writer(Vec::new());
        t.open(OpenMode::parse("w").unwrap()).unwrap();
        t.write_all(b"one\ntw").unwrap();
        t.write_all(b"o\nthree").unwrap();
        assert_eq!(t.value(), &["one".to_string(), "two".to_string()]);
        t.close().unwrap();
        assert_eq!(t.value().len(), 3);
        assert_eq!(t.value()[2], "three");
    }

    #[test]
    fn append_keeps_existing_lines() {
        let mut t = TextBackend::writer(vec!["old".into()]);
        t.open(OpenMode::parse("a").unwrap()).unwrap();
        t.write_all(b"new\n").unwrap();
        assert_eq!(t.value(), &["old".to_string(), "new".to_string()]);
    }

    #[test]
    fn binary_modes_rejected() {
        let mut t = TextBackend::reader(&[]);
        assert!(t.open(OpenMode::parse("rb").unwrap()).is_err());
        assert!(t.open(OpenMode::parse("w+").unwrap()).is_err());
    }
}
