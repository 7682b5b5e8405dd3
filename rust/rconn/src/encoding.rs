//! Declared character encodings.
//!
//! Text is carried as Rust `String`s internally; an encoding only matters at
//! the byte boundary of a connection.

use crate::error::{ConnError, ConnResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
    Ascii,
}

impl Encoding {
    /// Resolve an encoding name. `""` and `"native.enc"` resolve to `native`.
    pub fn lookup(name: &str, native: Encoding) -> ConnResult<Self> {
        let lowered = name.to_ascii_lowercase();
        match lowered.as_str() {
            "" | "native.enc" => Ok(native),
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" | "iso_8859-1" => {
                Ok(Encoding::Latin1)
            }
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            _ => Err(ConnError::UnsupportedEncodingConversion(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "latin1",
            Encoding::Ascii => "ASCII",
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Encoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
        }
    }

    /// Characters the target cannot represent become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Encoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }
}
