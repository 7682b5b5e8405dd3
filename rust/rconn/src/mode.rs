//! Open modes, seek origins and the capability flags derived from them.

use std::fmt;

use crate::error::{ConnError, ConnResult};

// ---------------------------------------------------------------------------
// OpenMode
// ---------------------------------------------------------------------------

/// One accepted open-mode spelling.
///
/// The spelling is retained because `summary` reports the mode the caller
/// asked for, e.g. `"rt"` and `"r"` behave the same but print differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    spelling: &'static str,
    kind: ModeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeKind {
    Lazy,
    Read,
    Write,
    Append,
    ReadBinary,
    WriteBinary,
    AppendBinary,
    ReadWrite,
    ReadWriteBinary,
    ReadWriteTrunc,
    ReadWriteTruncBinary,
    ReadAppend,
    ReadAppendBinary,
}

const MODE_TABLE: &[(&str, ModeKind)] = &[
    ("", ModeKind::Lazy),
    ("r", ModeKind::Read),
    ("rt", ModeKind::Read),
    ("w", ModeKind::Write),
    ("wt", ModeKind::Write),
    ("a", ModeKind::Append),
    ("at", ModeKind::Append),
    ("rb", ModeKind::ReadBinary),
    ("wb", ModeKind::WriteBinary),
    ("ab", ModeKind::AppendBinary),
    ("r+", ModeKind::ReadWrite),
    ("r+b", ModeKind::ReadWriteBinary),
    ("w+", ModeKind::ReadWriteTrunc),
    ("w+b", ModeKind::ReadWriteTruncBinary),
    ("a+", ModeKind::ReadAppend),
    ("a+b", ModeKind::ReadAppendBinary),
];

impl OpenMode {
    pub const LAZY: OpenMode = OpenMode {
        spelling: "",
        kind: ModeKind::Lazy,
    };
    pub const READ: OpenMode = OpenMode {
        spelling: "r",
        kind: ModeKind::Read,
    };
    pub const READ_TEXT: OpenMode = OpenMode {
        spelling: "rt",
        kind: ModeKind::Read,
    };
    pub const READ_BINARY: OpenMode = OpenMode {
        spelling: "rb",
        kind: ModeKind::ReadBinary,
    };
    pub const WRITE: OpenMode = OpenMode {
        spelling: "w",
        kind: ModeKind::Write,
    };
    pub const WRITE_TEXT: OpenMode = OpenMode {
        spelling: "wt",
        kind: ModeKind::Write,
    };
    pub const WRITE_BINARY: OpenMode = OpenMode {
        spelling: "wb",
        kind: ModeKind::WriteBinary,
    };
    pub const READ_WRITE_TRUNC: OpenMode = OpenMode {
        spelling: "w+",
        kind: ModeKind::ReadWriteTrunc,
    };
    pub const READ_APPEND: OpenMode = OpenMode {
        spelling: "a+",
        kind: ModeKind::ReadAppend,
    };

    /// Parse a mode string. Anything outside the accepted grammar fails with
    /// [`ConnError::UnsupportedMode`].
    pub fn parse(s: &str) -> ConnResult<Self> {
        MODE_TABLE
            .iter()
            .find(|(spelling, _)| *spelling == s)
            .map(|&(spelling, kind)| OpenMode { spelling, kind })
            .ok_or_else(|| ConnError::UnsupportedMode(s.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        self.spelling
    }

    /// `""`: the connection is created unopened.
    pub fn is_lazy(&self) -> bool {
        self.kind == ModeKind::Lazy
    }

    /// Text modes get line splitting and encoding conversion.
    pub fn is_text(&self) -> bool {
        matches!(
            self.kind,
            ModeKind::Read
                | ModeKind::Write
                | ModeKind::Append
                | ModeKind::ReadWrite
                | ModeKind::ReadWriteTrunc
                | ModeKind::ReadAppend
        )
    }

    pub fn is_binary(&self) -> bool {
        !self.is_lazy() && !self.is_text()
    }

    pub fn can_read(&self) -> bool {
        !matches!(
            self.kind,
            ModeKind::Write | ModeKind::Append | ModeKind::WriteBinary | ModeKind::AppendBinary
        )
    }

    pub fn can_write(&self) -> bool {
        !matches!(self.kind, ModeKind::Read | ModeKind::ReadBinary)
    }

    /// Opening discards any existing content.
    pub fn truncates(&self) -> bool {
        matches!(
            self.kind,
            ModeKind::Write
                | ModeKind::WriteBinary
                | ModeKind::ReadWriteTrunc
                | ModeKind::ReadWriteTruncBinary
        )
    }

    /// Writes always land at the end.
    pub fn appends(&self) -> bool {
        matches!(
            self.kind,
            ModeKind::Append
                | ModeKind::AppendBinary
                | ModeKind::ReadAppend
                | ModeKind::ReadAppendBinary
        )
    }

    /// Opening requires existing content (`r`, `rb`, `r+`, `r+b`).
    pub fn requires_existing(&self) -> bool {
        matches!(
            self.kind,
            ModeKind::Read | ModeKind::ReadBinary | ModeKind::ReadWrite | ModeKind::ReadWriteBinary
        )
    }

    /// Read-only or write-only, never both.
    pub fn is_one_way(&self) -> bool {
        !self.is_lazy() && (self.can_read() != self.can_write())
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spelling)
    }
}

// ---------------------------------------------------------------------------
// Seeking
// ---------------------------------------------------------------------------

/// Where a seek offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Report the position without moving it.
    Enquire,
    Start,
    Current,
    End,
}

impl SeekOrigin {
    pub fn parse(s: &str) -> ConnResult<Self> {
        match s {
            "start" => Ok(SeekOrigin::Start),
            "current" => Ok(SeekOrigin::Current),
            "end" => Ok(SeekOrigin::End),
            _ => Err(ConnError::InvalidArgument("origin".into())),
        }
    }
}

/// Which position of a dual-purpose stream a seek addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekRw {
    /// Whichever position the last operation used.
    #[default]
    Last,
    Read,
    Write,
}

impl SeekRw {
    pub fn parse(s: &str) -> ConnResult<Self> {
        match s {
            "" => Ok(SeekRw::Last),
            "read" => Ok(SeekRw::Read),
            "write" => Ok(SeekRw::Write),
            _ => Err(ConnError::InvalidArgument("rw".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_grammar() {
        for s in [
            "", "r", "rt", "rb", "r+", "r+b", "w", "wt", "wb", "w+", "w+b", "a", "at", "ab", "a+",
            "a+b",
        ] {
            assert_eq!(OpenMode::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn constants_match_parsed_modes() {
        assert_eq!(OpenMode::parse("rt").unwrap(), OpenMode::READ_TEXT);
        assert_eq!(OpenMode::parse("wb").unwrap(), OpenMode::WRITE_BINARY);
        assert_eq!(OpenMode::parse("a+").unwrap(), OpenMode::READ_APPEND);
    }

    #[test]
    fn rejects_unknown_spelling() {
        assert!(matches!(
            OpenMode::parse("rw"),
            Err(ConnError::UnsupportedMode(m)) if m == "rw"
        ));
        assert!(OpenMode::parse("R").is_err());
    }

    #[test]
    fn capability_flags() {
        let r = OpenMode::parse("r").unwrap();
        assert!(r.is_text() && r.can_read() && !r.can_write());
        let wb = OpenMode::parse("wb").unwrap();
        assert!(wb.is_binary() && !wb.can_read() && wb.can_write() && wb.truncates());
        let ap = OpenMode::parse("a+b").unwrap();
        assert!(ap.can_read() && ap.can_write() && ap.appends() && !ap.truncates());
        let rp = OpenMode::parse("r+").unwrap();
        assert!(rp.requires_existing() && rp.can_write() && !rp.is_one_way());
    }

    #[test]
    fn lazy_is_neither_text_nor_binary() {
        assert!(OpenMode::LAZY.is_lazy());
        assert!(!OpenMode::LAZY.is_text());
        assert!(!OpenMode::LAZY.is_binary());
    }

    #[test]
    fn seek_arguments() {
        assert_eq!(SeekOrigin::parse("end").unwrap(), SeekOrigin::End);
        assert!(SeekOrigin::parse("middle").is_err());
        assert_eq!(SeekRw::parse("").unwrap(), SeekRw::Last);
        assert_eq!(SeekRw::parse("write").unwrap(), SeekRw::Write);
    }
}
