//! Pushed-back text, consumed ahead of backend data.

/// What the push-back stack yielded for one line request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushedLine {
    /// A full line; the terminating newline has been stripped.
    Complete(String),
    /// The stack ran dry before a newline; the caller continues the line from
    /// the backend.
    Partial(String),
}

/// LIFO stack of pushed-back entries. The most recently pushed entry is read
/// first. Entries are kept as bytes so a byte-count reader can hand back the
/// tail of a split multi-byte character unchanged.
#[derive(Debug, Default, Clone)]
pub struct PushBackBuffer {
    stack: Vec<Vec<u8>>,
}

impl PushBackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `lines` in order, so the last one is read first. With
    /// `newline`, each entry gets a trailing `\n`.
    pub fn push(&mut self, lines: &[String], newline: bool) {
        for line in lines {
            let mut entry = line.as_bytes().to_vec();
            if newline {
                entry.push(b'\n');
            }
            self.stack.push(entry);
        }
    }

    /// Push raw bytes as one entry. Empty input pushes nothing.
    pub fn push_bytes(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.stack.push(bytes);
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Take the next line. An entry is split at its first newline and the
    /// remainder goes back on top; entries without a newline are joined with
    /// the ones beneath them.
    pub fn next_line(&mut self) -> Option<PushedLine> {
        let mut acc = Vec::new();
        let mut took_any = false;
        while let Some(mut entry) = self.stack.pop() {
            took_any = true;
            match entry.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    let rest = entry.split_off(i + 1);
                    entry.truncate(i);
                    acc.extend_from_slice(&entry);
                    self.push_bytes(rest);
                    return Some(PushedLine::Complete(lossy(acc)));
                }
                None => acc.extend_from_slice(&entry),
            }
        }
        took_any.then(|| PushedLine::Partial(lossy(acc)))
    }

    /// Drain pushed-back text as bytes in read order, for byte-oriented
    /// readers (`readChar`) that bypass line splitting.
    pub fn drain_bytes(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(entry) = self.stack.pop() {
            out.extend_from_slice(&entry);
        }
        out
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
