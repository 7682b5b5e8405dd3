//! Subprocess pipes: `pipe("cmd", "r")` reads the command's stdout,
//! `pipe("cmd", "w")` feeds its stdin.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use super::not_open;
use crate::error::{ConnError, ConnResult};
use crate::mode::OpenMode;

struct PipeState {
    child: Child,
    stdout: Option<ChildStdout>,
    stdin: Option<ChildStdin>,
}

pub struct PipeBackend {
    command: String,
    shell: String,
    state: Option<PipeState>,
}

impl PipeBackend {
    pub fn new(command: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: shell.into(),
            state: None,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        if !mode.is_one_way() {
            return Err(ConnError::CannotOpenConnection(format!(
                "unsupported mode '{mode}' for a pipe"
            )));
        }
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&self.command);
        if mode.can_read() {
            cmd.stdin(Stdio::null()).stdout(Stdio::piped());
        } else {
            cmd.stdin(Stdio::piped());
        }
        let mut child = cmd.spawn().map_err(|e| {
            ConnError::CannotOpenConnection(format!("cannot run '{}': {e}", self.command))
        })?;
        tracing::debug!(command = %self.command, pid = child.id(), "spawned pipe");
        self.state = Some(PipeState {
            stdout: child.stdout.take(),
            stdin: child.stdin.take(),
            child,
        });
        Ok(())
    }

    /// Closes our end and waits for the command to exit.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        drop(state.stdin.take());
        drop(state.stdout.take());
        let status = state.child.wait()?;
        if !status.success() {
            tracing::debug!(command = %self.command, %status, "pipe command exited");
        }
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.state.as_mut().map(|s| s.stdout.as_mut()) {
            Some(Some(out)) => out.read(buf),
            Some(None) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "pipe not open for reading",
            )),
            None => Err(not_open()),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.state.as_mut().map(|s| s.stdin.as_mut()) {
            Some(Some(input)) => input.write_all(buf),
            Some(None) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "pipe not open for writing",
            )),
            None => Err(not_open()),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.state.as_mut().and_then(|s| s.stdin.as_mut()) {
            Some(input) => input.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for PipeBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(command = %self.command, error = %e, "failed to reap pipe command");
        }
    }
}
