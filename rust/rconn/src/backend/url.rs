//! Read-only HTTP(S) connections. The body is fetched when the connection
//! opens and served from memory afterwards.

use std::io::{self, Cursor, Read};
use std::time::Duration;

use super::not_open;
use crate::error::{ConnError, ConnResult};
use crate::mode::OpenMode;

pub struct UrlBackend {
    url: String,
    timeout: Duration,
    body: Option<Cursor<Vec<u8>>>,
}

impl UrlBackend {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            body: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_supported_scheme(url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }

    pub fn open(&mut self, mode: OpenMode) -> ConnResult<()> {
        if mode.can_write() {
            return Err(ConnError::CannotOpenConnection(
                "can only open URLs for reading".into(),
            ));
        }
        if !Self::is_supported_scheme(&self.url) {
            return Err(ConnError::CannotOpenConnection(format!(
                "unsupported URL scheme in '{}'",
                self.url
            )));
        }
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let response = agent.get(&self.url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => ConnError::CannotOpenConnection(format!(
                "cannot open URL '{}': HTTP status was {code}",
                self.url
            )),
            ureq::Error::Transport(t) => {
                ConnError::CannotOpenConnection(format!("cannot open URL '{}': {t}", self.url))
            }
        })?;
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(ConnError::reading)?;
        tracing::debug!(url = %self.url, bytes = body.len(), "fetched url");
        self.body = Some(Cursor::new(body));
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.body = None;
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.as_mut().ok_or_else(not_open)?.read(buf)
    }

    pub fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "cannot write to a URL connection",
        ))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
