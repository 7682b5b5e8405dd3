//! TCP socket connections and readiness polling.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::not_open;
use crate::error::{ConnError, ConnResult};
use crate::mode::OpenMode;

pub struct SocketBackend {
    host: String,
    port: u16,
    server: bool,
    blocking: bool,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl SocketBackend {
    pub fn new(host: impl Into<String>, port: u16, server: bool, blocking: bool, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            server,
            blocking,
            timeout,
            stream: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    /// `host:port` as shown in `summary`.
    pub fn description(&self) -> String {
        if self.server {
            format!("<-{}:{}", self.host, self.port)
        } else {
            format!("->{}:{}", self.host, self.port)
        }
    }

    /// Connects (client) or waits for one peer (server). The mode only
    /// affects how the connection layer treats the bytes.
    pub fn open(&mut self, _mode: OpenMode) -> ConnResult<()> {
        let stream = if self.server {
            self.accept_one()?
        } else {
            self.connect()?
        };
        if self.blocking {
            let timeout = (!self.timeout.is_zero()).then_some(self.timeout);
            stream.set_read_timeout(timeout).map_err(cannot_open)?;
            stream.set_write_timeout(timeout).map_err(cannot_open)?;
        } else {
            stream.set_nonblocking(true).map_err(cannot_open)?;
        }
        tracing::debug!(peer = ?stream.peer_addr().ok(), server = self.server, "socket open");
        self.stream = Some(stream);
        Ok(())
    }

    fn connect(&self) -> ConnResult<TcpStream> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                ConnError::CannotOpenConnection(format!("cannot resolve '{}': {e}", self.host))
            })?;
        let mut last_err = None;
        for addr in addrs {
            let attempt = if self.timeout.is_zero() {
                TcpStream::connect(addr)
            } else {
                TcpStream::connect_timeout(&addr, self.timeout)
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(ConnError::CannotOpenConnection(format!(
            "cannot connect to {}:{}: {}",
            self.host,
            self.port,
            last_err.map_or_else(|| "no addresses".to_string(), |e| e.to_string())
        )))
    }

    fn accept_one(&self) -> ConnResult<TcpStream> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).map_err(|e| {
            ConnError::CannotOpenConnection(format!("cannot listen on port {}: {e}", self.port))
        })?;
        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            if !self.timeout.is_zero() {
                let ready = poll_ready(&[(listener.as_raw_fd(), false)], Some(self.timeout))
                    .map_err(cannot_open)?;
                if !ready.first().copied().unwrap_or(false) {
                    return Err(ConnError::CannotOpenConnection(format!(
                        "no client connected to port {} within {:?}",
                        self.port, self.timeout
                    )));
                }
            }
        }
        let (stream, _) = listener.accept().map_err(cannot_open)?;
        Ok(stream)
    }

    pub fn close(&mut self) -> io::Result<()> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let blocking = self.blocking;
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        match stream.read(buf) {
            Err(e) if !blocking && e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            other => other,
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.as_mut().ok_or_else(not_open)?.write_all(buf)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(s) => s.flush(),
            None => Ok(()),
        }
    }

    #[cfg(unix)]
    pub fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        use std::os::fd::AsRawFd;
        self.stream.as_ref().map(|s| s.as_raw_fd())
    }
}

fn cannot_open(e: io::Error) -> ConnError {
    ConnError::CannotOpenConnection(e.to_string())
}

/// Wait until each `(fd, for_write)` is ready or `timeout` passes. `None`
/// waits indefinitely.
#[cfg(unix)]
pub(crate) fn poll_ready(
    fds: &[(std::os::fd::RawFd, bool)],
    timeout: Option<Duration>,
) -> io::Result<Vec<bool>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&(fd, for_write)| libc::pollfd {
            fd,
            events: if for_write { libc::POLLOUT } else { libc::POLLIN },
            revents: 0,
        })
        .collect();
    let timeout_ms = match timeout {
        None => -1,
        Some(d) => libc::c_int::try_from(d.as_millis()).unwrap_or(libc::c_int::MAX),
    };
    loop {
        // SAFETY: pollfds is a live, correctly sized array of pollfd structs.
        let rc = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if rc >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    Ok(pollfds
        .iter()
        .map(|p| p.revents & (p.events | libc::POLLHUP | libc::POLLERR) != 0)
        .collect())
}
