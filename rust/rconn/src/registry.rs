//! Session-scoped table of live connections.
//!
//! The registry is an ordinary value owned by whatever owns the runtime
//! session and passed explicitly to every constructor and by-handle
//! operation. Its mutex guards only the table itself; I/O happens under the
//! per-connection lock, never while the table is locked.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::backend::StdStream;
use crate::config::ConnectionsConfig;
use crate::connection::Connection;
use crate::encoding::Encoding;
use crate::error::{ConnError, ConnResult};
use crate::warnings::WarningLog;

/// A connection shared between the table and its current caller.
///
/// The mutex makes sharing sound; it is not a promise that interleaved
/// operations on one handle from several threads are meaningful.
pub type ConnectionRef = Arc<Mutex<Connection>>;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Small integer identifying a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Handle(u32);

impl Handle {
    pub const STDIN: Handle = Handle(0);
    pub const STDOUT: Handle = Handle(1);
    pub const STDERR: Handle = Handle(2);

    pub fn index(self) -> u32 {
        self.0
    }

    /// Handles 0, 1 and 2.
    pub fn is_standard(self) -> bool {
        self.0 <= 2
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Handle> for i64 {
    fn from(h: Handle) -> i64 {
        i64::from(h.0)
    }
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

pub struct ConnectionRegistry {
    config: ConnectionsConfig,
    slots: Mutex<Vec<Option<ConnectionRef>>>,
    warnings: WarningLog,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_config(ConnectionsConfig::default())
    }

    /// A table of `config.max_connections` slots with stdin, stdout and
    /// stderr pre-registered.
    pub fn with_config(config: ConnectionsConfig) -> Self {
        let warnings = WarningLog::new();
        let mut slots: Vec<Option<ConnectionRef>> = vec![None; config.max_connections.max(3)];
        for (index, stream) in [StdStream::Stdin, StdStream::Stdout, StdStream::Stderr]
            .into_iter()
            .enumerate()
        {
            let mut conn = Connection::standard(stream, warnings.clone(), config.read_cache_size);
            conn.set_handle(Handle(index as u32));
            slots[index] = Some(Arc::new(Mutex::new(conn)));
        }
        Self {
            config,
            slots: Mutex::new(slots),
            warnings,
        }
    }

    pub fn config(&self) -> &ConnectionsConfig {
        &self.config
    }

    pub fn native_encoding(&self) -> Encoding {
        self.config.native_encoding()
    }

    /// Shared with every connection this registry creates.
    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    pub fn take_warnings(&self) -> Vec<String> {
        self.warnings.take()
    }

    /// Register `conn` under the lowest free handle above the standard ones.
    /// When the table is full the connection is dropped, releasing whatever
    /// it holds.
    pub fn allocate(&self, mut conn: Connection) -> ConnResult<Handle> {
        let mut slots = self.slots.lock();
        let Some(index) = slots.iter().skip(3).position(Option::is_none).map(|i| i + 3) else {
            drop(slots);
            tracing::warn!(description = conn.description(), "connection table full");
            return Err(ConnError::AllConnectionsInUse);
        };
        let handle = Handle(index as u32);
        conn.set_handle(handle);
        tracing::debug!(%handle, class = %conn.class(), description = conn.description(), "connection allocated");
        slots[index] = Some(Arc::new(Mutex::new(conn)));
        Ok(handle)
    }

    /// Resolve a raw index. Negative, out-of-range and free slots fail.
    pub fn lookup(&self, index: i64) -> ConnResult<ConnectionRef> {
        let slot = usize::try_from(index).map_err(|_| ConnError::InvalidConnection)?;
        self.slots
            .lock()
            .get(slot)
            .and_then(Clone::clone)
            .ok_or(ConnError::InvalidConnection)
    }

    pub fn get(&self, handle: Handle) -> ConnResult<ConnectionRef> {
        self.lookup(i64::from(handle))
    }

    /// Validate an index and return its handle.
    pub fn handle_for(&self, index: i64) -> ConnResult<Handle> {
        let conn = self.lookup(index)?;
        let handle = conn.lock().handle();
        handle.ok_or(ConnError::InvalidConnection)
    }

    /// Live handles in ascending order.
    pub fn all(&self) -> Vec<Handle> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| Handle(i as u32))
            .collect()
    }

    /// Free a slot. Standard handles are never released.
    pub fn release(&self, handle: Handle) -> bool {
        if handle.is_standard() {
            return false;
        }
        let released = self
            .slots
            .lock()
            .get_mut(handle.0 as usize)
            .and_then(Option::take)
            .is_some();
        if released {
            tracing::debug!(%handle, "connection released");
        }
        released
    }

    /// Destroy the connection and free its handle. The handle is freed even
    /// when closing the backend fails; that failure is still returned.
    pub fn close(&self, handle: Handle) -> ConnResult<()> {
        if handle.is_standard() {
            return Err(ConnError::Generic(
                "cannot close standard connections".into(),
            ));
        }
        let conn = self.get(handle)?;
        let result = conn.lock().destroy();
        self.release(handle);
        result
    }

    /// Run `f` with the connection locked.
    pub fn with_connection<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut Connection) -> ConnResult<R>,
    ) -> ConnResult<R> {
        let conn = self.get(handle)?;
        let mut guard = conn.lock();
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        let slots = std::mem::take(&mut *self.slots.lock());
        for conn in slots.into_iter().skip(3).flatten() {
            let mut conn = conn.lock();
            if !conn.is_destroyed() {
                if let Err(e) = conn.destroy() {
                    tracing::warn!(description = conn.description(), error = %e, "closing connection at shutdown failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, RawBackend};
    use crate::mode::OpenMode;

    fn raw(registry: &ConnectionRegistry) -> Connection {
        Connection::new(
            "raw",
            Backend::Raw(RawBackend::default()),
            OpenMode::LAZY,
            Encoding::Utf8,
            registry.warnings().clone(),
            64,
        )
    }

    #[test]
    fn standard_connections_preregistered() {
        let reg = ConnectionRegistry::new();
        assert_eq!(reg.all(), vec![Handle::STDIN, Handle::STDOUT, Handle::STDERR]);
        assert_eq!(reg.lookup(0).unwrap().lock().description(), "stdin");
        assert!(!reg.release(Handle::STDOUT));
        assert!(matches!(reg.close(Handle::STDERR), Err(ConnError::Generic(_))));
    }

    #[test]
    fn allocation_takes_lowest_free_slot() {
        let reg = ConnectionRegistry::new();
        let a = reg.allocate(raw(&reg)).unwrap();
        let b = reg.allocate(raw(&reg)).unwrap();
        assert_eq!((a.index(), b.index()), (3, 4));
        reg.close(a).unwrap();
        let c = reg.allocate(raw(&reg)).unwrap();
        assert_eq!(c.index(), 3);
    }

    #[test]
    fn lookup_rejects_bad_indices() {
        let reg = ConnectionRegistry::new();
        assert!(matches!(reg.lookup(-1), Err(ConnError::InvalidConnection)));
        assert!(matches!(reg.lookup(3), Err(ConnError::InvalidConnection)));
        assert!(matches!(reg.lookup(10_000), Err(ConnError::InvalidConnection)));
    }

    #[test]
    fn full_table_reports_all_in_use() {
        let config = ConnectionsConfig {
            max_connections: 5,
            ..ConnectionsConfig::default()
        };
        let reg = ConnectionRegistry::with_config(config);
        reg.allocate(raw(&reg)).unwrap();
        reg.allocate(raw(&reg)).unwrap();
        assert!(matches!(
            reg.allocate(raw(&reg)),
            Err(ConnError::AllConnectionsInUse)
        ));
        assert_eq!(reg.len(), 5);
    }

    #[test]
    fn closed_handle_becomes_invalid() {
        let reg = ConnectionRegistry::new();
        let h = reg.allocate(raw(&reg)).unwrap();
        reg.close(h).unwrap();
        assert!(matches!(reg.get(h), Err(ConnError::InvalidConnection)));
        assert!(matches!(reg.close(h), Err(ConnError::InvalidConnection)));
    }
}
