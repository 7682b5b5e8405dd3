//! Comprehensive tests for the connection registry: handle allocation,
//! lookup, release and the per-handle queries built on it.

use std::collections::HashSet;

use rconn::builtins::{self, FileOptions, RawObject};
use rconn::{ConnError, ConnectionRegistry, ConnectionsConfig, Handle};

fn raw_writer(reg: &ConnectionRegistry) -> Handle {
    builtins::raw_connection(reg, "buf", RawObject::Null, "w").unwrap()
}

// ---------------------------------------------------------------------------
// Standard connections
// ---------------------------------------------------------------------------

#[test]
fn standard_handles_resolve() {
    let reg = ConnectionRegistry::new();
    assert_eq!(builtins::stdin(), Handle::STDIN);
    assert_eq!(builtins::get_connection(&reg, 1).unwrap(), Handle::STDOUT);
    let summary = builtins::summary(&reg, builtins::stderr()).unwrap();
    assert_eq!(summary.description, "stderr");
    assert_eq!(summary.class, "terminal");
    assert_eq!(summary.opened, "opened");
    assert_eq!(summary.can_read, "no");
}

#[test]
fn standard_handles_cannot_be_closed() {
    let reg = ConnectionRegistry::new();
    assert!(builtins::close(&reg, Handle::STDOUT).is_err());
    assert!(builtins::is_open(&reg, Handle::STDOUT, 0).unwrap());
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

#[test]
fn live_handles_are_unique() {
    let reg = ConnectionRegistry::new();
    let mut live: Vec<Handle> = (0..12).map(|_| raw_writer(&reg)).collect();
    for h in live.iter().step_by(3) {
        builtins::close(&reg, *h).unwrap();
    }
    live = builtins::get_all_connections(&reg);
    for _ in 0..6 {
        live.push(raw_writer(&reg));
    }
    let all = builtins::get_all_connections(&reg);
    let distinct: HashSet<_> = all.iter().collect();
    assert_eq!(distinct.len(), all.len());
    assert!(live.iter().all(|h| all.contains(h)));
}

#[test]
fn closed_slot_is_reused() {
    let reg = ConnectionRegistry::new();
    let a = raw_writer(&reg);
    let _b = raw_writer(&reg);
    builtins::close(&reg, a).unwrap();
    assert_eq!(raw_writer(&reg), a);
}

#[test]
fn full_registry_reports_all_in_use() {
    let config = ConnectionsConfig {
        max_connections: 6,
        ..ConnectionsConfig::default()
    };
    let reg = ConnectionRegistry::with_config(config);
    let handles: Vec<_> = (0..3).map(|_| raw_writer(&reg)).collect();
    assert!(matches!(
        builtins::raw_connection(&reg, "extra", RawObject::Null, "w"),
        Err(ConnError::AllConnectionsInUse)
    ));
    builtins::close(&reg, handles[1]).unwrap();
    assert_eq!(raw_writer(&reg), handles[1]);
}

#[test]
fn registry_from_toml_config() {
    let config = ConnectionsConfig::from_toml_str("max_connections = 4\n").unwrap();
    let reg = ConnectionRegistry::with_config(config);
    raw_writer(&reg);
    assert!(matches!(
        builtins::raw_connection(&reg, "x", RawObject::Null, "w"),
        Err(ConnError::AllConnectionsInUse)
    ));
}

#[test]
fn failed_constructor_allocates_nothing() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");
    let opts = FileOptions {
        open: "r".into(),
        ..FileOptions::new(missing.display().to_string())
    };
    assert!(matches!(
        builtins::file(&reg, opts),
        Err(ConnError::CannotOpenFile { .. })
    ));
    assert_eq!(builtins::get_all_connections(&reg).len(), 3);
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[test]
fn stale_and_bogus_indices_are_invalid() {
    let reg = ConnectionRegistry::new();
    let h = raw_writer(&reg);
    builtins::close(&reg, h).unwrap();
    assert!(matches!(
        builtins::get_connection(&reg, i64::from(h)),
        Err(ConnError::InvalidConnection)
    ));
    assert!(matches!(
        builtins::get_connection(&reg, -1),
        Err(ConnError::InvalidConnection)
    ));
    assert!(matches!(
        builtins::summary(&reg, h),
        Err(ConnError::InvalidConnection)
    ));
}

#[test]
fn all_connections_in_ascending_order() {
    let reg = ConnectionRegistry::new();
    let a = raw_writer(&reg);
    let b = raw_writer(&reg);
    assert_eq!(
        builtins::get_all_connections(&reg),
        vec![Handle::STDIN, Handle::STDOUT, Handle::STDERR, a, b]
    );
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[test]
fn is_open_by_direction() {
    let reg = ConnectionRegistry::new();
    let h = raw_writer(&reg);
    assert!(builtins::is_open(&reg, h, 0).unwrap());
    assert!(!builtins::is_open(&reg, h, 1).unwrap());
    assert!(builtins::is_open(&reg, h, 2).unwrap());
    assert!(matches!(
        builtins::is_open(&reg, h, 3),
        Err(ConnError::InvalidArgument(_))
    ));
}

#[test]
fn lazy_file_summary() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lazy.txt").display().to_string();
    let h = builtins::file(&reg, FileOptions::new(path.clone())).unwrap();
    let summary = builtins::summary(&reg, h).unwrap();
    assert_eq!(summary.description, path);
    assert_eq!(summary.class, "file");
    assert_eq!(summary.mode, "r");
    assert_eq!(summary.text, "text");
    assert_eq!(summary.opened, "closed");
    assert_eq!(summary.can_read, "yes");
    assert_eq!(summary.can_write, "yes");

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["can read"], "yes");
}

#[test]
fn raw_connection_summary_is_binary() {
    let reg = ConnectionRegistry::new();
    let h = raw_writer(&reg);
    let summary = builtins::summary(&reg, h).unwrap();
    assert_eq!(summary.class, "rawConnection");
    assert_eq!(summary.text, "binary");
    assert_eq!(summary.mode, "w");
}

#[test]
fn reopen_warns_and_switches_mode() {
    let reg = ConnectionRegistry::new();
    let h = builtins::raw_connection(&reg, "r", RawObject::Bytes(b"abc".to_vec()), "r").unwrap();
    builtins::open(&reg, h, "rb").unwrap();
    assert_eq!(builtins::summary(&reg, h).unwrap().mode, "rb");
    assert!(reg
        .take_warnings()
        .iter()
        .any(|w| w == "connection is already open"));
}

#[test]
fn operations_after_close_fail() {
    let reg = ConnectionRegistry::new();
    let h = raw_writer(&reg);
    builtins::close(&reg, h).unwrap();
    assert!(matches!(
        builtins::write_lines(&reg, h, &["x".to_string()], "\n", false),
        Err(ConnError::InvalidConnection)
    ));
    assert!(matches!(
        builtins::close(&reg, h),
        Err(ConnError::InvalidConnection)
    ));
}
