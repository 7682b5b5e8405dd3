//! Comprehensive tests for file-backed connections: positioning, truncation,
//! anonymous files and compressed formats.

use std::io::Write;

use rconn::builtins::{self, BinSource, BinTarget, CompressedOptions, FileOptions};
use rconn::{ConnError, ConnectionRegistry, Handle, SeekOrigin, SeekRw};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn open_file(reg: &ConnectionRegistry, path: &std::path::Path, mode: &str) -> Handle {
    let opts = FileOptions {
        open: mode.into(),
        ..FileOptions::new(path.display().to_string())
    };
    builtins::file(reg, opts).unwrap()
}

fn compressed(path: &std::path::Path, mode: &str) -> CompressedOptions {
    CompressedOptions {
        open: mode.into(),
        ..CompressedOptions::new(path.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// Seeking
// ---------------------------------------------------------------------------

#[test]
fn seek_enquiry_does_not_move() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seek.txt");
    std::fs::write(&path, "first\nsecond\nthird\n").unwrap();

    let h = open_file(&reg, &path, "r");
    builtins::read_lines(&reg, h, 1, true, true, false).unwrap();
    let pos = builtins::seek(&reg, h, None, SeekOrigin::Enquire, SeekRw::Last).unwrap();
    assert_eq!(pos, 6);
    let again = builtins::seek(&reg, h, None, SeekOrigin::Enquire, SeekRw::Last).unwrap();
    assert_eq!(again, pos);
    assert_eq!(
        builtins::read_lines(&reg, h, 1, true, true, false).unwrap(),
        strings(&["second"])
    );
}

#[test]
fn seek_returns_previous_position() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bytes.bin");
    std::fs::write(&path, b"0123456789").unwrap();

    let h = open_file(&reg, &path, "rb");
    assert_eq!(builtins::seek(&reg, h, Some(4), SeekOrigin::Start, SeekRw::Last).unwrap(), 0);
    assert_eq!(builtins::seek(&reg, h, Some(2), SeekOrigin::Current, SeekRw::Last).unwrap(), 4);
    assert_eq!(
        builtins::read_char(&reg, BinSource::Connection(h), &[2], true).unwrap(),
        strings(&["67"])
    );
    assert_eq!(builtins::seek(&reg, h, Some(-1), SeekOrigin::End, SeekRw::Last).unwrap(), 8);
    assert_eq!(
        builtins::read_char(&reg, BinSource::Connection(h), &[5], true).unwrap(),
        strings(&["9"])
    );
}

#[test]
fn seek_on_unopened_file_fails() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let h = builtins::file(&reg, FileOptions::new(dir.path().join("x").display().to_string())).unwrap();
    assert!(matches!(
        builtins::seek(&reg, h, None, SeekOrigin::Enquire, SeekRw::Last),
        Err(ConnError::NotOpen)
    ));
}

#[test]
fn read_write_file_keeps_separate_positions() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rw.bin");
    std::fs::write(&path, b"0123456789").unwrap();

    let h = open_file(&reg, &path, "r+b");
    assert_eq!(
        builtins::read_char(&reg, BinSource::Connection(h), &[3], true).unwrap(),
        strings(&["012"])
    );
    builtins::write_char(&reg, BinTarget::Connection(h), &strings(&["AB"]), None, None, true)
        .unwrap();
    assert_eq!(
        builtins::read_char(&reg, BinSource::Connection(h), &[2], true).unwrap(),
        strings(&["34"])
    );
    assert_eq!(builtins::seek(&reg, h, None, SeekOrigin::Enquire, SeekRw::Read).unwrap(), 5);
    assert_eq!(builtins::seek(&reg, h, None, SeekOrigin::Enquire, SeekRw::Write).unwrap(), 2);
    builtins::close(&reg, h).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"AB23456789".to_vec());
}

// ---------------------------------------------------------------------------
// Truncation, append, anonymous files
// ---------------------------------------------------------------------------

#[test]
fn truncate_cuts_at_write_position() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trunc.bin");
    std::fs::write(&path, b"abcdefgh").unwrap();

    let h = open_file(&reg, &path, "r+b");
    builtins::seek(&reg, h, Some(3), SeekOrigin::Start, SeekRw::Write).unwrap();
    builtins::truncate(&reg, h).unwrap();
    builtins::close(&reg, h).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"abc".to_vec());
}

#[test]
fn truncate_requires_writable_file() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.txt");
    std::fs::write(&path, "x").unwrap();

    let h = open_file(&reg, &path, "r");
    assert!(matches!(builtins::truncate(&reg, h), Err(ConnError::Generic(_))));

    let text = builtins::text_connection(&reg, "t", None, "w", "").unwrap();
    assert!(matches!(
        builtins::truncate(&reg, text),
        Err(ConnError::TruncateUnsupportedForConnection(class)) if class == "textConnection"
    ));
}

#[test]
fn append_mode_adds_to_existing_content() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.txt");
    std::fs::write(&path, "one\n").unwrap();

    let h = open_file(&reg, &path, "a");
    builtins::write_lines(&reg, h, &strings(&["two"]), "\n", false).unwrap();
    builtins::close(&reg, h).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
}

#[test]
fn anonymous_file_reads_back_what_was_written() {
    let reg = ConnectionRegistry::new();
    let h = builtins::file(&reg, FileOptions::new("")).unwrap();
    let summary = builtins::summary(&reg, h).unwrap();
    assert_eq!(summary.mode, "w+");
    assert_eq!(summary.opened, "opened");

    builtins::write_lines(&reg, h, &strings(&["kept", "lines"]), "\n", false).unwrap();
    builtins::seek(&reg, h, Some(0), SeekOrigin::Start, SeekRw::Read).unwrap();
    assert_eq!(
        builtins::read_lines(&reg, h, -1, true, true, false).unwrap(),
        strings(&["kept", "lines"])
    );
    builtins::close(&reg, h).unwrap();
}

#[test]
fn file_url_prefix_is_stripped() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, "via url\n").unwrap();

    let h = builtins::file(&reg, FileOptions::new(format!("file://{}", path.display()))).unwrap();
    assert_eq!(
        builtins::read_lines(&reg, h, -1, true, true, false).unwrap(),
        strings(&["via url"])
    );
}

#[test]
fn flush_is_accepted_on_any_open_connection() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let h = open_file(&reg, &dir.path().join("f.txt"), "w");
    builtins::write_lines(&reg, h, &strings(&["x"]), "\n", false).unwrap();
    builtins::flush(&reg, h).unwrap();
    assert!(builtins::is_seekable(&reg, h).unwrap());
}

// ---------------------------------------------------------------------------
// Compressed files
// ---------------------------------------------------------------------------

fn round_trip(
    make: fn(&ConnectionRegistry, CompressedOptions) -> rconn::ConnResult<Handle>,
    name: &str,
    magic: &[u8],
) {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    let lines = strings(&["alpha", "beta", "gamma"]);

    let w = make(&reg, compressed(&path, "w")).unwrap();
    builtins::write_lines(&reg, w, &lines, "\n", false).unwrap();
    builtins::close(&reg, w).unwrap();
    assert!(std::fs::read(&path).unwrap().starts_with(magic));

    let r = make(&reg, compressed(&path, "r")).unwrap();
    assert_eq!(builtins::read_lines(&reg, r, -1, true, true, false).unwrap(), lines);
    assert!(!builtins::is_seekable(&reg, r).unwrap());
}

#[test]
fn gzfile_round_trip() {
    round_trip(builtins::gzfile, "data.gz", &[0x1f, 0x8b]);
}

#[test]
fn bzfile_round_trip() {
    round_trip(builtins::bzfile, "data.bz2", b"BZh");
}

#[test]
fn xzfile_round_trip() {
    round_trip(builtins::xzfile, "data.xz", &[0xfd, b'7', b'z', b'X', b'Z', 0x00]);
}

#[test]
fn gzfile_reads_any_detected_format() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("actually.bz2");

    let w = builtins::bzfile(&reg, compressed(&path, "w")).unwrap();
    builtins::write_lines(&reg, w, &strings(&["inside"]), "\n", false).unwrap();
    builtins::close(&reg, w).unwrap();

    let r = builtins::gzfile(&reg, compressed(&path, "r")).unwrap();
    assert_eq!(
        builtins::read_lines(&reg, r, -1, true, true, false).unwrap(),
        strings(&["inside"])
    );
}

#[test]
fn gzfile_reads_plain_files() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    std::fs::write(&path, "not compressed\n").unwrap();

    let r = builtins::gzfile(&reg, compressed(&path, "r")).unwrap();
    assert_eq!(
        builtins::read_lines(&reg, r, -1, true, true, false).unwrap(),
        strings(&["not compressed"])
    );
}

#[test]
fn plain_file_detects_gzip_content() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hidden.dat");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"one\ntwo\n").unwrap();
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();

    let h = builtins::file(&reg, FileOptions::new(path.display().to_string())).unwrap();
    assert_eq!(
        builtins::read_lines(&reg, h, -1, true, true, false).unwrap(),
        strings(&["one", "two"])
    );

    let raw = FileOptions {
        raw: true,
        open: "rb".into(),
        ..FileOptions::new(path.display().to_string())
    };
    let h = builtins::file(&reg, raw).unwrap();
    let head = builtins::read_bin(
        &reg,
        BinSource::Connection(h),
        rconn::BinType::Raw,
        2,
        None,
        true,
        false,
    )
    .unwrap();
    assert_eq!(head, rconn::BinVector::Raw(vec![0x1f, 0x8b]));
}

#[test]
fn compression_level_is_validated() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    let opts = CompressedOptions {
        compression: Some(10),
        ..compressed(&dir.path().join("x.gz"), "w")
    };
    assert!(matches!(
        builtins::gzfile(&reg, opts),
        Err(ConnError::InvalidArgument(arg)) if arg == "compress"
    ));

    let opts = CompressedOptions {
        compression: Some(-9),
        ..compressed(&dir.path().join("x.xz"), "w")
    };
    assert!(builtins::xzfile(&reg, opts).is_ok());
}

#[test]
fn compressed_files_refuse_read_write_modes() {
    let reg = ConnectionRegistry::new();
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        builtins::gzfile(&reg, compressed(&dir.path().join("rw.gz"), "r+")),
        Err(ConnError::CannotOpenConnection(_))
    ));
    assert_eq!(builtins::get_all_connections(&reg).len(), 3);
}
