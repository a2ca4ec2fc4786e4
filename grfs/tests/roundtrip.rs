//! Integration-level round-trip tests, driven entirely through `grfs::fs::Filesystem`'s
//! public API against a temp-directory image file — the properties the unit tests
//! embedded next to each module structurally cannot exercise, since those keep a single
//! `Filesystem` handle open for their whole run. Per the host project's own avoidance of
//! test-only dependencies, temp paths come from a bare `std::env::temp_dir()` plus a
//! unique suffix rather than the `tempfile` crate.

use grfs::fd::OpenMode;
use grfs::fd::Whence;
use grfs::fs::Filesystem;
use grfs::fs::NodeKind;
use std::env;
use std::path::PathBuf;

fn temp_image(name: &str) -> PathBuf {
	let mut path = env::temp_dir();
	path.push(format!("grfs-roundtrip-test-{name}-{}", std::process::id()));
	path
}

#[test]
fn mkfs_write_reopen_read_survives_a_real_close() {
	let path = temp_image("mkfs-write-reopen");

	let mut fs = Filesystem::open(&path).unwrap();
	fs.mkfs("grfs").unwrap();
	fs.echo_to_file("/greeting", b"hello, disk", false).unwrap();
	fs.sync().unwrap();
	drop(fs);

	// A fresh `Filesystem` over the same path, with no in-memory state carried over.
	let mut reopened = Filesystem::open(&path).unwrap();
	assert_eq!(reopened.cat("/greeting").unwrap(), b"hello, disk");
	assert_eq!(reopened.find("/greeting"), NodeKind::File);
}

#[test]
fn link_then_unlink_survives_reopen() {
	let path = temp_image("link-unlink-reopen");

	let mut fs = Filesystem::open(&path).unwrap();
	fs.mkfs("grfs").unwrap();
	fs.touch("/src").unwrap();
	fs.echo_to_file("/src", b"payload", false).unwrap();
	fs.link("/src", "/dst").unwrap();
	fs.rmnod("/src").unwrap();
	fs.sync().unwrap();
	drop(fs);

	let mut reopened = Filesystem::open(&path).unwrap();
	assert_eq!(reopened.find("/src"), NodeKind::Missing);
	assert_eq!(reopened.cat("/dst").unwrap(), b"payload");
}

#[test]
fn lseek_past_eof_then_write_reads_back_a_zero_filled_hole_after_reopen() {
	let path = temp_image("lseek-eof-reopen");

	let mut fs = Filesystem::open(&path).unwrap();
	fs.mkfs("grfs").unwrap();
	let fd = fs.fopen("/sparse", OpenMode::ReadWrite, 0).unwrap();
	let end = fs.flseek(fd, 200, Whence::End).unwrap();
	assert_eq!(end, 200);
	fs.fwrite(fd, b"tail").unwrap();
	fs.fclose(fd).unwrap();
	fs.sync().unwrap();
	drop(fs);

	let mut reopened = Filesystem::open(&path).unwrap();
	let data = reopened.cat("/sparse").unwrap();
	assert_eq!(data.len(), 204);
	assert!(data[..200].iter().all(|&b| b == 0));
	assert_eq!(&data[200..], b"tail");

	let fd = reopened.fopen("/sparse", OpenMode::ReadOnly, 0).unwrap();
	let past_end = reopened.flseek(fd, 50, Whence::End).unwrap();
	assert_eq!(past_end, 254);
	reopened.fclose(fd).unwrap();
}
