//! The on-disk inode and its mode bits.

use crate::raw;
use std::mem::size_of;

/// Mode bit: the owner may execute the file (or traverse the directory).
pub const MODE_EXEC: u16 = 1;
/// Mode bit: the owner may write the file.
pub const MODE_WRITE: u16 = 2;
/// Mode bit: the owner may read the file.
pub const MODE_READ: u16 = 4;
/// Mode bit: the inode is a directory rather than a regular file.
pub const MODE_DIR: u16 = 8;

/// Sentinel value meaning "no block" / "no inode" / "empty slot", preserved on disk as
/// `-1` for format compatibility.
pub const SENTINEL: i32 = -1;

/// Number of direct block pointers in an inode.
pub const DIRECT_COUNT: usize = 10;

/// A 64-byte on-disk inode: 8 per sector.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Inode {
	pub mode: u16,
	pub nlinks: u16,
	/// Regular file: logical byte length. Directory: number of live directory entries.
	pub size: u32,
	pub block_ptr: [i32; DIRECT_COUNT],
	pub indirect1: i32,
	pub indirect2: i32,
	pub indirect3: i32,
	_padding: [u8; 4],
}

const INODE_ON_DISK_SIZE: usize = 64;
const _: () = assert!(size_of::<Inode>() == INODE_ON_DISK_SIZE);

impl Inode {
	/// An all-sentinel, zero-size inode of the given mode, used to initialize a freshly
	/// allocated slot before the caller fills in type-specific fields.
	pub fn new(mode: u16) -> Self {
		Self {
			mode,
			nlinks: 1,
			size: 0,
			block_ptr: [SENTINEL; DIRECT_COUNT],
			indirect1: SENTINEL,
			indirect2: SENTINEL,
			indirect3: SENTINEL,
			_padding: [0; 4],
		}
	}

	pub fn is_dir(&self) -> bool {
		self.mode & MODE_DIR != 0
	}

	pub fn from_bytes(buf: &[u8]) -> Self {
		raw::from_bytes(buf)
	}

	pub fn to_bytes(&self, buf: &mut [u8]) {
		raw::to_bytes(self, buf)
	}
}

/// Formats `mode` the way `ls -l` displays it: `d` or `-` followed by `rwx` with `-` for
/// unset bits.
pub fn format_mode(mode: u16) -> String {
	let mut s = String::with_capacity(4);
	s.push(if mode & MODE_DIR != 0 { 'd' } else { '-' });
	s.push(if mode & MODE_READ != 0 { 'r' } else { '-' });
	s.push(if mode & MODE_WRITE != 0 { 'w' } else { '-' });
	s.push(if mode & MODE_EXEC != 0 { 'x' } else { '-' });
	s
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn roundtrip() {
		let mut inode = Inode::new(MODE_DIR | MODE_READ | MODE_WRITE | MODE_EXEC);
		inode.size = 2;
		inode.block_ptr[0] = 9;
		let mut buf = [0u8; INODE_ON_DISK_SIZE];
		inode.to_bytes(&mut buf);
		let back = Inode::from_bytes(&buf);
		assert!(back.is_dir());
		assert_eq!({ back.size }, 2);
		assert_eq!({ back.block_ptr[0] }, 9);
		assert_eq!({ back.indirect1 }, SENTINEL);
	}

	#[test]
	fn mode_format() {
		assert_eq!(format_mode(MODE_DIR | MODE_READ | MODE_EXEC), "dr-x");
		assert_eq!(format_mode(MODE_READ | MODE_WRITE), "-rw-");
	}
}
