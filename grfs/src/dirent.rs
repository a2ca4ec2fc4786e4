//! The on-disk directory entry.

use crate::inode::SENTINEL;
use crate::raw;
use std::mem::size_of;

/// Maximum length of a directory entry's name.
pub const NAME_LEN: usize = 28;
/// Directory entries packed per sector.
pub const ENTRIES_PER_SECTOR: usize = 512 / 32;
/// Directory entries packed per block.
pub const ENTRIES_PER_BLOCK: usize = super::superblock::BLOCK_SIZE / 32;

/// A 32-byte on-disk directory entry: a null-padded name plus the inode it names.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DirEntry {
	pub name: [u8; NAME_LEN],
	/// `-1` marks an empty slot.
	pub inode: i32,
}

const _: () = assert!(size_of::<DirEntry>() == 32);

impl DirEntry {
	/// An empty slot.
	pub fn empty() -> Self {
		Self {
			name: [0; NAME_LEN],
			inode: SENTINEL,
		}
	}

	/// Builds an occupied entry. `name` must already have been validated to fit.
	pub fn new(name: &str, inode: u32) -> Self {
		let mut buf = [0u8; NAME_LEN];
		let bytes = name.as_bytes();
		buf[..bytes.len()].copy_from_slice(bytes);
		Self {
			name: buf,
			inode: inode as i32,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.inode == SENTINEL
	}

	pub fn name_str(&self) -> &str {
		let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
		std::str::from_utf8(&self.name[..end]).unwrap_or("")
	}

	pub fn from_bytes(buf: &[u8]) -> Self {
		raw::from_bytes(buf)
	}

	pub fn to_bytes(&self, buf: &mut [u8]) {
		raw::to_bytes(self, buf)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn roundtrip() {
		let e = DirEntry::new("hi", 7);
		let mut buf = [0u8; 32];
		e.to_bytes(&mut buf);
		let back = DirEntry::from_bytes(&buf);
		assert_eq!(back.name_str(), "hi");
		assert_eq!({ back.inode }, 7);
		assert!(!back.is_empty());
	}

	#[test]
	fn empty_slot() {
		assert!(DirEntry::empty().is_empty());
	}
}
