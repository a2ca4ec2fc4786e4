//! Byte-level (de)serialization of on-disk, plain-old-data structures.
//!
//! Mirrors the host project's own `#[repr(C, packed)]` + raw-pointer approach for on-disk
//! structs (`Superblock`, `BlockGroupDescriptor`, `INode` in `mkfs::ext2`), using
//! `ptr::read_unaligned`/`write_unaligned` instead of a slice cast so the structs don't
//! need to be resident at an aligned offset inside a cached block.

use std::mem::size_of;
use std::ptr;

/// Reads a `T` out of the first `size_of::<T>()` bytes of `buf`.
pub fn from_bytes<T: Copy>(buf: &[u8]) -> T {
	assert!(buf.len() >= size_of::<T>());
	unsafe { ptr::read_unaligned(buf.as_ptr() as *const T) }
}

/// Writes `value` into the first `size_of::<T>()` bytes of `buf`.
pub fn to_bytes<T: Copy>(value: &T, buf: &mut [u8]) {
	assert!(buf.len() >= size_of::<T>());
	unsafe { ptr::write_unaligned(buf.as_mut_ptr() as *mut T, *value) }
}
