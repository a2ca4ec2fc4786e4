//! The open-file descriptor table and byte-oriented file I/O on top of the block map.
//!
//! Has no direct counterpart in the host project (`mkfs` never opens a file it creates),
//! so the descriptor pool and the sector-at-a-time read/write loop are grounded on the
//! block device's own sector-buffer pattern in `device.rs`, generalized from whole-sector
//! transfers to arbitrary byte ranges with partial leading/trailing sectors.

use crate::blockmap;
use crate::cache::SectorCache;
use crate::error::GrfsError;
use crate::error::Result;
use crate::itable;
use crate::superblock::BLOCK_SIZE;
use crate::superblock::SECTOR_SIZE;

/// Size of the fixed descriptor pool.
pub const MAX_DESCRIPTORS: usize = 32;

/// How a descriptor was opened; governs which of `read`/`write` it permits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OpenMode {
	ReadOnly,
	WriteOnly,
	ReadWrite,
}

impl OpenMode {
	fn allows_read(self) -> bool {
		matches!(self, OpenMode::ReadOnly | OpenMode::ReadWrite)
	}

	fn allows_write(self) -> bool {
		matches!(self, OpenMode::WriteOnly | OpenMode::ReadWrite)
	}
}

/// Origin for `lseek`.
#[derive(Clone, Copy)]
pub enum Whence {
	Set,
	Cur,
	End,
}

#[derive(Clone, Copy)]
struct Descriptor {
	inode_id: u32,
	offset: u64,
	mode: OpenMode,
	owner: u32,
}

/// A fixed pool of open-file descriptors, indexed by small integer ids.
#[derive(Default)]
pub struct DescriptorTable {
	slots: Vec<Option<Descriptor>>,
}

impl DescriptorTable {
	pub fn new() -> Self {
		Self { slots: vec![None; MAX_DESCRIPTORS] }
	}

	/// Opens `inode_id` under `mode` for `owner`, returning the new descriptor id.
	pub fn open(&mut self, inode_id: u32, mode: OpenMode, owner: u32) -> Result<usize> {
		let slot = self.slots.iter().position(|s| s.is_none()).ok_or(GrfsError::BadDescriptor)?;
		self.slots[slot] = Some(Descriptor { inode_id, offset: 0, mode, owner });
		Ok(slot)
	}

	pub fn close(&mut self, fd: usize) -> Result<()> {
		let slot = self.slots.get_mut(fd).ok_or(GrfsError::BadDescriptor)?;
		if slot.is_none() {
			return Err(GrfsError::BadDescriptor);
		}
		*slot = None;
		Ok(())
	}

	/// Closes every descriptor opened by `owner`.
	pub fn reap_by_owner(&mut self, owner: u32) {
		for slot in self.slots.iter_mut() {
			if slot.map(|d| d.owner == owner).unwrap_or(false) {
				*slot = None;
			}
		}
	}

	fn get(&self, fd: usize) -> Result<Descriptor> {
		self.slots.get(fd).and_then(|s| *s).ok_or(GrfsError::BadDescriptor)
	}

	fn get_mut(&mut self, fd: usize) -> Result<&mut Descriptor> {
		self.slots.get_mut(fd).and_then(|s| s.as_mut()).ok_or(GrfsError::BadDescriptor)
	}

	/// Repositions `fd`'s offset, rejecting a negative result. `whence = End` is relative
	/// to the inode's current size as read from the table, not a cached value.
	pub fn lseek(&mut self, cache: &mut SectorCache, fd: usize, off: i64, whence: Whence) -> Result<u64> {
		let size = { itable::read(cache, self.get(fd)?.inode_id)?.size as i64 };
		let base = match whence {
			Whence::Set => 0,
			Whence::Cur => self.get(fd)?.offset as i64,
			Whence::End => size,
		};
		let new_offset = base + off;
		if new_offset < 0 {
			return Err(GrfsError::InvalidPath);
		}
		self.get_mut(fd)?.offset = new_offset as u64;
		Ok(new_offset as u64)
	}

	/// Reads up to `buf.len()` bytes from `fd`'s current offset, zero-filling any portion
	/// that falls in an unallocated (sparse) block, and advances the offset by the number
	/// of bytes delivered.
	pub fn read(&mut self, cache: &mut SectorCache, fd: usize, buf: &mut [u8]) -> Result<usize> {
		let desc = self.get(fd)?;
		if !desc.mode.allows_read() {
			return Err(GrfsError::BadMode);
		}
		let inode = itable::read(cache, desc.inode_id)?;
		let size = inode.size as u64;
		if desc.offset >= size {
			return Ok(0);
		}
		let to_read = buf.len().min((size - desc.offset) as usize);
		let mut done = 0usize;
		let mut inode = inode;

		while done < to_read {
			let pos = desc.offset + done as u64;
			let logical_block = (pos / BLOCK_SIZE as u64) as usize;
			let in_block = (pos % BLOCK_SIZE as u64) as usize;
			let chunk = (BLOCK_SIZE - in_block).min(to_read - done);

			match blockmap::map_logical_to_physical(cache, &mut inode, logical_block, false)? {
				None => {
					buf[done..done + chunk].fill(0);
				}
				Some(block_id) => {
					read_block_range(cache, block_id, in_block, &mut buf[done..done + chunk])?;
				}
			}
			done += chunk;
		}

		self.get_mut(fd)?.offset += done as u64;
		Ok(done)
	}

	/// Writes `buf` at `fd`'s current offset, allocating blocks on demand and enlarging
	/// the inode's `size` if the write extends past it. Advances the offset by the number
	/// of bytes written.
	pub fn write(&mut self, cache: &mut SectorCache, fd: usize, buf: &[u8]) -> Result<usize> {
		let desc = self.get(fd)?;
		if !desc.mode.allows_write() {
			return Err(GrfsError::BadMode);
		}
		let mut inode = itable::read(cache, desc.inode_id)?;
		let mut done = 0usize;

		while done < buf.len() {
			let pos = desc.offset + done as u64;
			let logical_block = (pos / BLOCK_SIZE as u64) as usize;
			let in_block = (pos % BLOCK_SIZE as u64) as usize;
			let chunk = (BLOCK_SIZE - in_block).min(buf.len() - done);

			let block_id = blockmap::map_logical_to_physical(cache, &mut inode, logical_block, true)?
				.expect("allocating write must yield a block");
			write_block_range(cache, block_id, in_block, &buf[done..done + chunk])?;
			done += chunk;
		}

		let new_offset = desc.offset + done as u64;
		if new_offset > inode.size as u64 {
			inode.size = new_offset as u32;
		}
		itable::write(cache, desc.inode_id, &inode)?;
		self.get_mut(fd)?.offset = new_offset;
		Ok(done)
	}
}

fn read_block_range(cache: &mut SectorCache, block_id: u32, in_block_offset: usize, out: &mut [u8]) -> Result<()> {
	let base_sector = blockmap::block_to_sector(block_id);
	let mut done = 0usize;
	while done < out.len() {
		let pos = in_block_offset + done;
		let sector_in_block = (pos / SECTOR_SIZE) as u32;
		let in_sector = pos % SECTOR_SIZE;
		let chunk = (SECTOR_SIZE - in_sector).min(out.len() - done);

		let mut buf = [0u8; SECTOR_SIZE];
		cache.read_sector(base_sector + sector_in_block, &mut buf)?;
		out[done..done + chunk].copy_from_slice(&buf[in_sector..in_sector + chunk]);
		done += chunk;
	}
	Ok(())
}

fn write_block_range(cache: &mut SectorCache, block_id: u32, in_block_offset: usize, data: &[u8]) -> Result<()> {
	let base_sector = blockmap::block_to_sector(block_id);
	let mut done = 0usize;
	while done < data.len() {
		let pos = in_block_offset + done;
		let sector_in_block = (pos / SECTOR_SIZE) as u32;
		let in_sector = pos % SECTOR_SIZE;
		let chunk = (SECTOR_SIZE - in_sector).min(data.len() - done);

		let mut buf = [0u8; SECTOR_SIZE];
		cache.read_sector(base_sector + sector_in_block, &mut buf)?;
		buf[in_sector..in_sector + chunk].copy_from_slice(&data[done..done + chunk]);
		cache.write_sector(base_sector + sector_in_block, &buf)?;
		done += chunk;
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::BlockDevice;
	use crate::inode::Inode;
	use crate::inode::MODE_READ;
	use crate::inode::MODE_WRITE;
	use std::env;

	fn temp_cache(name: &str) -> SectorCache {
		let mut path = env::temp_dir();
		path.push(format!("grfs-fd-test-{name}-{}", std::process::id()));
		SectorCache::new(BlockDevice::open_or_create(&path).unwrap())
	}

	#[test]
	fn write_then_read_back_within_one_block() {
		let mut cache = temp_cache("basic");
		let id = itable::alloc(&mut cache, &Inode::new(MODE_READ | MODE_WRITE)).unwrap();
		let mut table = DescriptorTable::new();
		let fd = table.open(id, OpenMode::ReadWrite, 1).unwrap();
		table.write(&mut cache, fd, b"hello").unwrap();
		table.lseek(&mut cache, fd, 0, Whence::Set).unwrap();
		let mut buf = [0u8; 5];
		let n = table.read(&mut cache, fd, &mut buf).unwrap();
		assert_eq!(n, 5);
		assert_eq!(&buf, b"hello");
	}

	#[test]
	fn write_across_direct_boundary_spans_blocks() {
		let mut cache = temp_cache("span");
		let id = itable::alloc(&mut cache, &Inode::new(MODE_READ | MODE_WRITE)).unwrap();
		let mut table = DescriptorTable::new();
		let fd = table.open(id, OpenMode::ReadWrite, 1).unwrap();
		let data = vec![0xABu8; BLOCK_SIZE * 10 + 100];
		table.write(&mut cache, fd, &data).unwrap();
		table.lseek(&mut cache, fd, 0, Whence::Set).unwrap();
		let mut out = vec![0u8; data.len()];
		let n = table.read(&mut cache, fd, &mut out).unwrap();
		assert_eq!(n, data.len());
		assert_eq!(out, data);
	}

	#[test]
	fn read_sparse_hole_yields_zeros() {
		let mut cache = temp_cache("sparse");
		let id = itable::alloc(&mut cache, &Inode::new(MODE_READ | MODE_WRITE)).unwrap();
		let mut table = DescriptorTable::new();
		let fd = table.open(id, OpenMode::ReadWrite, 1).unwrap();
		table.lseek(&mut cache, fd, 100, Whence::Set).unwrap();
		table.write(&mut cache, fd, b"x").unwrap();
		table.lseek(&mut cache, fd, 0, Whence::Set).unwrap();
		let mut buf = [0xFFu8; 100];
		table.read(&mut cache, fd, &mut buf).unwrap();
		assert!(buf.iter().all(|&b| b == 0));
	}

	#[test]
	fn lseek_end_then_cur_matches_size_plus_off() {
		let mut cache = temp_cache("seekend");
		let id = itable::alloc(&mut cache, &Inode::new(MODE_READ | MODE_WRITE)).unwrap();
		let mut table = DescriptorTable::new();
		let fd = table.open(id, OpenMode::ReadWrite, 1).unwrap();
		table.write(&mut cache, fd, b"hello").unwrap();
		let end = table.lseek(&mut cache, fd, 10, Whence::End).unwrap();
		let cur = table.lseek(&mut cache, fd, 0, Whence::Cur).unwrap();
		assert_eq!(end, 15);
		assert_eq!(cur, 15);
	}

	#[test]
	fn lseek_negative_rejected() {
		let mut cache = temp_cache("neg");
		let id = itable::alloc(&mut cache, &Inode::new(MODE_READ | MODE_WRITE)).unwrap();
		let mut table = DescriptorTable::new();
		let fd = table.open(id, OpenMode::ReadWrite, 1).unwrap();
		assert!(matches!(table.lseek(&mut cache, fd, -1, Whence::Set), Err(GrfsError::InvalidPath)));
	}

	#[test]
	fn write_only_descriptor_rejects_read() {
		let mut cache = temp_cache("wmode");
		let id = itable::alloc(&mut cache, &Inode::new(MODE_WRITE)).unwrap();
		let mut table = DescriptorTable::new();
		let fd = table.open(id, OpenMode::WriteOnly, 1).unwrap();
		let mut buf = [0u8; 4];
		assert!(matches!(table.read(&mut cache, fd, &mut buf), Err(GrfsError::BadMode)));
	}

	#[test]
	fn reap_by_owner_closes_matching_descriptors_only() {
		let mut cache = temp_cache("reap");
		let id = itable::alloc(&mut cache, &Inode::new(MODE_READ | MODE_WRITE)).unwrap();
		let mut table = DescriptorTable::new();
		let fd_a = table.open(id, OpenMode::ReadOnly, 1).unwrap();
		let fd_b = table.open(id, OpenMode::ReadOnly, 2).unwrap();
		table.reap_by_owner(1);
		assert!(table.close(fd_a).is_err());
		assert!(table.close(fd_b).is_ok());
	}
}
