//! Reads and writes individual on-disk inodes, and allocates/releases inode slots.
//!
//! Grounded on the same inode-table region the host project's `Ext2Factory::create`
//! lays out (a flat array of fixed-size records starting at a known sector), generalized
//! here to per-id random access rather than the host project's sequential initial write.

use crate::bitmap;
use crate::bitmap::BitmapRegion;
use crate::blockmap;
use crate::cache::SectorCache;
use crate::error::Result;
use crate::inode::Inode;
use crate::inode::SENTINEL;
use crate::superblock::INODE_BITMAP_SECTOR;
use crate::superblock::INODE_BITMAP_SECTORS;
use crate::superblock::INODE_SIZE;
use crate::superblock::INODE_TABLE_SECTOR;
use crate::superblock::MAX_INODES;
use crate::superblock::SECTOR_SIZE;

pub(crate) fn inode_bitmap_region() -> BitmapRegion {
	BitmapRegion {
		start_sector: INODE_BITMAP_SECTOR,
		sectors: INODE_BITMAP_SECTORS,
	}
}

fn locate(id: u32) -> (u32, usize) {
	let byte_off = id * INODE_SIZE;
	let sector = INODE_TABLE_SECTOR + byte_off / SECTOR_SIZE as u32;
	let in_sector = (byte_off % SECTOR_SIZE as u32) as usize;
	(sector, in_sector)
}

/// Reads inode `id` out of the inode table.
pub fn read(cache: &mut SectorCache, id: u32) -> Result<Inode> {
	let (sector, in_sector) = locate(id);
	let mut buf = [0u8; SECTOR_SIZE];
	cache.read_sector(sector, &mut buf)?;
	Ok(Inode::from_bytes(&buf[in_sector..in_sector + INODE_SIZE as usize]))
}

/// Writes `inode` into slot `id` of the inode table.
pub fn write(cache: &mut SectorCache, id: u32, inode: &Inode) -> Result<()> {
	let (sector, in_sector) = locate(id);
	let mut buf = [0u8; SECTOR_SIZE];
	cache.read_sector(sector, &mut buf)?;
	inode.to_bytes(&mut buf[in_sector..in_sector + INODE_SIZE as usize]);
	cache.write_sector(sector, &buf)?;
	Ok(())
}

/// Claims the first free inode slot and writes `inode` into it, returning its id.
pub fn alloc(cache: &mut SectorCache, inode: &Inode) -> Result<u32> {
	let id = bitmap::alloc(cache, inode_bitmap_region(), MAX_INODES)?;
	write(cache, id, inode)?;
	Ok(id)
}

/// Releases inode `id`: recursively frees every block it references (direct pointers at
/// depth 0, `indirect1` at depth 1, `indirect2` at depth 2, `indirect3` at depth 3), then
/// clears its inode-bitmap bit.
pub fn release(cache: &mut SectorCache, id: u32) -> Result<()> {
	let inode = read(cache, id)?;
	let block_ptr = inode.block_ptr;
	for ptr in block_ptr {
		if ptr != SENTINEL {
			blockmap::release_block_recursive(cache, ptr as u32, 0)?;
		}
	}
	if inode.indirect1 != SENTINEL {
		blockmap::release_block_recursive(cache, inode.indirect1 as u32, 1)?;
	}
	if inode.indirect2 != SENTINEL {
		blockmap::release_block_recursive(cache, inode.indirect2 as u32, 2)?;
	}
	if inode.indirect3 != SENTINEL {
		blockmap::release_block_recursive(cache, inode.indirect3 as u32, 3)?;
	}
	bitmap::free(cache, inode_bitmap_region(), id)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::BlockDevice;
	use crate::inode::MODE_READ;
	use std::env;

	fn temp_cache(name: &str) -> SectorCache {
		let mut path = env::temp_dir();
		path.push(format!("grfs-itable-test-{name}-{}", std::process::id()));
		SectorCache::new(BlockDevice::open_or_create(&path).unwrap())
	}

	#[test]
	fn alloc_write_read_roundtrip() {
		let mut cache = temp_cache("roundtrip");
		let mut inode = Inode::new(MODE_READ);
		inode.size = 42;
		let id = alloc(&mut cache, &inode).unwrap();
		let back = read(&mut cache, id).unwrap();
		assert_eq!({ back.size }, 42);
	}

	#[test]
	fn release_frees_referenced_blocks_and_bitmap_bit() {
		let mut cache = temp_cache("release");
		let mut inode = Inode::new(MODE_READ);
		let block = blockmap::map_logical_to_physical(&mut cache, &mut inode, 0, true).unwrap().unwrap();
		let id = alloc(&mut cache, &inode).unwrap();
		write(&mut cache, id, &inode).unwrap();
		release(&mut cache, id).unwrap();

		let reused_inode = alloc(&mut cache, &Inode::new(MODE_READ)).unwrap();
		assert_eq!(reused_inode, id);
		let mut reused_block_inode = Inode::new(MODE_READ);
		let reused_block = blockmap::map_logical_to_physical(&mut cache, &mut reused_block_inode, 0, true).unwrap().unwrap();
		assert_eq!(reused_block, block);
	}
}
