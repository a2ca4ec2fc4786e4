//! Maps an inode's logical block index onto a physical data-area block id, walking the
//! direct pointers and the single/double/triple indirect trees, allocating along the way
//! when asked to.
//!
//! Grounded on the same fixed-size, pointer-tree layout the host project's `INode` struct
//! implies (direct pointers plus indirect fields) generalized to actually walk multiple
//! indirection levels, since the host project's own `mkfs` only ever writes the root
//! directory's first direct block and never exercises indirection.

use crate::bitmap;
use crate::bitmap::BitmapRegion;
use crate::cache::SectorCache;
use crate::error::GrfsError;
use crate::error::Result;
use crate::inode::Inode;
use crate::inode::SENTINEL;
use crate::superblock::BLOCK_SIZE;
use crate::superblock::DATA_AREA_SECTOR;
use crate::superblock::MAX_BLOCKS;
use crate::superblock::SECTORS_PER_BLOCK;

/// Pointers per indirect block: 4096 bytes / 4-byte `i32` ids.
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;

const DIRECT_COUNT: usize = 10;
const SINGLE_MAX: usize = DIRECT_COUNT + PTRS_PER_BLOCK;
const DOUBLE_MAX: usize = SINGLE_MAX + PTRS_PER_BLOCK * PTRS_PER_BLOCK;
const TRIPLE_MAX: usize = DOUBLE_MAX + PTRS_PER_BLOCK * PTRS_PER_BLOCK * PTRS_PER_BLOCK;

/// Converts a data-area block id into its first sector.
pub fn block_to_sector(block_id: u32) -> u32 {
	DATA_AREA_SECTOR + block_id * SECTORS_PER_BLOCK
}

pub(crate) fn block_bitmap_region() -> BitmapRegion {
	BitmapRegion {
		start_sector: crate::superblock::BLOCK_BITMAP_SECTOR,
		sectors: crate::superblock::BLOCK_BITMAP_SECTORS,
	}
}

/// Claims a fresh block and initializes it as an all-sentinel pointer table: every one of
/// its 1024 slots reads back as `-1`. Used for every indirect tree node, since a child
/// lookup interprets uninitialized bytes as valid block ids otherwise.
fn alloc_pointer_block(cache: &mut SectorCache) -> Result<u32> {
	let id = bitmap::alloc(cache, block_bitmap_region(), MAX_BLOCKS)?;
	let sentinel_word = SENTINEL.to_le_bytes();
	let mut sector = [0u8; 512];
	for chunk in sector.chunks_exact_mut(4) {
		chunk.copy_from_slice(&sentinel_word);
	}
	for sector_in_block in 0..SECTORS_PER_BLOCK {
		cache.write_sector(block_to_sector(id) + sector_in_block, &sector)?;
	}
	Ok(id)
}

/// Claims a fresh block and zero-fills it, for plain file/directory data rather than a
/// pointer table.
fn alloc_data_block(cache: &mut SectorCache) -> Result<u32> {
	let id = bitmap::alloc(cache, block_bitmap_region(), MAX_BLOCKS)?;
	let sector = [0u8; 512];
	for sector_in_block in 0..SECTORS_PER_BLOCK {
		cache.write_sector(block_to_sector(id) + sector_in_block, &sector)?;
	}
	Ok(id)
}

fn read_ptr(cache: &mut SectorCache, block_id: u32, index: usize) -> Result<i32> {
	let byte_off = index * 4;
	let sector = block_to_sector(block_id) + (byte_off / 512) as u32;
	let in_sector = byte_off % 512;
	let mut buf = [0u8; 512];
	cache.read_sector(sector, &mut buf)?;
	Ok(i32::from_le_bytes(buf[in_sector..in_sector + 4].try_into().unwrap()))
}

fn write_ptr(cache: &mut SectorCache, block_id: u32, index: usize, value: i32) -> Result<()> {
	let byte_off = index * 4;
	let sector = block_to_sector(block_id) + (byte_off / 512) as u32;
	let in_sector = byte_off % 512;
	let mut buf = [0u8; 512];
	cache.read_sector(sector, &mut buf)?;
	buf[in_sector..in_sector + 4].copy_from_slice(&value.to_le_bytes());
	cache.write_sector(sector, &buf)?;
	Ok(())
}

/// Walks (and optionally allocates along) one level of indirection, returning the block
/// id stored at `index` within the block named by `holder`, allocating `holder` itself if
/// it was a sentinel and `alloc` is set. `holder` is always a pointer block; `leaf`
/// selects whether the *child* found at `index` is itself another pointer block or the
/// actual data leaf.
fn step(cache: &mut SectorCache, holder: &mut i32, index: usize, alloc: bool, leaf: bool) -> Result<Option<u32>> {
	if *holder == SENTINEL {
		if !alloc {
			return Ok(None);
		}
		*holder = alloc_pointer_block(cache)? as i32;
	}
	let child = read_ptr(cache, *holder as u32, index)?;
	if child == SENTINEL {
		if !alloc {
			return Ok(None);
		}
		let new_block = if leaf { alloc_data_block(cache)? } else { alloc_pointer_block(cache)? };
		write_ptr(cache, *holder as u32, index, new_block as i32)?;
		Ok(Some(new_block))
	} else {
		Ok(Some(child as u32))
	}
}

/// Resolves logical block `index` of `inode` to a physical data block id. When `alloc` is
/// true, missing direct pointers and indirect tree nodes are allocated as needed and the
/// inode's pointer fields are updated in place; the caller is responsible for persisting
/// the inode afterward.
pub fn map_logical_to_physical(cache: &mut SectorCache, inode: &mut Inode, index: usize, alloc: bool) -> Result<Option<u32>> {
	if index < DIRECT_COUNT {
		if inode.block_ptr[index] == SENTINEL {
			if !alloc {
				return Ok(None);
			}
			inode.block_ptr[index] = alloc_data_block(cache)? as i32;
		}
		return Ok(Some(inode.block_ptr[index] as u32));
	}

	if index < SINGLE_MAX {
		let i = index - DIRECT_COUNT;
		let mut holder = inode.indirect1;
		let result = step(cache, &mut holder, i, alloc, true)?;
		inode.indirect1 = holder;
		return Ok(result);
	}

	if index < DOUBLE_MAX {
		let i = index - SINGLE_MAX;
		let outer_index = i / PTRS_PER_BLOCK;
		let inner_index = i % PTRS_PER_BLOCK;
		let mut outer_block = inode.indirect2;
		let Some(mid_block) = step(cache, &mut outer_block, outer_index, alloc, false)? else {
			return Ok(None);
		};
		inode.indirect2 = outer_block;
		let mut mid_holder = mid_block as i32;
		let result = step(cache, &mut mid_holder, inner_index, alloc, true)?;
		return Ok(result);
	}

	if index < TRIPLE_MAX {
		let i = index - DOUBLE_MAX;
		let top_index = i / (PTRS_PER_BLOCK * PTRS_PER_BLOCK);
		let rem = i % (PTRS_PER_BLOCK * PTRS_PER_BLOCK);
		let mid_index = rem / PTRS_PER_BLOCK;
		let inner_index = rem % PTRS_PER_BLOCK;

		let mut top_block = inode.indirect3;
		let Some(mid_block_id) = step(cache, &mut top_block, top_index, alloc, false)? else {
			return Ok(None);
		};
		inode.indirect3 = top_block;

		let mut mid_holder = mid_block_id as i32;
		let Some(leaf_block_id) = step(cache, &mut mid_holder, mid_index, alloc, false)? else {
			return Ok(None);
		};

		let mut leaf_holder = leaf_block_id as i32;
		return step(cache, &mut leaf_holder, inner_index, alloc, true);
	}

	Err(GrfsError::OutOfSpace)
}

/// Releases the data block (and, for indirect pointers, every block it transitively
/// references) named by `block_id`, recursing `depth` levels of indirection (0 = a leaf
/// data/pointer block, 1 = single indirect, 2 = double, 3 = triple).
pub fn release_block_recursive(cache: &mut SectorCache, block_id: u32, depth: u32) -> Result<()> {
	if depth > 0 {
		for i in 0..PTRS_PER_BLOCK {
			let child = read_ptr(cache, block_id, i)?;
			if child != SENTINEL {
				release_block_recursive(cache, child as u32, depth - 1)?;
			}
		}
	}
	bitmap::free(cache, block_bitmap_region(), block_id)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::BlockDevice;
	use crate::inode::MODE_READ;
	use std::env;

	fn temp_cache(name: &str) -> SectorCache {
		let mut path = env::temp_dir();
		path.push(format!("grfs-blockmap-test-{name}-{}", std::process::id()));
		SectorCache::new(BlockDevice::open_or_create(&path).unwrap())
	}

	#[test]
	fn direct_block_allocates_once() {
		let mut cache = temp_cache("direct");
		let mut inode = Inode::new(MODE_READ);
		let a = map_logical_to_physical(&mut cache, &mut inode, 0, true).unwrap().unwrap();
		let b = map_logical_to_physical(&mut cache, &mut inode, 0, true).unwrap().unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn missing_block_without_alloc_is_none() {
		let mut cache = temp_cache("noalloc");
		let mut inode = Inode::new(MODE_READ);
		assert!(map_logical_to_physical(&mut cache, &mut inode, 3, false).unwrap().is_none());
	}

	#[test]
	fn single_indirect_round_trips() {
		let mut cache = temp_cache("single");
		let mut inode = Inode::new(MODE_READ);
		let idx = DIRECT_COUNT + 5;
		let a = map_logical_to_physical(&mut cache, &mut inode, idx, true).unwrap().unwrap();
		let b = map_logical_to_physical(&mut cache, &mut inode, idx, false).unwrap().unwrap();
		assert_eq!(a, b);
		assert_ne!({ inode.indirect1 }, SENTINEL);
	}

	#[test]
	fn double_indirect_round_trips() {
		let mut cache = temp_cache("double");
		let mut inode = Inode::new(MODE_READ);
		let idx = SINGLE_MAX + PTRS_PER_BLOCK + 2;
		let a = map_logical_to_physical(&mut cache, &mut inode, idx, true).unwrap().unwrap();
		let b = map_logical_to_physical(&mut cache, &mut inode, idx, false).unwrap().unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn release_recursive_frees_leaf_and_parent() {
		let mut cache = temp_cache("release");
		let mut inode = Inode::new(MODE_READ);
		let idx = DIRECT_COUNT + 1;
		let leaf = map_logical_to_physical(&mut cache, &mut inode, idx, true).unwrap().unwrap();
		release_block_recursive(&mut cache, inode.indirect1 as u32, 1).unwrap();
		let region = block_bitmap_region();
		// both the indirect block and the leaf should be free again and reusable
		let reused = bitmap::alloc(&mut cache, region, MAX_BLOCKS).unwrap();
		assert!(reused == leaf || reused == inode.indirect1 as u32);
	}
}
