//! On-disk layout constants and the superblock structure.
//!
//! Region offsets are grounded on the host project's own ext2 geometry computation in
//! `mkfs::ext2::Ext2Factory::create` (block/inode bitmaps, inode table, data area laid out
//! back to back from fixed offsets), simplified to the single fixed geometry this
//! filesystem always uses — there are no block groups here, just one of each region.

use crate::raw;
use std::mem::size_of;
use utils::util::ceil_division;
use utils::util::pow2;

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 512;
/// `log2` of [`BLOCK_SIZE`]; block size is derived from it the way the teacher's
/// `Superblock::get_block_size` derives its block size from a stored log2 rather than a
/// bare literal.
const BLOCK_SIZE_LOG: u32 = 12;
/// Bytes per block; the filesystem's allocation unit.
pub const BLOCK_SIZE: usize = pow2(BLOCK_SIZE_LOG) as usize;
/// Sectors per block.
pub const SECTORS_PER_BLOCK: u32 = ceil_division(BLOCK_SIZE as u32, SECTOR_SIZE as u32);

/// Sector offset of the superblock.
pub const SUPERBLOCK_SECTOR: u32 = 0;
/// Sector offset of the block bitmap.
pub const BLOCK_BITMAP_SECTOR: u32 = 8;
/// Length in sectors of the block bitmap.
pub const BLOCK_BITMAP_SECTORS: u32 = 32;
/// Sector offset of the inode bitmap.
pub const INODE_BITMAP_SECTOR: u32 = 40;
/// Length in sectors of the inode bitmap.
pub const INODE_BITMAP_SECTORS: u32 = 1;
/// Sector offset of the inode table.
pub const INODE_TABLE_SECTOR: u32 = 41;
/// Length in sectors of the inode table.
pub const INODE_TABLE_SECTORS: u32 = 31;
/// Sector offset of the data area (blocks, indirect pointer blocks).
pub const DATA_AREA_SECTOR: u32 = 72;

/// Size in bytes of one on-disk inode.
pub const INODE_SIZE: u32 = 64;
/// Number of inodes that fit in the inode table.
pub const MAX_INODES: u32 = ceil_division(INODE_TABLE_SECTORS * SECTOR_SIZE as u32, INODE_SIZE);

/// Total sectors in the image (matches [`crate::device::TOTAL_SECTORS`]).
pub const TOTAL_SECTORS: u64 = 1_048_576;
/// Number of whole blocks available in the data area.
///
/// Block ids handed out by the allocator are 0-based indices into this area — block `0` is
/// the first block after [`DATA_AREA_SECTOR`], not an absolute image block number. This
/// keeps `used_blocks` tracking only data allocations, matching the round-trip law that
/// `mkfs` followed by `statfs` reports `used_blocks = 1` (the root directory's first data
/// block), not 1 plus the metadata regions.
pub const MAX_BLOCKS: u32 = ceil_division((TOTAL_SECTORS as u32) - DATA_AREA_SECTOR, SECTORS_PER_BLOCK);

/// Root inode number; `mkfs` guarantees the root directory receives this id.
pub const ROOT_INODE: u32 = 0;

/// Superblock magic identifying a formatted image.
pub const MAGIC: u32 = 0xDF4C_4459;

/// Maximum length of the filesystem label stored in the superblock.
const NAME_LEN: usize = 32;

/// The on-disk superblock: magic, geometry, and allocation counters.
///
/// Sized to exactly one sector so it can be written atomically to [`SUPERBLOCK_SECTOR`].
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
	pub magic: u32,
	pub block_bitmap_sector: u32,
	pub block_bitmap_sectors: u32,
	pub inode_bitmap_sector: u32,
	pub inode_bitmap_sectors: u32,
	pub inode_table_sector: u32,
	pub inode_table_sectors: u32,
	pub data_area_sector: u32,
	pub used_inodes: u32,
	pub max_inodes: u32,
	pub used_blocks: u32,
	pub max_blocks: u32,
	pub root_inode: u32,
	pub name: [u8; NAME_LEN],
	_padding: [u8; SECTOR_SIZE
		- (13 * size_of::<u32>())
		- NAME_LEN],
}

const _: () = assert!(size_of::<Superblock>() == SECTOR_SIZE);

impl Superblock {
	/// Builds a fresh superblock for a newly formatted image.
	pub fn fresh(label: &str) -> Self {
		let mut name = [0u8; NAME_LEN];
		let bytes = label.as_bytes();
		let n = bytes.len().min(NAME_LEN);
		name[..n].copy_from_slice(&bytes[..n]);

		Self {
			magic: MAGIC,
			block_bitmap_sector: BLOCK_BITMAP_SECTOR,
			block_bitmap_sectors: BLOCK_BITMAP_SECTORS,
			inode_bitmap_sector: INODE_BITMAP_SECTOR,
			inode_bitmap_sectors: INODE_BITMAP_SECTORS,
			inode_table_sector: INODE_TABLE_SECTOR,
			inode_table_sectors: INODE_TABLE_SECTORS,
			data_area_sector: DATA_AREA_SECTOR,
			used_inodes: 0,
			max_inodes: MAX_INODES,
			used_blocks: 0,
			max_blocks: MAX_BLOCKS,
			root_inode: ROOT_INODE,
			name,
			_padding: [0; SECTOR_SIZE - (13 * size_of::<u32>()) - NAME_LEN],
		}
	}

	/// Reads the superblock out of a raw sector buffer.
	pub fn from_sector(buf: &[u8; SECTOR_SIZE]) -> Self {
		raw::from_bytes(buf)
	}

	/// Serializes the superblock into a raw sector buffer.
	pub fn to_sector(&self, buf: &mut [u8; SECTOR_SIZE]) {
		raw::to_bytes(self, buf)
	}

	/// Returns the filesystem label as a string, stopping at the first NUL.
	pub fn label(&self) -> &str {
		let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
		std::str::from_utf8(&self.name[..end]).unwrap_or("")
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn roundtrip() {
		let sb = Superblock::fresh("grfs");
		let mut buf = [0u8; SECTOR_SIZE];
		sb.to_sector(&mut buf);
		let sb2 = Superblock::from_sector(&buf);
		assert_eq!({ sb2.magic }, MAGIC);
		assert_eq!(sb2.label(), "grfs");
		assert_eq!({ sb2.root_inode }, ROOT_INODE);
	}

	#[test]
	fn geometry_is_consistent() {
		assert_eq!(MAX_INODES, 248);
		assert_eq!(MAX_BLOCKS, 131_063);
	}
}
