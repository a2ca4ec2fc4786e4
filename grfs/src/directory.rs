//! Directory entry scanning, path resolution, and the four directory-mutating
//! operations (`add_dir`, `add_file`, `del_dir`, `del_file`).
//!
//! Grounded on the dentry layout implied by the host project's packed on-disk records
//! (fixed-size name plus id, scanned linearly): this module is the part with no direct
//! counterpart in the host project, since `mkfs` only ever writes the root directory's
//! two literal entries and never searches or grows a directory afterward.

use crate::blockmap;
use crate::cache::SectorCache;
use crate::dirent::DirEntry;
use crate::dirent::ENTRIES_PER_BLOCK;
use crate::dirent::ENTRIES_PER_SECTOR;
use crate::error::GrfsError;
use crate::error::Result;
use crate::inode::Inode;
use crate::inode::MODE_DIR;
use crate::inode::MODE_EXEC;
use crate::inode::MODE_READ;
use crate::inode::MODE_WRITE;
use crate::itable;
use crate::superblock::SECTOR_SIZE;

const DOT: &str = ".";
const DOTDOT: &str = "..";

fn entry_location(block_id: u32, entry_in_block: usize) -> (u32, usize) {
	let sector_in_block = (entry_in_block / ENTRIES_PER_SECTOR) as u32;
	let in_sector = (entry_in_block % ENTRIES_PER_SECTOR) * 32;
	(blockmap::block_to_sector(block_id) + sector_in_block, in_sector)
}

fn read_entry(cache: &mut SectorCache, block_id: u32, entry_in_block: usize) -> Result<DirEntry> {
	let (sector, offset) = entry_location(block_id, entry_in_block);
	let mut buf = [0u8; SECTOR_SIZE];
	cache.read_sector(sector, &mut buf)?;
	Ok(DirEntry::from_bytes(&buf[offset..offset + 32]))
}

fn write_entry(cache: &mut SectorCache, block_id: u32, entry_in_block: usize, entry: &DirEntry) -> Result<()> {
	let (sector, offset) = entry_location(block_id, entry_in_block);
	let mut buf = [0u8; SECTOR_SIZE];
	cache.read_sector(sector, &mut buf)?;
	entry.to_bytes(&mut buf[offset..offset + 32]);
	cache.write_sector(sector, &buf)?;
	Ok(())
}

/// Marks every slot of a freshly allocated directory data block empty. Data blocks come
/// back zero-filled from the block allocator, and a zeroed `DirEntry.inode` reads as `0`
/// (a legitimate inode id, not the `-1` empty sentinel), so a directory's growth blocks
/// need this explicit pass before any lookup can trust `is_empty()` on them.
pub(crate) fn init_directory_block(cache: &mut SectorCache, block_id: u32) -> Result<()> {
	let empty = DirEntry::empty();
	for slot in 0..ENTRIES_PER_BLOCK {
		write_entry(cache, block_id, slot, &empty)?;
	}
	Ok(())
}

/// Writes the literal `.`/`..` entries of a freshly allocated, already-empty-initialized
/// directory block. Used both by [`add_dir`] and by `mkfs`'s self-parented root.
pub(crate) fn bootstrap_dots(cache: &mut SectorCache, block_id: u32, self_id: u32, parent_id: u32) -> Result<()> {
	write_entry(cache, block_id, 0, &DirEntry::new(DOT, self_id))?;
	write_entry(cache, block_id, 1, &DirEntry::new(DOTDOT, parent_id))?;
	Ok(())
}

/// Lists every live entry of `dir_id` as `(name, inode id)` pairs, in block-linear order.
pub fn list_entries(cache: &mut SectorCache, dir_id: u32) -> Result<Vec<(String, u32)>> {
	let dir_inode = itable::read(cache, dir_id)?;
	let size = dir_inode.size;
	let mut seen = 0u32;
	let mut logical = 0usize;
	let mut out = Vec::new();
	while seen < size {
		let mut scratch = dir_inode;
		let Some(block_id) = blockmap::map_logical_to_physical(cache, &mut scratch, logical, false)? else {
			break;
		};
		for slot in 0..ENTRIES_PER_BLOCK {
			let entry = read_entry(cache, block_id, slot)?;
			if entry.is_empty() {
				continue;
			}
			out.push((entry.name_str().to_string(), entry.inode as u32));
			seen += 1;
			if seen >= size {
				break;
			}
		}
		logical += 1;
	}
	Ok(out)
}

/// Scans `dir_id`'s entries in block-linear order for `name`, stopping once as many
/// non-empty entries have been seen as `size` reports. Returns the entry's location
/// (block id, slot within block) and inode id on a match.
pub fn find_by_name(cache: &mut SectorCache, dir_id: u32, name: &str) -> Result<Option<(u32, usize, u32)>> {
	let dir_inode = itable::read(cache, dir_id)?;
	let size = dir_inode.size;
	let mut seen = 0u32;
	let mut logical = 0usize;
	loop {
		let mut scratch = dir_inode;
		let Some(block_id) = blockmap::map_logical_to_physical(cache, &mut scratch, logical, false)? else {
			return Ok(None);
		};
		for slot in 0..ENTRIES_PER_BLOCK {
			let entry = read_entry(cache, block_id, slot)?;
			if entry.is_empty() {
				continue;
			}
			if entry.name_str() == name {
				return Ok(Some((block_id, slot, entry.inode as u32)));
			}
			seen += 1;
			if seen >= size {
				return Ok(None);
			}
		}
		logical += 1;
	}
}

/// Finds the first empty directory-entry slot in `dir_id`, allocating a fresh data block
/// (and persisting the inode's updated pointers) only once every existing block has been
/// scanned and found full.
pub fn find_empty(cache: &mut SectorCache, dir_id: u32) -> Result<(u32, usize)> {
	let mut dir_inode = itable::read(cache, dir_id)?;
	let mut logical = 0usize;
	loop {
		match blockmap::map_logical_to_physical(cache, &mut dir_inode, logical, false)? {
			Some(block_id) => {
				for slot in 0..ENTRIES_PER_BLOCK {
					if read_entry(cache, block_id, slot)?.is_empty() {
						return Ok((block_id, slot));
					}
				}
				logical += 1;
			}
			None => {
				let block_id = blockmap::map_logical_to_physical(cache, &mut dir_inode, logical, true)?
					.expect("allocating block must yield an id");
				init_directory_block(cache, block_id)?;
				itable::write(cache, dir_id, &dir_inode)?;
				return Ok((block_id, 0));
			}
		}
	}
}

/// Tokenizes `path` by `/`, collapsing repeated separators and dropping empty segments.
/// Returns whether the path is rooted and the surviving components.
pub fn split_path(path: &str) -> (bool, Vec<&str>) {
	let rooted = path.starts_with('/');
	let components = path.split('/').filter(|s| !s.is_empty()).collect();
	(rooted, components)
}

/// Walks `components` starting from `origin_ino`, using `.`/`..` as ordinary entries
/// (both are written as literal dentries at directory-birth time, so no special-casing is
/// needed here). Fails with `MissingComponent` on the first absent name, or
/// `NotADirectory` if an intermediate component names a file.
pub fn walk_path(cache: &mut SectorCache, origin_ino: u32, components: &[&str]) -> Result<u32> {
	let mut current = origin_ino;
	for (i, component) in components.iter().enumerate() {
		let inode = itable::read(cache, current)?;
		if !inode.is_dir() {
			return Err(GrfsError::NotADirectory);
		}
		let Some((_, _, next)) = find_by_name(cache, current, component)? else {
			return Err(GrfsError::MissingComponent);
		};
		current = next;
		let _ = i;
	}
	Ok(current)
}

/// Splits `path` into its parent directory's components and its final component, the way
/// every mutating operation needs (resolve the parent, then act on the last name). A path
/// with no surviving final component (root, or a path made entirely of `/`) yields an
/// empty final name, which callers reject as appropriate.
pub fn resolve_parent<'a>(cache: &mut SectorCache, root_ino: u32, cwd_ino: u32, path: &'a str) -> Result<(u32, &'a str)> {
	if path.is_empty() || path.len() > 256 {
		return Err(GrfsError::InvalidPath);
	}
	let (rooted, components) = split_path(path);
	let origin = if rooted { root_ino } else { cwd_ino };
	if components.is_empty() {
		return Ok((origin, ""));
	}
	let (parent_components, name) = components.split_at(components.len() - 1);
	let parent = walk_path(cache, origin, parent_components)?;
	Ok((parent, name[0]))
}

fn default_file_mode() -> u16 {
	MODE_READ | MODE_WRITE
}

fn default_dir_mode() -> u16 {
	MODE_DIR | MODE_READ | MODE_WRITE | MODE_EXEC
}

/// Creates directory `name` under `parent`: a fresh inode holding one data block whose
/// first two entries are the literal `.`/`..` dentries.
pub fn add_dir(cache: &mut SectorCache, parent_id: u32, name: &str) -> Result<u32> {
	if name.is_empty() || name == DOT || name == DOTDOT || name.len() > crate::dirent::NAME_LEN {
		return Err(GrfsError::InvalidPath);
	}
	if find_by_name(cache, parent_id, name)?.is_some() {
		return Err(GrfsError::Exists);
	}

	let mut new_inode = Inode::new(default_dir_mode());
	let new_id = itable::alloc(cache, &new_inode)?;

	let block_id = blockmap::map_logical_to_physical(cache, &mut new_inode, 0, true)?.expect("fresh directory needs a block");
	init_directory_block(cache, block_id)?;
	bootstrap_dots(cache, block_id, new_id, parent_id)?;
	new_inode.size = 2;
	itable::write(cache, new_id, &new_inode)?;

	let (slot_block, slot_index) = find_empty(cache, parent_id)?;
	write_entry(cache, slot_block, slot_index, &DirEntry::new(name, new_id))?;

	let mut parent = itable::read(cache, parent_id)?;
	parent.size += 1;
	itable::write(cache, parent_id, &parent)?;

	Ok(new_id)
}

/// Creates regular file `name` under `parent`, or, when `link_target` is given, adds a new
/// entry pointing at that existing inode and bumps its link count (refusing a target whose
/// links have already dropped to zero).
pub fn add_file(cache: &mut SectorCache, parent_id: u32, name: &str, link_target: Option<u32>) -> Result<u32> {
	if name.is_empty() || name == DOT || name == DOTDOT || name.len() > crate::dirent::NAME_LEN {
		return Err(GrfsError::InvalidPath);
	}
	if find_by_name(cache, parent_id, name)?.is_some() {
		return Err(GrfsError::Exists);
	}

	let file_id = match link_target {
		Some(target_id) => {
			let mut target = itable::read(cache, target_id)?;
			if target.nlinks == 0 {
				return Err(GrfsError::LinkToZombie);
			}
			target.nlinks += 1;
			itable::write(cache, target_id, &target)?;
			target_id
		}
		None => itable::alloc(cache, &Inode::new(default_file_mode()))?,
	};

	let (slot_block, slot_index) = find_empty(cache, parent_id)?;
	write_entry(cache, slot_block, slot_index, &DirEntry::new(name, file_id))?;

	let mut parent = itable::read(cache, parent_id)?;
	parent.size += 1;
	itable::write(cache, parent_id, &parent)?;

	Ok(file_id)
}

/// Removes directory entry `name` from `parent`, refusing the root, the current working
/// directory, or a directory that still holds entries beyond `.`/`..`.
pub fn del_dir(cache: &mut SectorCache, parent_id: u32, name: &str, root_ino: u32, cwd_ino: u32) -> Result<()> {
	let Some((block_id, slot, child_id)) = find_by_name(cache, parent_id, name)? else {
		return Err(GrfsError::MissingComponent);
	};
	if child_id == root_ino || child_id == cwd_ino {
		return Err(GrfsError::Protected);
	}
	let mut child = itable::read(cache, child_id)?;
	if !child.is_dir() {
		return Err(GrfsError::NotADirectory);
	}
	if child.size > 2 && child.nlinks == 1 {
		return Err(GrfsError::NotEmpty);
	}

	child.nlinks -= 1;
	if child.nlinks == 0 {
		itable::release(cache, child_id)?;
	} else {
		itable::write(cache, child_id, &child)?;
	}

	write_entry(cache, block_id, slot, &DirEntry::empty())?;
	let mut parent = itable::read(cache, parent_id)?;
	parent.size -= 1;
	itable::write(cache, parent_id, &parent)?;
	Ok(())
}

/// Removes file entry `name` from `parent`, refusing a directory target.
pub fn del_file(cache: &mut SectorCache, parent_id: u32, name: &str) -> Result<()> {
	let Some((block_id, slot, child_id)) = find_by_name(cache, parent_id, name)? else {
		return Err(GrfsError::MissingComponent);
	};
	let mut child = itable::read(cache, child_id)?;
	if child.is_dir() {
		return Err(GrfsError::IsADirectory);
	}

	child.nlinks -= 1;
	if child.nlinks == 0 {
		itable::release(cache, child_id)?;
	} else {
		itable::write(cache, child_id, &child)?;
	}

	write_entry(cache, block_id, slot, &DirEntry::empty())?;
	let mut parent = itable::read(cache, parent_id)?;
	parent.size -= 1;
	itable::write(cache, parent_id, &parent)?;
	Ok(())
}
