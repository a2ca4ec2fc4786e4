//! The filesystem façade: bundles the superblock, cache, descriptor table, and current
//! working directory into one value, and exposes the operations the shell (or any other
//! embedder) drives.
//!
//! Grounded on the host project's own `mkfs` entry point (`Ext2Factory::create`) for
//! `mkfs`/`statfs`, and generalized path-command handling has no direct counterpart in the
//! host project, which never walks a namespace it creates.

use crate::bitmap;
use crate::blockmap;
use crate::cache::SectorCache;
use crate::device::BlockDevice;
use crate::directory;
use crate::error::GrfsError;
use crate::error::Result;
use crate::fd::DescriptorTable;
use crate::fd::OpenMode;
use crate::fd::Whence;
use crate::inode::Inode;
use crate::inode::MODE_DIR;
use crate::inode::MODE_EXEC;
use crate::inode::MODE_READ;
use crate::inode::MODE_WRITE;
use crate::inode::format_mode;
use crate::itable;
use crate::superblock::MAGIC;
use crate::superblock::MAX_BLOCKS;
use crate::superblock::MAX_INODES;
use crate::superblock::ROOT_INODE;
use crate::superblock::SECTOR_SIZE;
use crate::superblock::Superblock;
use std::path::Path;
use std::sync::Mutex;
use utils::util::ByteSize;

/// What a looked-up path names, for the `find` command.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeKind {
	Missing,
	File,
	Directory,
}

/// One entry of an `ls` listing.
pub struct Listing {
	pub name: String,
	pub inode_id: u32,
	pub mode: String,
	pub nlinks: u16,
	pub size: u32,
}

/// Bundles every piece of mutable filesystem state behind one value, per the redesign
/// decision to collapse global state into a single struct whose entry points take
/// `&mut self`.
pub struct Filesystem {
	cache: SectorCache,
	sb: Superblock,
	descriptors: DescriptorTable,
	cwd: u32,
	cwd_stack: Vec<String>,
}

impl Filesystem {
	/// Opens (creating if absent) the image at `path` and loads its superblock, whatever
	/// it currently contains — callers are expected to follow up with `mkfs` on a fresh
	/// image before doing anything else.
	pub fn open(path: &Path) -> Result<Self> {
		let device = BlockDevice::open_or_create(path)?;
		let mut cache = SectorCache::new(device);
		let mut buf = [0u8; SECTOR_SIZE];
		cache.read_sector(crate::superblock::SUPERBLOCK_SECTOR, &mut buf)?;
		let sb = Superblock::from_sector(&buf);
		Ok(Self {
			cache,
			sb,
			descriptors: DescriptorTable::new(),
			cwd: ROOT_INODE,
			cwd_stack: Vec::new(),
		})
	}

	fn is_formatted(&self) -> bool {
		self.sb.magic == MAGIC
	}

	/// Recomputes `used_inodes`/`used_blocks` from the bitmaps themselves and persists the
	/// superblock, rather than tracking deltas by hand at every call site that might
	/// allocate an unknown number of blocks (an indirect-tree write can allocate several
	/// in one call).
	fn refresh_counters(&mut self) -> Result<()> {
		self.sb.used_inodes = bitmap::count_used(&mut self.cache, itable::inode_bitmap_region(), MAX_INODES)?;
		self.sb.used_blocks = bitmap::count_used(&mut self.cache, blockmap::block_bitmap_region(), MAX_BLOCKS)?;
		self.write_superblock()
	}

	fn write_superblock(&mut self) -> Result<()> {
		let mut buf = [0u8; SECTOR_SIZE];
		self.sb.to_sector(&mut buf);
		self.cache.write_sector(crate::superblock::SUPERBLOCK_SECTOR, &buf)?;
		Ok(())
	}

	/// Formats the image: a fresh superblock, zeroed bitmaps, and a root directory whose
	/// parent is itself. Refuses with `AlreadyExists` if the magic is already present.
	/// Grounded on `Ext2Factory::create`'s ordering: region-by-region, superblock last.
	pub fn mkfs(&mut self, label: &str) -> Result<()> {
		if self.is_formatted() {
			return Err(GrfsError::AlreadyExists);
		}

		bitmap::fill_prefix(&mut self.cache, itable::inode_bitmap_region(), 0)?;
		bitmap::fill_prefix(&mut self.cache, blockmap::block_bitmap_region(), 0)?;
		self.cache.flush()?;

		let mut root = Inode::new(MODE_DIR | MODE_READ | MODE_WRITE | MODE_EXEC);
		let root_id = itable::alloc(&mut self.cache, &root)?;
		debug_assert_eq!(root_id, ROOT_INODE);

		let block_id = blockmap::map_logical_to_physical(&mut self.cache, &mut root, 0, true)?.expect("fresh root needs a block");
		directory::init_directory_block(&mut self.cache, block_id)?;
		directory::bootstrap_dots(&mut self.cache, block_id, root_id, root_id)?;
		root.size = 2;
		itable::write(&mut self.cache, root_id, &root)?;

		self.sb = Superblock::fresh(label);
		self.cwd = ROOT_INODE;
		self.cwd_stack.clear();
		self.refresh_counters()?;
		self.cache.flush()?;
		Ok(())
	}

	/// Renders superblock geometry, utilization, and human-friendly size figures.
	pub fn statfs(&self) -> String {
		let used_bytes = ByteSize((self.sb.used_blocks as u64) * (crate::superblock::BLOCK_SIZE as u64));
		let total_bytes = ByteSize((self.sb.max_blocks as u64) * (crate::superblock::BLOCK_SIZE as u64));
		let inode_pct = if self.sb.max_inodes > 0 {
			(self.sb.used_inodes as f64 / self.sb.max_inodes as f64) * 100.0
		} else {
			0.0
		};
		let block_pct = if self.sb.max_blocks > 0 {
			(self.sb.used_blocks as f64 / self.sb.max_blocks as f64) * 100.0
		} else {
			0.0
		};
		let (used_inodes, max_inodes, used_blocks, max_blocks) = (self.sb.used_inodes, self.sb.max_inodes, self.sb.used_blocks, self.sb.max_blocks);
		format!(
			"label: {}\ninodes: {used_inodes}/{max_inodes} ({inode_pct:.1}%)\nblocks: {used_blocks}/{max_blocks} ({block_pct:.1}%)\nused: {used_bytes} / {total_bytes}",
			self.sb.label(),
		)
	}

	fn resolve_parent<'a>(&mut self, path: &'a str) -> Result<(u32, &'a str)> {
		directory::resolve_parent(&mut self.cache, ROOT_INODE, self.cwd, path)
	}

	fn resolve_full(&mut self, path: &str) -> Result<u32> {
		let (rooted, components) = directory::split_path(path);
		let origin = if rooted { ROOT_INODE } else { self.cwd };
		directory::walk_path(&mut self.cache, origin, &components)
	}

	/// Probes `path`, reporting whether it names a directory, a file, or nothing.
	pub fn find(&mut self, path: &str) -> NodeKind {
		match self.resolve_full(path) {
			Ok(id) => match itable::read(&mut self.cache, id) {
				Ok(inode) if inode.is_dir() => NodeKind::Directory,
				Ok(_) => NodeKind::File,
				Err(_) => NodeKind::Missing,
			},
			Err(_) => NodeKind::Missing,
		}
	}

	/// Changes the current working directory, updating the human-readable path stack
	/// alongside the resolved inode id.
	pub fn cd(&mut self, path: &str) -> Result<()> {
		let target = self.resolve_full(path)?;
		let inode = itable::read(&mut self.cache, target)?;
		if !inode.is_dir() {
			return Err(GrfsError::NotADirectory);
		}
		let (rooted, components) = directory::split_path(path);
		if rooted {
			self.cwd_stack.clear();
		}
		for component in components {
			match component {
				"." => {}
				".." => {
					self.cwd_stack.pop();
				}
				name => self.cwd_stack.push(name.to_string()),
			}
		}
		self.cwd = target;
		Ok(())
	}

	/// The current working directory as a `/`-joined absolute path.
	pub fn pwd(&self) -> String {
		if self.cwd_stack.is_empty() {
			"/".to_string()
		} else {
			format!("/{}", self.cwd_stack.join("/"))
		}
	}

	/// Lists `path` (or the cwd if `None`): every directory entry, `.`/`..` included only
	/// when `all` is set.
	pub fn ls(&mut self, path: Option<&str>, all: bool) -> Result<Vec<Listing>> {
		let dir_id = match path {
			Some(p) => self.resolve_full(p)?,
			None => self.cwd,
		};
		let dir_inode = itable::read(&mut self.cache, dir_id)?;
		if !dir_inode.is_dir() {
			return Err(GrfsError::NotADirectory);
		}
		let entries = directory::list_entries(&mut self.cache, dir_id)?;
		let mut out = Vec::new();
		for (name, inode_id) in entries {
			if !all && (name == "." || name == "..") {
				continue;
			}
			let inode = itable::read(&mut self.cache, inode_id)?;
			out.push(Listing {
				name,
				inode_id,
				mode: format_mode(inode.mode),
				nlinks: inode.nlinks,
				size: inode.size,
			});
		}
		Ok(out)
	}

	pub fn mkdir(&mut self, path: &str) -> Result<()> {
		let (parent, name) = self.resolve_parent(path)?;
		if name.is_empty() {
			return Err(GrfsError::Exists);
		}
		directory::add_dir(&mut self.cache, parent, name)?;
		self.refresh_counters()
	}

	pub fn rmdir(&mut self, path: &str) -> Result<()> {
		let (parent, name) = self.resolve_parent(path)?;
		if name.is_empty() {
			return Err(GrfsError::Protected);
		}
		directory::del_dir(&mut self.cache, parent, name, ROOT_INODE, self.cwd)?;
		self.refresh_counters()
	}

	/// Creates an empty file at `path` if absent; a no-op if it already exists.
	pub fn touch(&mut self, path: &str) -> Result<()> {
		let (parent, name) = self.resolve_parent(path)?;
		if name.is_empty() {
			return Err(GrfsError::InvalidPath);
		}
		match directory::add_file(&mut self.cache, parent, name, None) {
			Ok(_) | Err(GrfsError::Exists) => self.refresh_counters(),
			Err(e) => Err(e),
		}
	}

	/// Reads the entire contents of the regular file at `path`.
	pub fn cat(&mut self, path: &str) -> Result<Vec<u8>> {
		let id = self.resolve_full(path)?;
		let inode = itable::read(&mut self.cache, id)?;
		if inode.is_dir() {
			return Err(GrfsError::IsADirectory);
		}
		let fd = self.descriptors.open(id, OpenMode::ReadOnly, 0)?;
		let mut out = vec![0u8; inode.size as usize];
		self.descriptors.read(&mut self.cache, fd, &mut out)?;
		self.descriptors.close(fd)?;
		Ok(out)
	}

	/// Writes (`append = false`) or appends (`append = true`) `data` to the file at
	/// `path`, creating it first if it does not exist. A non-append write onto an
	/// existing file drops the old binding and recreates it empty under the same name,
	/// the way the host project's `run_echo` `do_rmnod`s an existing `>` target before
	/// reopening it, so a shorter overwrite can't leave stale trailing bytes behind.
	pub fn echo_to_file(&mut self, path: &str, data: &[u8], append: bool) -> Result<()> {
		let (parent, name) = self.resolve_parent(path)?;
		if name.is_empty() {
			return Err(GrfsError::InvalidPath);
		}
		let id = match directory::find_by_name(&mut self.cache, parent, name)? {
			Some((_, _, existing)) => {
				let inode = itable::read(&mut self.cache, existing)?;
				if inode.is_dir() {
					return Err(GrfsError::IsADirectory);
				}
				if append {
					existing
				} else {
					directory::del_file(&mut self.cache, parent, name)?;
					directory::add_file(&mut self.cache, parent, name, None)?
				}
			}
			None => directory::add_file(&mut self.cache, parent, name, None)?,
		};
		let mode = if append { OpenMode::WriteOnly } else { OpenMode::ReadWrite };
		let fd = self.descriptors.open(id, mode, 0)?;
		if append {
			self.descriptors.lseek(&mut self.cache, fd, 0, Whence::End)?;
		} else {
			self.descriptors.lseek(&mut self.cache, fd, 0, Whence::Set)?;
		}
		self.descriptors.write(&mut self.cache, fd, data)?;
		self.descriptors.close(fd)?;
		self.refresh_counters()
	}

	/// Hard-links `src` to `dst`. A `dst` whose final component already names an existing
	/// directory (including the bare root) fails with `Exists` rather than attempting to
	/// create an entry inside it.
	pub fn link(&mut self, src: &str, dst: &str) -> Result<()> {
		let src_id = self.resolve_full(src)?;
		let src_inode = itable::read(&mut self.cache, src_id)?;
		if src_inode.is_dir() {
			return Err(GrfsError::IsADirectory);
		}

		let (dst_parent, dst_name) = self.resolve_parent(dst)?;
		if dst_name.is_empty() {
			return Err(GrfsError::Exists);
		}
		directory::add_file(&mut self.cache, dst_parent, dst_name, Some(src_id))?;
		self.refresh_counters()
	}

	pub fn rmnod(&mut self, path: &str) -> Result<()> {
		let (parent, name) = self.resolve_parent(path)?;
		if name.is_empty() {
			return Err(GrfsError::IsADirectory);
		}
		directory::del_file(&mut self.cache, parent, name)?;
		self.refresh_counters()
	}

	/// Removes whatever `path` names: a file via `del_file`, a directory via `del_dir`.
	pub fn rm(&mut self, path: &str) -> Result<()> {
		let (parent, name) = self.resolve_parent(path)?;
		if name.is_empty() {
			return Err(GrfsError::Protected);
		}
		let Some((_, _, child_id)) = directory::find_by_name(&mut self.cache, parent, name)? else {
			return Err(GrfsError::MissingComponent);
		};
		let child = itable::read(&mut self.cache, child_id)?;
		if child.is_dir() {
			directory::del_dir(&mut self.cache, parent, name, ROOT_INODE, self.cwd)?;
		} else {
			directory::del_file(&mut self.cache, parent, name)?;
		}
		self.refresh_counters()
	}

	/// Opens `path` under `mode` for `owner`, creating a fresh regular file if the final
	/// component does not exist.
	pub fn fopen(&mut self, path: &str, mode: OpenMode, owner: u32) -> Result<usize> {
		let (parent, name) = self.resolve_parent(path)?;
		if name.is_empty() {
			return Err(GrfsError::InvalidPath);
		}
		let id = match directory::find_by_name(&mut self.cache, parent, name)? {
			Some((_, _, existing)) => {
				let inode = itable::read(&mut self.cache, existing)?;
				if inode.is_dir() {
					return Err(GrfsError::IsADirectory);
				}
				existing
			}
			None => {
				let id = directory::add_file(&mut self.cache, parent, name, None)?;
				self.refresh_counters()?;
				id
			}
		};
		self.descriptors.open(id, mode, owner)
	}

	pub fn fread(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize> {
		self.descriptors.read(&mut self.cache, fd, buf)
	}

	pub fn fwrite(&mut self, fd: usize, buf: &[u8]) -> Result<usize> {
		let n = self.descriptors.write(&mut self.cache, fd, buf)?;
		self.refresh_counters()?;
		Ok(n)
	}

	pub fn flseek(&mut self, fd: usize, off: i64, whence: Whence) -> Result<u64> {
		self.descriptors.lseek(&mut self.cache, fd, off, whence)
	}

	pub fn fclose(&mut self, fd: usize) -> Result<()> {
		self.descriptors.close(fd)
	}

	pub fn reap_by_owner(&mut self, owner: u32) {
		self.descriptors.reap_by_owner(owner)
	}

	/// Writes back every dirty cached block, the durability boundary a caller crosses
	/// before closing the image and reopening it elsewhere.
	pub fn sync(&mut self) -> Result<()> {
		self.cache.flush()?;
		Ok(())
	}
}

/// Wraps a [`Filesystem`] behind a mutex used purely for reentrancy detection: this
/// process is single-threaded, so `try_lock` only ever fails when an entry point calls
/// back into another entry point while its own guard is still held, which is a bug.
pub struct FsLock(Mutex<Filesystem>);

impl FsLock {
	pub fn new(fs: Filesystem) -> Self {
		Self(Mutex::new(fs))
	}

	/// Runs `f` against the guarded filesystem. Panics if the lock is already held by the
	/// current call stack.
	pub fn with<R>(&self, f: impl FnOnce(&mut Filesystem) -> R) -> R {
		let mut guard = self.0.try_lock().expect("reentrant acquisition of the grfs lock");
		f(&mut guard)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::env;

	fn temp_fs(name: &str) -> Filesystem {
		let mut path = env::temp_dir();
		path.push(format!("grfs-fs-test-{name}-{}", std::process::id()));
		let mut fs = Filesystem::open(&path).unwrap();
		fs.mkfs("test").unwrap();
		fs
	}

	#[test]
	fn mkfs_twice_refuses_second_format() {
		let mut path = env::temp_dir();
		path.push(format!("grfs-fs-test-{}-{}", "mkfs-twice", std::process::id()));
		let mut fs = Filesystem::open(&path).unwrap();
		fs.mkfs("a").unwrap();
		assert!(matches!(fs.mkfs("b"), Err(GrfsError::AlreadyExists)));
	}

	#[test]
	fn mkfs_reports_one_used_block_and_one_inode() {
		let fs = temp_fs("counters");
		let (used_inodes, used_blocks) = (fs.sb.used_inodes, fs.sb.used_blocks);
		assert_eq!(used_inodes, 1);
		assert_eq!(used_blocks, 1);
	}

	#[test]
	fn mkfs_zeroes_stale_bitmap_bytes_from_a_reused_image() {
		let mut path = env::temp_dir();
		path.push(format!("grfs-fs-test-{}-{}", "mkfs-stale-bitmap", std::process::id()));

		// Simulate a reused image: fill the inode and block bitmap regions with garbage
		// (all bits set) before the filesystem ever sees them.
		{
			let mut device = BlockDevice::open_or_create(&path).unwrap();
			let garbage = [0xFFu8; crate::superblock::SECTOR_SIZE];
			let region = itable::inode_bitmap_region();
			for offset in 0..region.sectors {
				device.write_sectors(region.start_sector + offset, &garbage).unwrap();
			}
			let region = blockmap::block_bitmap_region();
			for offset in 0..region.sectors {
				device.write_sectors(region.start_sector + offset, &garbage).unwrap();
			}
		}

		let mut fs = Filesystem::open(&path).unwrap();
		fs.mkfs("test").unwrap();

		// A fresh format must report only the root inode and its first data block as
		// used, not the stale all-ones bytes left behind by the previous tenant.
		let (used_inodes, used_blocks) = (fs.sb.used_inodes, fs.sb.used_blocks);
		assert_eq!(used_inodes, 1);
		assert_eq!(used_blocks, 1);

		// And a second allocation must find the next free slot, not OutOfSpace.
		let second = fs.mkdir("/a");
		assert!(second.is_ok());
	}

	#[test]
	fn mkdir_cd_pwd_round_trip() {
		let mut fs = temp_fs("cdpwd");
		fs.mkdir("/a").unwrap();
		fs.mkdir("/a/b").unwrap();
		fs.cd("/a/b").unwrap();
		assert_eq!(fs.pwd(), "/a/b");
		fs.cd("..").unwrap();
		assert_eq!(fs.pwd(), "/a");
	}

	#[test]
	fn echo_redirect_then_cat_round_trips() {
		let mut fs = temp_fs("echocat");
		fs.echo_to_file("/f", b"hello", false).unwrap();
		assert_eq!(fs.cat("/f").unwrap(), b"hello");
		fs.echo_to_file("/f", b" world", true).unwrap();
		assert_eq!(fs.cat("/f").unwrap(), b"hello world");
	}

	#[test]
	fn echo_redirect_overwrite_truncates_stale_trailing_bytes() {
		let mut fs = temp_fs("echotrunc");
		fs.echo_to_file("/f", b"hello world", false).unwrap();
		fs.echo_to_file("/f", b"hi", false).unwrap();
		assert_eq!(fs.cat("/f").unwrap(), b"hi");
	}

	#[test]
	fn echo_redirect_into_existing_directory_fails() {
		let mut fs = temp_fs("echodir");
		fs.mkdir("/d").unwrap();
		assert!(matches!(fs.echo_to_file("/d", b"hello", false), Err(GrfsError::IsADirectory)));
		assert!(matches!(fs.echo_to_file("/d", b"hello", true), Err(GrfsError::IsADirectory)));
	}

	#[test]
	fn link_survives_rmnod() {
		let mut fs = temp_fs("linksurvive");
		fs.touch("/src").unwrap();
		fs.echo_to_file("/src", b"data", false).unwrap();
		fs.link("/src", "/dst").unwrap();
		fs.rmnod("/src").unwrap();
		assert_eq!(fs.cat("/dst").unwrap(), b"data");
		assert_eq!(fs.find("/src"), NodeKind::Missing);
	}

	#[test]
	fn ln_existing_file_to_root_fails_with_exists() {
		let mut fs = temp_fs("lntoroot");
		fs.touch("/src").unwrap();
		assert!(matches!(fs.link("/src", "/"), Err(GrfsError::Exists)));
	}

	#[test]
	fn rmdir_nonempty_then_succeeds_after_clearing() {
		let mut fs = temp_fs("rmdirseq");
		fs.mkdir("/d").unwrap();
		fs.touch("/d/f").unwrap();
		assert!(matches!(fs.rmdir("/d"), Err(GrfsError::NotEmpty)));
		fs.rmnod("/d/f").unwrap();
		fs.rmdir("/d").unwrap();
		assert_eq!(fs.find("/d"), NodeKind::Missing);
	}

	#[test]
	fn large_append_crosses_into_indirect_blocks() {
		let mut fs = temp_fs("bigappend");
		let chunk = b"0123456789";
		let iterations = 4100;
		for _ in 0..iterations {
			fs.echo_to_file("/big", chunk, true).unwrap();
		}
		let data = fs.cat("/big").unwrap();
		assert_eq!(data.len(), 10 * iterations);
		assert!(data.len() > 10 * 4096, "write must cross past the 10 direct blocks into indirect1");
	}

	#[test]
	fn ls_excludes_dot_entries_unless_all() {
		let mut fs = temp_fs("lsall");
		fs.mkdir("/d").unwrap();
		let plain = fs.ls(Some("/d"), false).unwrap();
		assert!(plain.is_empty());
		let all = fs.ls(Some("/d"), true).unwrap();
		assert_eq!(all.len(), 2);
	}

	#[test]
	fn touch_is_idempotent() {
		let mut fs = temp_fs("touchidem");
		fs.touch("/f").unwrap();
		fs.touch("/f").unwrap();
		assert_eq!(fs.find("/f"), NodeKind::File);
	}

	#[test]
	fn statfs_reports_label_and_geometry() {
		let fs = temp_fs("statfs");
		let report = fs.statfs();
		assert!(report.contains("label: test"));
		assert!(report.contains("inodes: 1/248"));
	}
}
