//! Sector-granular read/write against the backing image file.
//!
//! Grounded on the host project's own disk-size helper (`utils::disk::get_disk_size`) and
//! its raw `File` + `Seek`/`Read`/`Write` usage in `Ext2Factory::create`: here the "device"
//! is a plain regular file the process creates and sizes on first use, rather than a real
//! block device queried over `ioctl`.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;

/// Size in bytes of one sector, the atomic transfer unit of the backing store.
pub const SECTOR_SIZE: usize = 512;
/// Total number of sectors in the image (512 MiB).
pub const TOTAL_SECTORS: u64 = 1_048_576;

/// A block device backed by a fixed-size regular file.
pub struct BlockDevice {
	file: File,
}

impl BlockDevice {
	/// Opens `path`, creating and zero-sizing it to [`TOTAL_SECTORS`] sectors if absent.
	pub fn open_or_create(path: &Path) -> io::Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(path)?;
		let len = TOTAL_SECTORS * SECTOR_SIZE as u64;
		if file.metadata()?.len() != len {
			file.set_len(len)?;
		}
		Ok(Self { file })
	}

	/// Reads `buf.len() / SECTOR_SIZE` sectors starting at sector `start` into `buf`.
	pub fn read_sectors(&mut self, start: u32, buf: &mut [u8]) -> io::Result<()> {
		debug_assert_eq!(buf.len() % SECTOR_SIZE, 0);
		let nsectors = (buf.len() / SECTOR_SIZE) as u64;
		assert!((start as u64) + nsectors <= TOTAL_SECTORS, "sector out of range");
		self.file.seek(SeekFrom::Start(start as u64 * SECTOR_SIZE as u64))?;
		self.file.read_exact(buf)
	}

	/// Writes `buf.len() / SECTOR_SIZE` sectors starting at sector `start` from `buf`.
	pub fn write_sectors(&mut self, start: u32, buf: &[u8]) -> io::Result<()> {
		debug_assert_eq!(buf.len() % SECTOR_SIZE, 0);
		let nsectors = (buf.len() / SECTOR_SIZE) as u64;
		assert!((start as u64) + nsectors <= TOTAL_SECTORS, "sector out of range");
		self.file.seek(SeekFrom::Start(start as u64 * SECTOR_SIZE as u64))?;
		self.file.write_all(buf)
	}
}
