//! Error kinds shared by every filesystem entry point.

use std::fmt;
use std::io;

/// An error returned by a `grfs` operation.
///
/// Kinds, not messages: the shell layer is responsible for turning these into whatever
/// diagnostic text fits the command that failed.
#[derive(Debug)]
pub enum GrfsError {
	/// Empty path, over 256 bytes, or `.`/`..` passed where a new name is expected.
	InvalidPath,
	/// A path element does not exist along a walk.
	MissingComponent,
	/// Expected a file, found a directory.
	IsADirectory,
	/// Expected a directory, found a file.
	NotADirectory,
	/// Create collided with an existing entry.
	Exists,
	/// `rmdir` on a directory holding entries beyond `.`/`..`.
	NotEmpty,
	/// Attempt to remove the root or the current working directory.
	Protected,
	/// The inode or block bitmap is full.
	OutOfSpace,
	/// `fd` is out of range, or not open.
	BadDescriptor,
	/// Read on a write-only descriptor, or write on a read-only one.
	BadMode,
	/// `ln` to an inode whose link count has already reached zero.
	LinkToZombie,
	/// The filesystem image already carries the magic (`mkfs` refuses to reformat it).
	AlreadyExists,
	/// A block device I/O failure.
	Io(io::Error),
}

impl fmt::Display for GrfsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::InvalidPath => write!(f, "invalid path"),
			Self::MissingComponent => write!(f, "no such file or directory"),
			Self::IsADirectory => write!(f, "is a directory"),
			Self::NotADirectory => write!(f, "not a directory"),
			Self::Exists => write!(f, "already exists"),
			Self::NotEmpty => write!(f, "directory not empty"),
			Self::Protected => write!(f, "cannot remove root or current directory"),
			Self::OutOfSpace => write!(f, "no space left on device"),
			Self::BadDescriptor => write!(f, "bad file descriptor"),
			Self::BadMode => write!(f, "operation not permitted by descriptor's open mode"),
			Self::LinkToZombie => write!(f, "cannot link to a file with no remaining links"),
			Self::AlreadyExists => write!(f, "filesystem already exists"),
			Self::Io(e) => write!(f, "{e}"),
		}
	}
}

impl std::error::Error for GrfsError {}

impl From<io::Error> for GrfsError {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}

pub type Result<T> = std::result::Result<T, GrfsError>;
