//! GRFS: a user-space, UNIX-like filesystem layered over a raw block image.

pub mod bitmap;
pub mod blockmap;
pub mod cache;
pub mod device;
pub mod dirent;
pub mod directory;
pub mod error;
pub mod fd;
pub mod fs;
pub mod inode;
pub mod itable;
pub mod raw;
pub mod superblock;
