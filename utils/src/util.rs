//! This module implements utility functions.

use std::fmt;
use std::mem::size_of;

/// Performs the log2 operation on the given integer.
///
/// If the result is undefined, the function returns None.
pub fn log2(n: u64) -> Option<u64> {
	let num_bits = (size_of::<u64>() * 8) as u64;

	let n = num_bits - n.leading_zeros() as u64;
	if n > 0 {
		Some(n - 1)
	} else {
		None
	}
}

/// Returns `2^n`.
pub const fn pow2(n: u32) -> u64 {
	1u64 << n
}

/// Divides `n` by `d`, rounding up.
pub const fn ceil_division(n: u32, d: u32) -> u32 {
	(n + d - 1) / d
}

/// Structure representing a number of bytes, formatted with a human-friendly unit.
///
/// Unlike a fixed powers-of-1024 `Display`, the unit rolls over every time the scaled
/// count would reach 4096 in the *current* unit, not only at the 1024 boundary — this
/// keeps e.g. `statfs` from ever printing a four-digit count.
pub struct ByteSize(pub u64);

impl ByteSize {
	/// Creates a size from a given number of sectors.
	pub fn from_sectors_count(cnt: u64) -> Self {
		Self(cnt * 512)
	}
}

impl fmt::Display for ByteSize {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		const SUFFIXES: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

		let mut scaled = self.0;
		let mut order = 0;
		while scaled >= 4096 && order < SUFFIXES.len() - 1 {
			scaled /= 1024;
			order += 1;
		}

		write!(fmt, "{} {}", scaled, SUFFIXES[order])
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bytesize() {
		assert_eq!(format!("{}", ByteSize(0)).as_str(), "0 B");
		assert_eq!(format!("{}", ByteSize(1023)).as_str(), "1023 B");
		assert_eq!(format!("{}", ByteSize(4096)).as_str(), "4 KiB");
		assert_eq!(format!("{}", ByteSize(4095)).as_str(), "4095 B");
		assert_eq!(format!("{}", ByteSize(1024 * 1024)).as_str(), "1024 KiB");
		assert_eq!(format!("{}", ByteSize(4096 * 1024)).as_str(), "4 MiB");
	}

	#[test]
	fn log2_values() {
		assert_eq!(log2(1), Some(0));
		assert_eq!(log2(2), Some(1));
		assert_eq!(log2(4096), Some(12));
		assert_eq!(log2(0), None);
	}

	#[test]
	fn ceil_division_values() {
		assert_eq!(ceil_division(10, 3), 4);
		assert_eq!(ceil_division(9, 3), 3);
		assert_eq!(ceil_division(0, 3), 0);
	}
}
