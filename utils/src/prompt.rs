//! This module implements prompting and raw-mode line editing.

use libc::ECHO;
use libc::ECHOE;
use libc::ICANON;
use libc::STDIN_FILENO;
use libc::TCSANOW;
use libc::VMIN;
use libc::VTIME;
use libc::tcgetattr;
use libc::tcsetattr;
use libc::termios;
use std::collections::VecDeque;
use std::io::Read;
use std::io::Write;
use std::io;
use std::mem::MaybeUninit;

/// Maximum number of entries kept in the history ring.
const HISTORY_SIZE: usize = 10;

/// Backspace / delete byte values sent by common terminals.
const BACKSPACE: u8 = 0x7f;
const BACKSPACE_ALT: u8 = 0x08;
/// The first byte of an escape sequence.
const ESC: u8 = 0x1b;

/// A raw-mode line editor with arrow-key history recall.
///
/// [`ICANON`]/[`ECHO`] are disabled for the duration of a read so keys can be handled one
/// at a time, then cooked mode is restored before the line is handed back to the caller
/// (who may print command output, which should not be mangled by raw mode).
pub struct LineEditor {
	/// Previously submitted lines, most recent last. Capped at [`HISTORY_SIZE`], with
	/// consecutive duplicates against the last entry dropped.
	history: VecDeque<String>,
}

impl Default for LineEditor {
	fn default() -> Self {
		Self::new()
	}
}

impl LineEditor {
	/// Creates an editor with empty history.
	pub fn new() -> Self {
		Self {
			history: VecDeque::with_capacity(HISTORY_SIZE),
		}
	}

	/// Shows `prompt`, then reads a line with backspace and history (`ESC [ A`/`ESC [ B`)
	/// support. Returns `None` on EOF.
	pub fn read_line(&mut self, prompt: &str) -> Option<String> {
		let saved_termios = unsafe {
			let mut t: termios = MaybeUninit::zeroed().assume_init();
			tcgetattr(STDIN_FILENO, &mut t);
			t
		};
		let mut raw = saved_termios;
		raw.c_lflag &= !(ICANON | ECHO | ECHOE);
		raw.c_cc[VMIN] = 1;
		raw.c_cc[VTIME] = 0;
		unsafe {
			tcsetattr(STDIN_FILENO, TCSANOW, &raw);
		}

		let result = self.read_line_raw(prompt);

		unsafe {
			tcsetattr(STDIN_FILENO, TCSANOW, &saved_termios);
		}
		println!();

		result
	}

	/// Reads a single key-by-key line once raw mode is already active.
	fn read_line_raw(&mut self, prompt: &str) -> Option<String> {
		let mut stdin = io::stdin();
		let mut stdout = io::stdout();
		let mut buf = String::new();
		// `None` while editing a fresh line, `Some(i)` while recalling `history[i]`.
		let mut history_cursor: Option<usize> = None;

		print!("{prompt}");
		let _ = stdout.flush();

		loop {
			let mut byte = [0u8; 1];
			if stdin.read(&mut byte).ok()? == 0 {
				return None;
			}
			match byte[0] {
				b'\n' | b'\r' => break,
				BACKSPACE | BACKSPACE_ALT => {
					if buf.pop().is_some() {
						print!("\u{8} \u{8}");
						let _ = stdout.flush();
					}
				}
				ESC => {
					let mut seq = [0u8; 2];
					if stdin.read_exact(&mut seq).is_err() {
						continue;
					}
					if seq[0] != b'[' {
						continue;
					}
					let next = match seq[1] {
						b'A' => history_cursor
							.map(|i| i.saturating_sub(1))
							.or_else(|| self.history.len().checked_sub(1)),
						b'B' => history_cursor.and_then(|i| {
							let i = i + 1;
							(i < self.history.len()).then_some(i)
						}),
						_ => continue,
					};
					self.redraw(&mut stdout, prompt, &mut buf, next);
					history_cursor = next;
				}
				c => {
					buf.push(c as char);
					print!("{}", c as char);
					let _ = stdout.flush();
				}
			}
		}

		if !matches!(self.history.back(), Some(last) if last == &buf) && !buf.is_empty() {
			if self.history.len() == HISTORY_SIZE {
				self.history.pop_front();
			}
			self.history.push_back(buf.clone());
		}
		Some(buf)
	}

	/// Clears the current line on screen and redraws it from `cursor` (an index into
	/// history, or the live buffer if `None`), updating `buf` in place.
	fn redraw(&self, stdout: &mut io::Stdout, prompt: &str, buf: &mut String, cursor: Option<usize>) {
		let replacement = cursor.and_then(|i| self.history.get(i)).cloned();
		if let Some(replacement) = replacement {
			*buf = replacement;
		}
		print!("\r{prompt}\u{1b}[K{buf}");
		let _ = stdout.flush();
	}
}
