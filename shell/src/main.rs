//! `grfs-shell`: an interactive REPL over the GRFS filesystem façade, grounded on
//! `utils::prompt`'s raw-terminal line editor.

use grfs::error::GrfsError;
use grfs::fs::Filesystem;
use grfs::fs::NodeKind;
use std::path::Path;
use utils::prompt::LineEditor;

const BIN: &str = "grfs-shell";

fn main() {
	let fs = match Filesystem::open(Path::new("image")) {
		Ok(fs) => fs,
		Err(e) => utils::error(BIN, e),
	};

	let mut shell = Shell { fs };
	let mut editor = LineEditor::new();

	loop {
		let prompt = format!("Grfs@Test:{} > ", shell.fs.pwd());
		let Some(line) = editor.read_line(&prompt) else {
			break;
		};
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		if shell.run_chain(line) {
			break;
		}
	}
}

struct Shell {
	fs: Filesystem,
}

impl Shell {
	/// Runs every `&&`-joined command in `line`, stopping at the first failure. Returns
	/// `true` if the chain contained `quit`.
	fn run_chain(&mut self, line: &str) -> bool {
		for command in line.split("&&") {
			let command = command.trim();
			if command.is_empty() {
				continue;
			}
			if command == "quit" {
				return true;
			}
			if let Err(e) = self.run_one(command) {
				eprintln!("{BIN}: {e}");
				break;
			}
		}
		false
	}

	fn run_one(&mut self, command: &str) -> Result<(), GrfsError> {
		let mut parts = command.split_whitespace();
		let Some(verb) = parts.next() else {
			return Ok(());
		};
		let args: Vec<&str> = parts.collect();

		match verb {
			"mkfs" => self.fs.mkfs("grfs"),
			"statfs" => {
				println!("{}", self.fs.statfs());
				Ok(())
			}
			"cd" => self.fs.cd(arg(&args, 0)?),
			"pwd" => {
				println!("{}", self.fs.pwd());
				Ok(())
			}
			"mkdir" => self.fs.mkdir(arg(&args, 0)?),
			"rmdir" => self.fs.rmdir(arg(&args, 0)?),
			"ls" => self.ls(&args),
			"find" => {
				let code = match self.fs.find(arg(&args, 0)?) {
					NodeKind::Directory => 2,
					NodeKind::File => 1,
					NodeKind::Missing => 0,
				};
				println!("{code}");
				Ok(())
			}
			"touch" => self.fs.touch(arg(&args, 0)?),
			"cat" => self.cat(&args),
			"echo" => self.echo(command, &args),
			"ln" => self.fs.link(arg(&args, 0)?, arg(&args, 1)?),
			"rmnod" => self.fs.rmnod(arg(&args, 0)?),
			"rm" => self.fs.rm(arg(&args, 0)?),
			"help" | "-h" | "--help" => {
				print_usage();
				Ok(())
			}
			_ => {
				print_usage();
				Ok(())
			}
		}
	}

	fn ls(&mut self, args: &[&str]) -> Result<(), GrfsError> {
		let long = args.contains(&"-l");
		let all = args.contains(&"-a");
		let path = args.iter().find(|a| !a.starts_with('-')).copied();
		let entries = self.fs.ls(path, all)?;
		for entry in entries {
			if long {
				println!("{} {:>3} {:>8} {}", entry.mode, entry.nlinks, entry.size, entry.name);
			} else {
				println!("{}", entry.name);
			}
		}
		Ok(())
	}

	fn cat(&mut self, args: &[&str]) -> Result<(), GrfsError> {
		let data = self.fs.cat(arg(args, 0)?)?;
		print!("{}", String::from_utf8_lossy(&data));
		Ok(())
	}

	/// `echo ARGS... [> PATH | >> PATH]`: with a redirect, writes/appends the joined
	/// arguments (plus a trailing space and newline, matching scenario 2's `hello \n`);
	/// without one, just prints them.
	fn echo(&mut self, command: &str, args: &[&str]) -> Result<(), GrfsError> {
		let (body, redirect) = split_redirect(command);
		let text = format!("{} \n", body.trim());
		match redirect {
			Some((path, append)) => self.fs.echo_to_file(path, text.as_bytes(), append),
			None => {
				println!("{}", args.join(" "));
				Ok(())
			}
		}
	}
}

fn arg<'a>(args: &[&'a str], i: usize) -> Result<&'a str, GrfsError> {
	args.get(i).copied().ok_or(GrfsError::InvalidPath)
}

/// Splits an `echo` command's body from a trailing `> PATH` / `>> PATH` redirect.
fn split_redirect(command: &str) -> (&str, Option<(&str, bool)>) {
	let rest = command.strip_prefix("echo").unwrap_or(command).trim_start();
	if let Some(idx) = rest.find(">>") {
		let (body, tail) = rest.split_at(idx);
		return (body, Some((tail[2..].trim(), true)));
	}
	if let Some(idx) = rest.find('>') {
		let (body, tail) = rest.split_at(idx);
		return (body, Some((tail[1..].trim(), false)));
	}
	(rest, None)
}

fn print_usage() {
	println!(
		"Usage: COMMAND [&& COMMAND ...]\n\
		 Commands:\n\
		 \x20 mkfs                      create the filesystem if absent\n\
		 \x20 statfs                    print geometry and utilization\n\
		 \x20 cd PATH                   change the working directory\n\
		 \x20 pwd                       print the working directory\n\
		 \x20 mkdir PATH                create a directory\n\
		 \x20 rmdir PATH                remove an empty directory\n\
		 \x20 ls [-l] [-a] [PATH]       list directory entries\n\
		 \x20 find PATH                 probe a path (2=dir, 1=file, 0=missing)\n\
		 \x20 touch PATH                create an empty file\n\
		 \x20 cat PATH                  print a file's contents\n\
		 \x20 echo ARGS [> or >> PATH]  print or write/append to a file\n\
		 \x20 ln SRC DST                hard-link a file\n\
		 \x20 rmnod PATH                remove a file\n\
		 \x20 rm PATH                   remove a file or empty directory\n\
		 \x20 quit                      exit the shell"
	);
}
