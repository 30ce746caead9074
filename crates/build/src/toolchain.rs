//! Compiler resolution and invocation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::config::BuildConfig;
use crate::error::BuildFailure;
use crate::process::{RunError, run_with_timeout};

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A resolved C compiler plus the identity tag folded into every digest.
#[derive(Debug, Clone)]
pub struct Toolchain {
	path: PathBuf,
	args: Vec<OsString>,
	msvc: bool,
	tag: String,
}

impl Toolchain {
	/// Resolves the compiler from `config.compiler`, falling back to the `cc`
	/// crate's probe (`CC`, then the platform default).
	pub fn resolve(config: &BuildConfig) -> Result<Self, BuildFailure> {
		let (path, args, msvc) = match &config.compiler {
			Some(path) => {
				let msvc = path.file_stem().is_some_and(|stem| stem.eq_ignore_ascii_case("cl"));
				(path.clone(), Vec::new(), msvc)
			}
			None => probe_default()?,
		};

		let version = compiler_version(&path, msvc);
		let tag = format!(
			"{version}; flags: {}; include: {}; libdirs: {}; libs: {}",
			args.iter()
				.map(|a| a.to_string_lossy().into_owned())
				.chain(config.cflags.iter().cloned())
				.collect::<Vec<_>>()
				.join(" "),
			join_paths(&config.include_dirs),
			join_paths(&config.library_dirs),
			config.libraries.join(" ")
		);

		debug!(compiler = %path.display(), msvc, tag = %tag, "Resolved toolchain");
		Ok(Self { path, args, msvc, tag })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Compiler identity, flags, search paths and libraries; changes here must change the cache key.
	pub fn tag(&self) -> &str {
		&self.tag
	}

	/// Builds the command that compiles and links `source` into the shared library `output`.
	pub fn link_command(&self, source: &Path, output: &Path, config: &BuildConfig) -> Command {
		let mut cmd = Command::new(&self.path);
		cmd.args(&self.args);

		if self.msvc {
			cmd.args(["/nologo", "/LD", "/utf-8"]).args(&config.cflags);
			for dir in &config.include_dirs {
				cmd.arg(format!("/I{}", dir.display()));
			}
			cmd.arg(source).arg(format!("/Fe:{}", output.display()));
			cmd.arg("/link");
			for dir in &config.library_dirs {
				cmd.arg(format!("/LIBPATH:{}", dir.display()));
			}
			for lib in &config.libraries {
				cmd.arg(format!("{lib}.lib"));
			}
			return cmd;
		}

		cmd.args(["-shared", "-fPIC"]).args(&config.cflags);
		for dir in &config.include_dirs {
			cmd.arg("-I").arg(dir);
		}
		cmd.arg("-o").arg(output).arg(source);
		for dir in &config.library_dirs {
			cmd.arg("-L").arg(dir);
		}
		for lib in &config.libraries {
			cmd.arg(format!("-l{lib}"));
		}

		#[cfg(target_os = "linux")]
		cmd.arg("-Wl,-z,relro,-z,now");

		cmd
	}
}

fn join_paths(paths: &[PathBuf]) -> String {
	paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(":")
}

fn probe_default() -> Result<(PathBuf, Vec<OsString>, bool), BuildFailure> {
	let target = host_target();
	let tool = cc::Build::new()
		.cargo_metadata(false)
		.cargo_warnings(false)
		.opt_level(2)
		.debug(false)
		.warnings(false)
		.host(&target)
		.target(&target)
		.try_get_compiler()
		.map_err(|e| BuildFailure::NoCompiler(e.to_string()))?;

	Ok((tool.path().to_path_buf(), tool.args().to_vec(), tool.is_like_msvc()))
}

fn host_target() -> String {
	std::env::var("TARGET").unwrap_or_else(|_| {
		let arch = std::env::consts::ARCH;
		if cfg!(target_os = "windows") {
			format!("{arch}-pc-windows-msvc")
		} else if cfg!(target_os = "macos") {
			format!("{arch}-apple-darwin")
		} else {
			format!("{arch}-unknown-linux-gnu")
		}
	})
}

/// First line the compiler prints about itself, or its path if it prints nothing.
fn compiler_version(path: &Path, msvc: bool) -> String {
	let mut cmd = Command::new(path);
	if !msvc {
		cmd.arg("--version");
	}

	let first_line = match run_with_timeout(cmd, VERSION_PROBE_TIMEOUT) {
		Ok(captured) => captured.output.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string),
		Err(RunError::Spawn(_) | RunError::Wait(_) | RunError::Timeout) => None,
	};
	first_line.unwrap_or_else(|| path.display().to_string())
}
