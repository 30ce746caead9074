//! Compilation of rendered units into digest-named shared libraries.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_codegen::{ContentDigest, RenderedSource};
use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::error::BuildFailure;
use crate::layout::CacheLayout;
use crate::process::{RunError, run_with_timeout};
use crate::toolchain::Toolchain;

/// Whether an existing artifact may satisfy a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
	/// Reuse the on-disk artifact if present.
	Cached,
	/// Ignore any on-disk artifact and run the toolchain.
	Rebuild,
}

/// Status of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
	/// Artifact was already on disk.
	Cached(PathBuf),
	/// Artifact was newly compiled.
	Built(PathBuf),
}

impl BuildOutcome {
	pub fn path(&self) -> &Path {
		match self {
			BuildOutcome::Cached(path) | BuildOutcome::Built(path) => path,
		}
	}
}

/// Counters describing driver activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
	/// Toolchain invocations, successful or not.
	pub invocations: usize,
	/// Builds satisfied by an on-disk artifact.
	pub disk_hits: usize,
}

/// Writes rendered sources to the cache and compiles them.
pub struct Driver {
	config: BuildConfig,
	layout: CacheLayout,
	toolchain: Toolchain,
	invocations: AtomicUsize,
	disk_hits: AtomicUsize,
}

impl Driver {
	/// Resolves the toolchain described by `config`.
	pub fn new(config: BuildConfig) -> Result<Self, BuildFailure> {
		let toolchain = Toolchain::resolve(&config)?;
		Ok(Self {
			layout: CacheLayout::new(&config.cache_dir),
			config,
			toolchain,
			invocations: AtomicUsize::new(0),
			disk_hits: AtomicUsize::new(0),
		})
	}

	pub fn config(&self) -> &BuildConfig {
		&self.config
	}

	pub fn layout(&self) -> &CacheLayout {
		&self.layout
	}

	pub fn toolchain(&self) -> &Toolchain {
		&self.toolchain
	}

	pub fn stats(&self) -> DriverStats {
		DriverStats {
			invocations: self.invocations.load(Ordering::SeqCst),
			disk_hits: self.disk_hits.load(Ordering::SeqCst),
		}
	}

	/// Produces the shared library for `source`.
	///
	/// The library is written under a temporary name and renamed into place
	/// only after the toolchain succeeds, so a failed or interrupted build
	/// never leaves an artifact for its digest.
	///
	/// # Errors
	///
	/// * [`BuildFailure::Compile`] with the toolchain output if it exits unsuccessfully.
	/// * [`BuildFailure::Timeout`] if it exceeds the configured bound.
	/// * [`BuildFailure::NoCompiler`] if the compiler cannot be started.
	/// * [`BuildFailure::Io`] if the cache directory cannot be written.
	pub fn build(&self, source: &RenderedSource, mode: BuildMode) -> Result<BuildOutcome, BuildFailure> {
		let digest = source.digest();
		let artifact = self.layout.artifact_path(digest);

		if mode == BuildMode::Cached && artifact.is_file() {
			self.disk_hits.fetch_add(1, Ordering::SeqCst);
			debug!(digest = digest.short(), path = %artifact.display(), "Dynamic code artifact already built");
			return Ok(BuildOutcome::Cached(artifact));
		}

		let unit_dir = self.layout.unit_dir(digest);
		fs::create_dir_all(&unit_dir).map_err(|e| BuildFailure::io(&unit_dir, e))?;

		let source_path = self.layout.source_path(digest);
		fs::write(&source_path, source.text()).map_err(|e| BuildFailure::io(&source_path, e))?;

		let log_path = self.layout.log_path(digest);
		let _ = fs::remove_file(&log_path);

		let staging = unit_dir.join(format!("staging-{}-{}", std::process::id(), crate::layout::library_file_name(digest)));
		info!(family = source.family(), declared = source.declared_type(), digest = digest.short(), "Compiling dynamic code");

		let result = self.compile(digest, &source_path, &staging);
		match result {
			Ok(()) => {
				fs::rename(&staging, &artifact).map_err(|e| BuildFailure::io(&artifact, e))?;
				debug!(digest = digest.short(), path = %artifact.display(), "Successfully compiled dynamic code");
				Ok(BuildOutcome::Built(artifact))
			}
			Err(failure) => {
				let _ = fs::remove_file(&staging);
				if let BuildFailure::Compile { diagnostics, .. } = &failure
					&& let Err(e) = fs::write(&log_path, diagnostics)
				{
					warn!(path = %log_path.display(), error = %e, "Failed to write compile log");
				}
				Err(failure)
			}
		}
	}

	fn compile(&self, digest: &ContentDigest, source_path: &Path, staging: &Path) -> Result<(), BuildFailure> {
		self.invocations.fetch_add(1, Ordering::SeqCst);
		let cmd = self.toolchain.link_command(source_path, staging, &self.config);
		let timeout = self.config.timeout();

		let captured = run_with_timeout(cmd, timeout).map_err(|e| match e {
			RunError::Spawn(e) => BuildFailure::NoCompiler(format!("{}: {e}", self.toolchain.path().display())),
			RunError::Wait(e) => BuildFailure::io(self.toolchain.path(), e),
			RunError::Timeout => BuildFailure::Timeout {
				digest: digest.to_string(),
				timeout,
			},
		})?;

		if !captured.status.success() {
			return Err(BuildFailure::Compile {
				digest: digest.to_string(),
				diagnostics: captured.output,
			});
		}

		if !staging.is_file() {
			return Err(BuildFailure::Compile {
				digest: digest.to_string(),
				diagnostics: format!("compilation succeeded but library not found at {}\n{}", staging.display(), captured.output),
			});
		}
		Ok(())
	}
}
