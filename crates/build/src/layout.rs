//! On-disk cache layout.
//!
//! ```text
//! <root>/<digest>/unit.c           rendered source
//! <root>/<digest>/lib<digest>.so   compiled artifact
//! <root>/<digest>/compile.log      toolchain output of a failed build
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kiln_codegen::ContentDigest;

/// Paths of the digest-keyed artifact cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
	root: PathBuf,
}

/// One digest directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
	pub digest: ContentDigest,
	/// Size of the compiled artifact, if one exists.
	pub artifact_bytes: Option<u64>,
	/// True if the last build of this digest failed.
	pub failed: bool,
}

impl CacheLayout {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn unit_dir(&self, digest: &ContentDigest) -> PathBuf {
		self.root.join(digest.as_str())
	}

	pub fn source_path(&self, digest: &ContentDigest) -> PathBuf {
		self.unit_dir(digest).join("unit.c")
	}

	pub fn artifact_path(&self, digest: &ContentDigest) -> PathBuf {
		self.unit_dir(digest).join(library_file_name(digest))
	}

	pub fn log_path(&self, digest: &ContentDigest) -> PathBuf {
		self.unit_dir(digest).join("compile.log")
	}

	/// Lists every digest directory under the root.
	pub fn entries(&self) -> io::Result<Vec<CacheEntry>> {
		let read = match fs::read_dir(&self.root) {
			Ok(read) => read,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e),
		};

		let mut entries = Vec::new();
		for dir_entry in read.flatten() {
			let Some(digest) = dir_entry.file_name().to_str().and_then(ContentDigest::parse) else {
				continue;
			};
			entries.push(CacheEntry {
				artifact_bytes: fs::metadata(self.artifact_path(&digest)).ok().map(|m| m.len()),
				failed: self.log_path(&digest).exists(),
				digest,
			});
		}
		entries.sort_by(|a, b| a.digest.cmp(&b.digest));
		Ok(entries)
	}

	/// Deletes the compiled artifact of `digest`, keeping its source.
	pub fn remove_artifact(&self, digest: &ContentDigest) -> io::Result<bool> {
		match fs::remove_file(self.artifact_path(digest)) {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
			Err(e) => Err(e),
		}
	}

	/// Deletes the whole directory of `digest`.
	pub fn remove(&self, digest: &ContentDigest) -> io::Result<()> {
		match fs::remove_dir_all(self.unit_dir(digest)) {
			Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
			_ => Ok(()),
		}
	}

	/// Deletes every digest directory, returning how many were removed.
	///
	/// Only directories named like a digest are touched.
	pub fn clean(&self) -> io::Result<usize> {
		let entries = self.entries()?;
		for entry in &entries {
			self.remove(&entry.digest)?;
		}
		Ok(entries.len())
	}
}

/// Returns the platform-specific shared library extension.
pub fn library_extension() -> &'static str {
	#[cfg(target_os = "macos")]
	{
		"dylib"
	}
	#[cfg(target_os = "windows")]
	{
		"dll"
	}
	#[cfg(not(any(target_os = "macos", target_os = "windows")))]
	{
		"so"
	}
}

/// Returns the platform-specific library filename for a digest.
pub fn library_file_name(digest: &ContentDigest) -> String {
	if cfg!(target_os = "windows") {
		format!("{digest}.{}", library_extension())
	} else {
		format!("lib{digest}.{}", library_extension())
	}
}
