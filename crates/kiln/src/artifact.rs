//! A compiled unit mapped into the process.

use std::ffi::CString;
use std::path::{Path, PathBuf};

use kiln_build::BuildFailure;
use kiln_codegen::{ContentDigest, entry_symbol, marker_symbol};
use libloading::Library;
use thiserror::Error;
use tracing::{debug, trace};

use crate::abi::{EntryFn, KilnStatus, MarkerFn};
use crate::host::HOST_V1;

/// Why an artifact could not be made available.
///
/// Cloneable so every waiter on a shared load observes the same failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArtifactFailure {
	#[error(transparent)]
	Build(#[from] BuildFailure),

	#[error("failed to load {}: {message}", .path.display())]
	Load { path: PathBuf, message: String },

	/// The library does not carry the symbols its digest promises.
	#[error("artifact {digest} failed verification: {reason}")]
	Verification { digest: String, reason: String },

	#[error("loading artifact {digest} panicked")]
	Panicked { digest: String },
}

/// A loaded and verified artifact.
///
/// Dropping it runs the unload marker and unmaps the library, so it must
/// outlive every object constructed from it.
pub(crate) struct LoadedArtifact {
	digest: ContentDigest,
	path: PathBuf,
	marker: MarkerFn,
	entry: EntryFn,
	library: Library,
}

impl LoadedArtifact {
	/// Maps the library at `path` and checks that it was built from `digest`.
	///
	/// # Errors
	///
	/// * [`ArtifactFailure::Load`] if the loader rejects the file.
	/// * [`ArtifactFailure::Verification`] if the marker or entry symbol is absent.
	pub(crate) fn load(path: &Path, digest: &ContentDigest) -> Result<Self, ArtifactFailure> {
		// SAFETY: runs the library's initializers; generated units define none.
		let library = unsafe { Library::new(path) }.map_err(|e| ArtifactFailure::Load {
			path: path.to_path_buf(),
			message: e.to_string(),
		})?;

		let marker_name = marker_symbol(digest);
		let marker: MarkerFn = unsafe { library.get::<MarkerFn>(marker_name.as_bytes()) }
			.map(|symbol| *symbol)
			.map_err(|e| ArtifactFailure::Verification {
				digest: digest.to_string(),
				reason: format!("marker `{marker_name}` not found: {e}"),
			})?;

		let entry_name = entry_symbol(digest);
		let entry: EntryFn = unsafe { library.get::<EntryFn>(entry_name.as_bytes()) }
			.map(|symbol| *symbol)
			.map_err(|e| ArtifactFailure::Verification {
				digest: digest.to_string(),
				reason: format!("entry point `{entry_name}` not found: {e}"),
			})?;

		unsafe { marker(1) };
		debug!(digest = digest.short(), path = %path.display(), "Loaded dynamic code");

		Ok(Self {
			digest: digest.clone(),
			path: path.to_path_buf(),
			marker,
			entry,
			library,
		})
	}

	/// Calls the entry point, asking the unit to register itself as `type_name`.
	pub(crate) fn register(&self, type_name: &str) -> KilnStatus {
		let Ok(type_name) = CString::new(type_name) else {
			return KilnStatus::FAILED;
		};
		unsafe { (self.entry)(&HOST_V1, type_name.as_ptr()) }
	}
}

impl Drop for LoadedArtifact {
	fn drop(&mut self) {
		unsafe { (self.marker)(0) };
		trace!(digest = self.digest.short(), path = %self.path.display(), "Unloading dynamic code");
	}
}

impl std::fmt::Debug for LoadedArtifact {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LoadedArtifact")
			.field("digest", &self.digest)
			.field("path", &self.path)
			.finish_non_exhaustive()
	}
}
