use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while building a dynamic code artifact.
///
/// Cloneable so one failure can be handed to every waiter of a shared build.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildFailure {
	/// The toolchain exited unsuccessfully; `diagnostics` is its output verbatim.
	#[error("dynamic code {digest} failed to compile:\n{diagnostics}")]
	Compile { digest: String, diagnostics: String },

	#[error("dynamic code {digest} did not compile within {}s", .timeout.as_secs())]
	Timeout { digest: String, timeout: Duration },

	#[error("no usable C compiler: {0}")]
	NoCompiler(String),

	#[error("I/O error at {}: {message}", .path.display())]
	Io { path: PathBuf, message: String },
}

impl BuildFailure {
	pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
		Self::Io {
			path: path.to_path_buf(),
			message: err.to_string(),
		}
	}
}
