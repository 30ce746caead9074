//! Component families and their factories.

use std::fmt;
use std::sync::Arc;

use crate::error::ConstructError;

/// A set of interchangeable component variants sharing one abstract interface.
///
/// Implementors are zero-sized marker types; the interface itself is the
/// [`Family::Instance`] trait object handed to callers.
pub trait Family: 'static {
	/// Registry namespace, e.g. `"scalar"`.
	const NAME: &'static str;

	/// The abstract interface every variant implements.
	type Instance: ?Sized + Send + Sync + 'static;

	/// Construction arguments forwarded to factories.
	type Args: ?Sized + 'static;
}

/// Constructs one instance of a family from its construction arguments.
pub type Factory<F> = Arc<dyn Fn(&<F as Family>::Args) -> Result<Box<<F as Family>::Instance>, ConstructError> + Send + Sync>;

/// Where a registry entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
	/// Compiled into the binary and installed from the static component list.
	Builtin,
	/// Registered programmatically by the host.
	Runtime,
	/// Registered by a loaded artifact; carries the artifact's content digest.
	Artifact(String),
}

impl fmt::Display for Origin {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Origin::Builtin => f.write_str("builtin"),
			Origin::Runtime => f.write_str("runtime"),
			Origin::Artifact(digest) => write!(f, "artifact {digest}"),
		}
	}
}
