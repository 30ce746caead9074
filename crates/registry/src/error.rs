use thiserror::Error;

use crate::family::Origin;

/// Errors raised by registry lookups and registrations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
	/// No factory is registered for the requested name.
	#[error("unknown {family} type `{name}` (valid types: {})", .known.join(", "))]
	UnknownType {
		family: &'static str,
		name: String,
		/// Names registered for the family at the time of the lookup.
		known: Vec<String>,
	},

	/// Registration collided with an existing entry under [`crate::DuplicatePolicy::Reject`].
	#[error("{family} type `{name}` is already registered ({existing})")]
	DuplicateType {
		family: &'static str,
		name: String,
		existing: Origin,
	},

	/// The stored factory belongs to a different family type sharing the same name.
	#[error("{family} type `{name}` was registered by a different family definition")]
	FamilyMismatch { family: &'static str, name: String },

	/// The factory ran but rejected its construction arguments.
	#[error("failed to construct {family} type `{name}`: {source}")]
	Construct {
		family: &'static str,
		name: String,
		#[source]
		source: ConstructError,
	},
}

/// Error returned by a factory when its arguments are unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ConstructError(String);

impl ConstructError {
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}

	/// A required argument key was absent.
	pub fn missing(key: &str) -> Self {
		Self(format!("missing required entry `{key}`"))
	}

	/// An argument key was present with the wrong shape.
	pub fn invalid(key: &str, expected: &str) -> Self {
		Self(format!("entry `{key}` must be {expected}"))
	}

	pub fn message(&self) -> &str {
		&self.0
	}
}
