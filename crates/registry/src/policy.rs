use serde::Deserialize;

/// Policy for handling a registration whose (family, name) key already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
	/// Keep the existing entry and fail the registration with `DuplicateType`.
	#[default]
	Reject,
	/// Overwrite the existing entry.
	Replace,
}
