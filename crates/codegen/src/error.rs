use thiserror::Error;

/// A skeleton does not match the placeholders the renderer provides.
///
/// These are programming errors in a family descriptor, never user errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
	#[error("unterminated placeholder at byte {offset}")]
	Unterminated { offset: usize },

	#[error("invalid placeholder `${{{name}}}` at byte {offset}")]
	Invalid { name: String, offset: usize },

	#[error("placeholder `${{{name}}}` has no value")]
	Unresolved { name: String },

	#[error("skeleton for {family} is missing required placeholder `${{{name}}}`")]
	Missing { family: &'static str, name: &'static str },
}
