use serde::Deserialize;

/// The fragments a configuration entry supplies for one dynamic component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSpec {
	/// Declared name; the unique registry name is derived from it.
	#[serde(rename = "type")]
	pub type_name: String,
	/// Body of the family's per-call entry point.
	pub code: String,
	/// Inserted near the top of the generated unit (extra headers).
	#[serde(default)]
	pub code_include: String,
	/// Free helper declarations placed before the entry point.
	#[serde(default)]
	pub local_code: String,
	/// Emit lifecycle trace messages from the generated unit.
	#[serde(default)]
	pub verbose: bool,
}

impl CodeSpec {
	pub fn new(type_name: impl Into<String>, code: impl Into<String>) -> Self {
		Self {
			type_name: type_name.into(),
			code: code.into(),
			..Self::default()
		}
	}

	pub fn with_include(mut self, code_include: impl Into<String>) -> Self {
		self.code_include = code_include.into();
		self
	}

	pub fn with_local_code(mut self, local_code: impl Into<String>) -> Self {
		self.local_code = local_code.into();
		self
	}

	pub fn with_verbose(mut self, verbose: bool) -> Self {
		self.verbose = verbose;
		self
	}
}
