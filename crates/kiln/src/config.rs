//! Loader configuration and component entries.
//!
//! The loader reads a TOML file from, in order of precedence, an explicit
//! path, `KILN_CONFIG`, or `<config dir>/kiln/kiln.toml`. Environment
//! overrides from [`BuildConfig::apply_env`] are applied last.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kiln_build::BuildConfig;
use kiln_codegen::CodeSpec;
use kiln_registry::DuplicatePolicy;
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::families::ComponentArgs;

pub const CONFIG_ENV: &str = "KILN_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct KilnConfig {
	/// What happens when a name is registered twice in one family.
	pub duplicate_policy: DuplicatePolicy,
	pub build: BuildConfig,
}

impl KilnConfig {
	pub fn from_toml(text: &str, path: &Path) -> Result<Self, Error> {
		toml::from_str(text).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			message: e.to_string(),
		})
	}

	/// Loads the configuration, falling back to defaults when no file exists.
	///
	/// # Errors
	///
	/// Fails if an explicitly named file cannot be read or any file fails to parse.
	pub fn load(explicit: Option<&Path>) -> Result<Self, Error> {
		let path = explicit
			.map(Path::to_path_buf)
			.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
			.or_else(|| default_config_path().filter(|path| path.is_file()));

		let mut config = match path {
			Some(path) => {
				let text = std::fs::read_to_string(&path).map_err(|e| Error::Config {
					path: path.clone(),
					message: e.to_string(),
				})?;
				debug!(path = %path.display(), "Loaded kiln configuration");
				Self::from_toml(&text, &path)?
			}
			None => Self::default(),
		};
		config.build.apply_env();
		Ok(config)
	}
}

pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("kiln").join("kiln.toml"))
}

/// One component entry of a case file.
///
/// An entry with `code` is compiled at runtime; one without names a type
/// already in the registry. Every other key is passed to the factory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
	pub family: String,
	#[serde(rename = "type")]
	pub type_name: String,
	#[serde(default)]
	pub code: Option<String>,
	#[serde(default)]
	pub code_include: String,
	#[serde(default)]
	pub local_code: String,
	#[serde(default)]
	pub verbose: bool,
	#[serde(flatten)]
	pub options: toml::Table,
}

impl ComponentConfig {
	/// The dynamic code fragments, if this entry carries any.
	pub fn code_spec(&self) -> Option<CodeSpec> {
		let code = self.code.as_ref()?;
		Some(
			CodeSpec::new(self.type_name.clone(), code.clone())
				.with_include(self.code_include.clone())
				.with_local_code(self.local_code.clone())
				.with_verbose(self.verbose),
		)
	}

	pub fn args(&self, type_name: impl Into<String>) -> ComponentArgs {
		ComponentArgs::new(type_name, self.options.clone())
	}
}

/// A set of named component entries, e.g. the boundary conditions of a case.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CaseConfig {
	#[serde(default)]
	pub components: BTreeMap<String, ComponentConfig>,
}

impl CaseConfig {
	pub fn load(path: &Path) -> Result<Self, Error> {
		let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			message: e.to_string(),
		})?;
		toml::from_str(&text).map_err(|e| Error::Config {
			path: path.to_path_buf(),
			message: e.to_string(),
		})
	}
}
