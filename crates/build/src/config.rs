use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Toolchain and cache settings, read from the `[build]` table of `kiln.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildConfig {
	/// Root of the on-disk artifact cache.
	pub cache_dir: PathBuf,
	/// Compiler executable; probed from `CC` and the platform default when unset.
	pub compiler: Option<PathBuf>,
	/// Extra compiler flags.
	pub cflags: Vec<String>,
	/// Header search paths made available to fragments.
	pub include_dirs: Vec<PathBuf>,
	/// Library search paths.
	pub library_dirs: Vec<PathBuf>,
	/// Libraries linked into every artifact.
	pub libraries: Vec<String>,
	/// Bound on a single toolchain invocation.
	pub timeout_secs: u64,
}

impl Default for BuildConfig {
	fn default() -> Self {
		Self {
			cache_dir: default_cache_dir(),
			compiler: None,
			cflags: vec!["-O2".to_string()],
			include_dirs: Vec::new(),
			library_dirs: Vec::new(),
			libraries: if cfg!(unix) { vec!["m".to_string()] } else { Vec::new() },
			timeout_secs: 120,
		}
	}
}

impl BuildConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}

	pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
		self.cache_dir = cache_dir.into();
		self
	}

	/// Applies `KILN_CACHE_DIR` and `CC` on top of file settings.
	pub fn apply_env(&mut self) {
		if let Some(dir) = std::env::var_os("KILN_CACHE_DIR") {
			self.cache_dir = PathBuf::from(dir);
		}
		if self.compiler.is_none()
			&& let Some(cc) = std::env::var_os("CC").filter(|cc| !cc.is_empty())
		{
			self.compiler = Some(PathBuf::from(cc));
		}
	}
}

/// Returns the default cache root: `~/.cache/kiln/dynamic-code/`.
pub fn default_cache_dir() -> PathBuf {
	dirs::cache_dir()
		.map(|dir| dir.join("kiln").join("dynamic-code"))
		.unwrap_or_else(|| std::env::temp_dir().join("kiln-dynamic-code"))
}

#[cfg(test)]
mod tests {
	use serial_test::serial;

	use super::*;

	#[test]
	fn test_partial_table_keeps_defaults() {
		let config: BuildConfig = toml::from_str(
			r#"
			cflags = ["-O3", "-march=native"]
			include-dirs = ["/opt/sim/include"]
			timeout-secs = 5
			"#,
		)
		.unwrap();

		assert_eq!(config.cflags, vec!["-O3", "-march=native"]);
		assert_eq!(config.include_dirs, vec![PathBuf::from("/opt/sim/include")]);
		assert_eq!(config.timeout(), Duration::from_secs(5));
		assert_eq!(config.cache_dir, default_cache_dir());
	}

	#[test]
	fn test_unknown_keys_are_rejected() {
		assert!(toml::from_str::<BuildConfig>("cache = \"/tmp\"").is_err());
	}

	#[test]
	#[serial]
	fn test_env_overrides() {
		// SAFETY: serialized with every other test touching the environment.
		unsafe {
			std::env::set_var("KILN_CACHE_DIR", "/tmp/kiln-env-cache");
			std::env::set_var("CC", "/usr/bin/env-cc");
		}

		let mut config = BuildConfig::default();
		config.apply_env();
		assert_eq!(config.cache_dir, PathBuf::from("/tmp/kiln-env-cache"));
		assert_eq!(config.compiler, Some(PathBuf::from("/usr/bin/env-cc")));

		let mut explicit = BuildConfig {
			compiler: Some(PathBuf::from("clang")),
			..BuildConfig::default()
		};
		explicit.apply_env();
		assert_eq!(explicit.compiler, Some(PathBuf::from("clang")));

		unsafe {
			std::env::remove_var("KILN_CACHE_DIR");
			std::env::remove_var("CC");
		}
	}
}
