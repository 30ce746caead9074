//! Runtime compilation of configuration-embedded components.
//!
//! A configuration entry may carry C fragments instead of naming a builtin
//! type. [`Kiln`] merges the fragments into the family's skeleton, compiles
//! the unit into a content-addressed shared library, loads it, and registers
//! the type it defines so the entry can be constructed like any other.
//!
//! ```no_run
//! use kiln::{Kiln, KilnConfig, ScalarFamily};
//! use kiln_codegen::CodeSpec;
//!
//! let kiln = Kiln::new(KilnConfig::load(None)?)?;
//! let ramp = kiln.materialize::<ScalarFamily>(&CodeSpec::new("ramp", "return 2.0 * t;"), &toml::Table::new())?;
//! assert_eq!(ramp.value(3.0), 6.0);
//! # Ok::<(), kiln::Error>(())
//! ```

pub mod abi;
mod artifact;
mod bridge;
mod cache;
pub mod config;
mod error;
pub mod families;
mod host;

pub use artifact::ArtifactFailure;
pub use bridge::Kiln;
pub use cache::{AcquireMode, ArtifactCache, ArtifactHandle, ArtifactLease, ArtifactState, CacheStats};
pub use config::{CaseConfig, ComponentConfig, KilnConfig};
pub use error::{Error, ErrorKind};
pub use families::patch::{PatchFamily, PatchValueProvider};
pub use families::scalar::{ScalarFamily, ScalarProvider};
pub use families::{ComponentArgs, DynamicFamily};
