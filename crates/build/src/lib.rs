//! Compile/link driver for dynamic code.
//!
//! This crate turns a [`kiln_codegen::RenderedSource`] into a shared library in a
//! digest-keyed cache directory, invoking the system C toolchain with a bounded
//! timeout and capturing its diagnostics.

mod compile;
mod config;
mod error;
mod layout;
mod process;
mod toolchain;

pub use compile::{BuildMode, BuildOutcome, Driver, DriverStats};
pub use config::{BuildConfig, default_cache_dir};
pub use error::BuildFailure;
pub use layout::{CacheEntry, CacheLayout, library_extension, library_file_name};
pub use toolchain::Toolchain;
