//! Code synthesis for dynamically compiled components.
//!
//! A [`CodeSpec`] carries the user's fragments; a [`FamilyDescriptor`] carries
//! the fixed skeleton of a family. [`render`] merges the two into a
//! [`RenderedSource`] whose [`ContentDigest`] is the cache key for everything
//! downstream.

mod digest;
mod error;
mod render;
mod spec;
pub mod template;

pub use digest::ContentDigest;
pub use error::TemplateError;
pub use render::{FamilyDescriptor, REQUIRED_PLACEHOLDERS, RenderedSource, entry_symbol, marker_symbol, render, synthesized_type_name};
pub use spec::CodeSpec;
pub use template::Template;
