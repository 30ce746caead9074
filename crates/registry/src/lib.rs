//! Name-keyed factory registry.
//!
//! Every polymorphic component family (scalar providers, patch value
//! providers, ...) is looked up and instantiated through a [`Registry`] by the
//! string name a configuration file supplies. Statically compiled variants
//! self-register via [`static_component!`]; dynamically compiled variants
//! register the same way once their artifact is loaded.
//!
//! # Layout
//!
//! * [`family`]: the [`Family`] trait, factories and entry origins
//! * [`registry`]: the [`Registry`] container
//! * [`policy`]: collision handling for duplicate names
//! * [`plugin`]: `inventory`-collected static components

pub mod error;
pub mod family;
pub mod plugin;
pub mod policy;
pub mod registry;

#[doc(hidden)]
pub use inventory;

pub use error::{ConstructError, RegistryError};
pub use family::{Factory, Family, Origin};
pub use plugin::{StaticComponent, static_components};
pub use policy::DuplicatePolicy;
pub use registry::Registry;
