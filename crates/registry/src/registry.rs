//! The registry container.
//!
//! # Invariants
//!
//! - Keys are unique per family; collisions follow the registry's [`DuplicatePolicy`].
//! - [`Registry::create`] never mutates the registry and runs the factory without
//!   holding the lock, so factories may call back into the registry.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::RegistryError;
use crate::family::{Factory, Family, Origin};
use crate::policy::DuplicatePolicy;

struct Entry {
	/// Always a `Factory<F>` for the family the entry is filed under.
	factory: Arc<dyn Any + Send + Sync>,
	origin: Origin,
}

/// Mapping from (family, type name) to a factory.
pub struct Registry {
	policy: DuplicatePolicy,
	families: RwLock<HashMap<&'static str, BTreeMap<String, Entry>>>,
}

impl Registry {
	/// Creates an empty registry.
	pub fn new(policy: DuplicatePolicy) -> Self {
		Self {
			policy,
			families: RwLock::new(HashMap::new()),
		}
	}

	/// Creates a registry and installs every statically submitted component.
	pub fn with_builtins(policy: DuplicatePolicy) -> Result<Self, RegistryError> {
		let registry = Self::new(policy);
		crate::plugin::install_static(&registry)?;
		debug!(entries = registry.len(), "Registry initialized with builtins");
		Ok(registry)
	}

	pub fn policy(&self) -> DuplicatePolicy {
		self.policy
	}

	/// Adds a factory for `name` in family `F`.
	///
	/// # Errors
	///
	/// Returns [`RegistryError::DuplicateType`] if the key exists and the policy is
	/// [`DuplicatePolicy::Reject`].
	pub fn register<F: Family>(&self, name: impl Into<String>, origin: Origin, factory: Factory<F>) -> Result<(), RegistryError> {
		let name = name.into();
		let mut families = self.families.write();
		let entries = families.entry(F::NAME).or_default();

		if let Some(existing) = entries.get(&name) {
			match self.policy {
				DuplicatePolicy::Reject => {
					return Err(RegistryError::DuplicateType {
						family: F::NAME,
						name,
						existing: existing.origin.clone(),
					});
				}
				DuplicatePolicy::Replace => {
					debug!(family = F::NAME, name = %name, old = %existing.origin, new = %origin, "Replacing registry entry");
				}
			}
		}

		entries.insert(
			name,
			Entry {
				factory: Arc::new(factory),
				origin,
			},
		);
		Ok(())
	}

	/// Returns the factory registered for `name`.
	pub fn factory<F: Family>(&self, name: &str) -> Result<Factory<F>, RegistryError> {
		let families = self.families.read();
		let Some(entry) = families.get(F::NAME).and_then(|entries| entries.get(name)) else {
			return Err(RegistryError::UnknownType {
				family: F::NAME,
				name: name.to_string(),
				known: families.get(F::NAME).map(|entries| entries.keys().cloned().collect()).unwrap_or_default(),
			});
		};

		entry
			.factory
			.downcast_ref::<Factory<F>>()
			.cloned()
			.ok_or_else(|| RegistryError::FamilyMismatch {
				family: F::NAME,
				name: name.to_string(),
			})
	}

	/// Looks up `name` and invokes its factory.
	pub fn create<F: Family>(&self, name: &str, args: &F::Args) -> Result<Box<F::Instance>, RegistryError> {
		let factory = self.factory::<F>(name)?;
		factory(args).map_err(|source| RegistryError::Construct {
			family: F::NAME,
			name: name.to_string(),
			source,
		})
	}

	/// Removes one entry, returning its origin.
	pub fn unregister<F: Family>(&self, name: &str) -> Option<Origin> {
		let mut families = self.families.write();
		families.get_mut(F::NAME)?.remove(name).map(|entry| entry.origin)
	}

	/// Removes every entry created by `origin` across all families.
	pub fn unregister_origin(&self, origin: &Origin) -> usize {
		let mut families = self.families.write();
		let mut removed = 0;
		for entries in families.values_mut() {
			let before = entries.len();
			entries.retain(|_, entry| &entry.origin != origin);
			removed += before - entries.len();
		}
		if removed > 0 {
			debug!(%origin, removed, "Unregistered entries");
		}
		removed
	}

	pub fn contains<F: Family>(&self, name: &str) -> bool {
		self.families.read().get(F::NAME).is_some_and(|entries| entries.contains_key(name))
	}

	pub fn origin<F: Family>(&self, name: &str) -> Option<Origin> {
		self.families.read().get(F::NAME)?.get(name).map(|entry| entry.origin.clone())
	}

	/// Returns the registered names of family `F` in sorted order.
	pub fn names<F: Family>(&self) -> Vec<String> {
		self.families
			.read()
			.get(F::NAME)
			.map(|entries| entries.keys().cloned().collect())
			.unwrap_or_default()
	}

	/// Total number of entries across all families.
	pub fn len(&self) -> usize {
		self.families.read().values().map(BTreeMap::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Default for Registry {
	fn default() -> Self {
		Self::new(DuplicatePolicy::default())
	}
}
