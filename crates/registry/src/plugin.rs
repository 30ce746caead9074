//! Static self-registration.
//!
//! Components compiled into the binary submit a [`StaticComponent`] through
//! `inventory`; [`crate::Registry::with_builtins`] installs all of them.

use crate::error::RegistryError;
use crate::registry::Registry;

/// A statically compiled component that installs itself into a registry.
pub struct StaticComponent {
	/// Family namespace the component belongs to.
	pub family: &'static str,
	/// Name the component is registered under.
	pub name: &'static str,
	/// Called during registry construction to register the component's factory.
	pub install: fn(&Registry) -> Result<(), RegistryError>,
}

inventory::collect!(StaticComponent);

impl StaticComponent {
	pub const fn new(family: &'static str, name: &'static str, install: fn(&Registry) -> Result<(), RegistryError>) -> Self {
		Self { family, name, install }
	}
}

/// Returns every submitted static component, ordered by family then name.
pub fn static_components() -> Vec<&'static StaticComponent> {
	let mut components: Vec<&'static StaticComponent> = inventory::iter::<StaticComponent>.into_iter().collect();
	components.sort_by(|a, b| a.family.cmp(b.family).then_with(|| a.name.cmp(b.name)));
	components
}

pub(crate) fn install_static(registry: &Registry) -> Result<(), RegistryError> {
	for component in static_components() {
		(component.install)(registry)?;
		tracing::trace!(family = component.family, name = component.name, "Installed static component");
	}
	Ok(())
}

/// Submits a builtin factory for a family under a fixed name.
///
/// `$factory` must be a function path with the family's factory signature.
///
/// ```ignore
/// fn constant(args: &ComponentArgs) -> Result<Box<dyn ScalarProvider>, ConstructError> { .. }
/// static_component!(ScalarFamily, "constant", constant);
/// ```
#[macro_export]
macro_rules! static_component {
	($family:ty, $name:literal, $factory:path) => {
		const _: () = {
			fn install(registry: &$crate::Registry) -> ::std::result::Result<(), $crate::RegistryError> {
				registry.register::<$family>($name, $crate::Origin::Builtin, ::std::sync::Arc::new($factory))
			}

			$crate::inventory::submit! {
				$crate::StaticComponent::new(<$family as $crate::Family>::NAME, $name, install)
			}
		};
	};
}
