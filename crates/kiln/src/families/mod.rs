//! Component families that can be extended with dynamic code.

use std::ffi::{CString, c_void};
use std::sync::Arc;

use kiln_codegen::FamilyDescriptor;
use kiln_registry::{ConstructError, Factory, Family};

use crate::abi::{KILN_ABI_VERSION, KilnVTableHeader};
use crate::cache::{ArtifactHandle, ArtifactLease};

pub mod patch;
pub mod scalar;

/// Construction arguments for every family in this crate.
///
/// `options` holds the configuration entry's keys other than the ones the
/// loader itself interprets (`family`, `type`, `code`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentArgs {
	type_name: String,
	options: toml::Table,
}

impl ComponentArgs {
	pub fn new(type_name: impl Into<String>, options: toml::Table) -> Self {
		Self {
			type_name: type_name.into(),
			options,
		}
	}

	/// Name the component is being constructed under.
	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	/// Reads a required number; integers are widened.
	pub fn f64(&self, key: &str) -> Result<f64, ConstructError> {
		self.f64_opt(key)?.ok_or_else(|| ConstructError::missing(key))
	}

	pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, ConstructError> {
		Ok(self.f64_opt(key)?.unwrap_or(default))
	}

	fn f64_opt(&self, key: &str) -> Result<Option<f64>, ConstructError> {
		match self.options.get(key) {
			None => Ok(None),
			Some(value) => number(value).map(Some).ok_or_else(|| ConstructError::invalid(key, "a number")),
		}
	}

	pub fn f64_list(&self, key: &str) -> Result<Vec<f64>, ConstructError> {
		let value = self.options.get(key).ok_or_else(|| ConstructError::missing(key))?;
		let toml::Value::Array(items) = value else {
			return Err(ConstructError::invalid(key, "an array of numbers"));
		};
		items
			.iter()
			.map(|item| number(item).ok_or_else(|| ConstructError::invalid(key, "an array of numbers")))
			.collect()
	}
}

fn number(value: &toml::Value) -> Option<f64> {
	match value {
		toml::Value::Float(v) => Some(*v),
		toml::Value::Integer(v) => Some(*v as f64),
		_ => None,
	}
}

/// A family whose variants can be supplied by generated code.
pub trait DynamicFamily: Family<Args = ComponentArgs> {
	/// Skeleton and metadata for rendering this family's units.
	fn descriptor() -> &'static FamilyDescriptor;

	/// Wraps a vtable registered by a loaded unit into a factory.
	///
	/// # Safety
	///
	/// `vtable` must point into the artifact `artifact` refers to and stay
	/// valid for as long as that artifact is loaded.
	unsafe fn bind(vtable: *const c_void, artifact: ArtifactHandle) -> Result<Factory<Self>, String>;
}

/// A family vtable laid out as [`KilnVTableHeader`] followed by family operations.
pub(crate) trait VTable: 'static {
	fn header(&self) -> &KilnVTableHeader;

	/// Whether every family operation is present.
	fn is_complete(&self) -> bool;
}

/// A vtable pointer into a loaded artifact.
pub(crate) struct VTablePtr<V>(*const V);

impl<V> Clone for VTablePtr<V> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<V> Copy for VTablePtr<V> {}

// Vtables are immutable statics of the generated unit.
unsafe impl<V> Send for VTablePtr<V> {}
unsafe impl<V> Sync for VTablePtr<V> {}

/// Validates the header and operations of a registered vtable.
///
/// # Safety
///
/// `ptr` must be non-null and point to at least a [`KilnVTableHeader`].
pub(crate) unsafe fn checked_vtable<V: VTable>(ptr: *const c_void) -> Result<VTablePtr<V>, String> {
	let header = unsafe { &*ptr.cast::<KilnVTableHeader>() };
	if header.abi_version != KILN_ABI_VERSION {
		return Err(format!("vtable ABI version {} (host speaks {KILN_ABI_VERSION})", header.abi_version));
	}
	let expected = std::mem::size_of::<V>();
	if (header.struct_size as usize) < expected {
		return Err(format!("vtable is {} bytes, expected at least {expected}", header.struct_size));
	}
	if header.construct.is_none() || header.destroy.is_none() {
		return Err("vtable lacks construct or destroy".to_string());
	}
	let vtable = ptr.cast::<V>();
	if !unsafe { &*vtable }.is_complete() {
		return Err("vtable lacks a family operation".to_string());
	}
	Ok(VTablePtr(vtable))
}

/// An object constructed by generated code.
///
/// Holds a lease so the library stays mapped until the object is destroyed.
pub(crate) struct DynamicObject<V: VTable> {
	state: *mut c_void,
	vtable: VTablePtr<V>,
	_lease: ArtifactLease,
}

// The generated state is only touched through the vtable, which the unit
// author promises is safe to call from any thread.
unsafe impl<V: VTable> Send for DynamicObject<V> {}
unsafe impl<V: VTable> Sync for DynamicObject<V> {}

impl<V: VTable> DynamicObject<V> {
	/// Creates the generated object for `type_name`.
	///
	/// # Safety
	///
	/// `vtable` must have passed [`checked_vtable`] and belong to `lease`'s artifact.
	pub(crate) unsafe fn construct(vtable: VTablePtr<V>, lease: ArtifactLease, type_name: &str) -> Result<Self, ConstructError> {
		let name = CString::new(type_name).map_err(|_| ConstructError::new("type name contains a NUL byte"))?;
		let construct = unsafe { &*vtable.0 }
			.header()
			.construct
			.ok_or_else(|| ConstructError::new("vtable lacks construct"))?;
		let state = unsafe { construct(name.as_ptr()) };
		if state.is_null() {
			return Err(ConstructError::new("generated constructor returned null"));
		}
		Ok(Self {
			state,
			vtable,
			_lease: lease,
		})
	}

	pub(crate) fn vtable(&self) -> &V {
		unsafe { &*self.vtable.0 }
	}

	pub(crate) fn state(&self) -> *mut c_void {
		self.state
	}
}

impl<V: VTable> Drop for DynamicObject<V> {
	fn drop(&mut self) {
		if let Some(destroy) = self.vtable().header().destroy {
			unsafe { destroy(self.state) };
		}
	}
}

/// Builds a factory that constructs `wrap(object)` from a registered vtable.
///
/// # Safety
///
/// Same contract as [`DynamicFamily::bind`].
pub(crate) unsafe fn bind_with<F, V>(
	vtable: *const c_void,
	artifact: ArtifactHandle,
	wrap: fn(DynamicObject<V>) -> Box<F::Instance>,
) -> Result<Factory<F>, String>
where
	F: Family<Args = ComponentArgs>,
	V: VTable,
{
	let vtable = unsafe { checked_vtable::<V>(vtable) }?;
	let factory: Factory<F> = Arc::new(move |args: &ComponentArgs| -> Result<Box<F::Instance>, ConstructError> {
		let lease = artifact
			.lease()
			.ok_or_else(|| ConstructError::new(format!("artifact {} is no longer loaded", artifact.digest().short())))?;
		let object = unsafe { DynamicObject::construct(vtable, lease, args.type_name()) }?;
		Ok(wrap(object))
	});
	Ok(factory)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn args(text: &str) -> ComponentArgs {
		ComponentArgs::new("t", toml::from_str(text).unwrap())
	}

	#[test]
	fn test_numbers_widen_integers() {
		let args = args("a = 2\nb = 2.5\nc = [1, 2.5]");
		assert_eq!(args.f64("a").unwrap(), 2.0);
		assert_eq!(args.f64("b").unwrap(), 2.5);
		assert_eq!(args.f64_list("c").unwrap(), vec![1.0, 2.5]);
		assert_eq!(args.f64_or("missing", 7.0).unwrap(), 7.0);
	}

	#[test]
	fn test_bad_arguments_are_reported() {
		let args = args("a = \"x\"\nc = [1, \"x\"]");
		assert_eq!(args.f64("missing").unwrap_err(), ConstructError::missing("missing"));
		assert_eq!(args.f64("a").unwrap_err(), ConstructError::invalid("a", "a number"));
		assert!(args.f64_list("c").is_err());
	}
}
