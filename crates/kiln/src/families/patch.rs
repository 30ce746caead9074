//! Boundary values assigned per face.

use std::ffi::c_void;

use kiln_codegen::FamilyDescriptor;
use kiln_registry::{ConstructError, Factory, Family, static_component};

use super::{ComponentArgs, DynamicFamily, DynamicObject, VTable, bind_with};
use crate::abi::KilnVTableHeader;
use crate::cache::ArtifactHandle;

/// Assigns one value per face of a boundary patch.
pub trait PatchValueProvider: Send + Sync {
	/// Writes the value of each face at time `t`.
	///
	/// `points` holds the face centres; `values` has the same length.
	fn update(&self, t: f64, points: &[[f64; 3]], values: &mut [f64]);
}

/// The `patch` family.
///
/// Dynamic code is the body of
/// `void evaluate(kiln_instance* self, double t, const double* points, size_t n, double* values)`,
/// where `points` holds `n` packed xyz triples.
pub struct PatchFamily;

impl Family for PatchFamily {
	const NAME: &'static str = "patch";
	type Instance = dyn PatchValueProvider;
	type Args = ComponentArgs;
}

static DESCRIPTOR: FamilyDescriptor = FamilyDescriptor {
	name: PatchFamily::NAME,
	operations: &["update"],
	skeleton: concat!(include_str!("../../templates/prelude.h"), include_str!("../../templates/patch.c")),
};

impl DynamicFamily for PatchFamily {
	fn descriptor() -> &'static FamilyDescriptor {
		&DESCRIPTOR
	}

	unsafe fn bind(vtable: *const c_void, artifact: ArtifactHandle) -> Result<Factory<Self>, String> {
		unsafe { bind_with::<Self, PatchVTableV1>(vtable, artifact, wrap) }
	}
}

type UpdateFn = unsafe extern "C" fn(state: *mut c_void, t: f64, points: *const f64, n: usize, values: *mut f64);

#[repr(C)]
pub(crate) struct PatchVTableV1 {
	header: KilnVTableHeader,
	update: Option<UpdateFn>,
}

impl VTable for PatchVTableV1 {
	fn header(&self) -> &KilnVTableHeader {
		&self.header
	}

	fn is_complete(&self) -> bool {
		self.update.is_some()
	}
}

struct DynamicPatch(DynamicObject<PatchVTableV1>);

fn wrap(object: DynamicObject<PatchVTableV1>) -> Box<dyn PatchValueProvider> {
	Box::new(DynamicPatch(object))
}

impl PatchValueProvider for DynamicPatch {
	fn update(&self, t: f64, points: &[[f64; 3]], values: &mut [f64]) {
		let n = points.len().min(values.len());
		if let Some(update) = self.0.vtable().update {
			unsafe { update(self.0.state(), t, points.as_ptr().cast::<f64>(), n, values.as_mut_ptr()) };
		}
	}
}

struct UniformFixedValue(f64);

impl PatchValueProvider for UniformFixedValue {
	fn update(&self, _t: f64, _points: &[[f64; 3]], values: &mut [f64]) {
		values.fill(self.0);
	}
}

fn uniform_fixed_value(args: &ComponentArgs) -> Result<Box<dyn PatchValueProvider>, ConstructError> {
	Ok(Box::new(UniformFixedValue(args.f64("value")?)))
}

static_component!(PatchFamily, "uniformFixedValue", uniform_fixed_value);
