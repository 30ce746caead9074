//! Scalar functions of time.

use std::ffi::c_void;

use kiln_codegen::FamilyDescriptor;
use kiln_registry::{ConstructError, Factory, Family, static_component};

use super::{ComponentArgs, DynamicFamily, DynamicObject, VTable, bind_with};
use crate::abi::KilnVTableHeader;
use crate::cache::ArtifactHandle;

/// A value that varies with time.
pub trait ScalarProvider: Send + Sync {
	fn value(&self, t: f64) -> f64;
}

/// The `scalar` family.
///
/// Dynamic code is the body of `double evaluate(kiln_instance* self, double t)`.
pub struct ScalarFamily;

impl Family for ScalarFamily {
	const NAME: &'static str = "scalar";
	type Instance = dyn ScalarProvider;
	type Args = ComponentArgs;
}

static DESCRIPTOR: FamilyDescriptor = FamilyDescriptor {
	name: ScalarFamily::NAME,
	operations: &["value"],
	skeleton: concat!(include_str!("../../templates/prelude.h"), include_str!("../../templates/scalar.c")),
};

impl DynamicFamily for ScalarFamily {
	fn descriptor() -> &'static FamilyDescriptor {
		&DESCRIPTOR
	}

	unsafe fn bind(vtable: *const c_void, artifact: ArtifactHandle) -> Result<Factory<Self>, String> {
		unsafe { bind_with::<Self, ScalarVTableV1>(vtable, artifact, wrap) }
	}
}

#[repr(C)]
pub(crate) struct ScalarVTableV1 {
	header: KilnVTableHeader,
	value: Option<unsafe extern "C" fn(state: *mut c_void, t: f64) -> f64>,
}

impl VTable for ScalarVTableV1 {
	fn header(&self) -> &KilnVTableHeader {
		&self.header
	}

	fn is_complete(&self) -> bool {
		self.value.is_some()
	}
}

struct DynamicScalar(DynamicObject<ScalarVTableV1>);

fn wrap(object: DynamicObject<ScalarVTableV1>) -> Box<dyn ScalarProvider> {
	Box::new(DynamicScalar(object))
}

impl ScalarProvider for DynamicScalar {
	fn value(&self, t: f64) -> f64 {
		match self.0.vtable().value {
			Some(value) => unsafe { value(self.0.state(), t) },
			None => f64::NAN,
		}
	}
}

struct Constant(f64);

impl ScalarProvider for Constant {
	fn value(&self, _t: f64) -> f64 {
		self.0
	}
}

fn constant(args: &ComponentArgs) -> Result<Box<dyn ScalarProvider>, ConstructError> {
	Ok(Box::new(Constant(args.f64("value")?)))
}

static_component!(ScalarFamily, "constant", constant);

struct LinearRamp {
	start: f64,
	slope: f64,
}

impl ScalarProvider for LinearRamp {
	fn value(&self, t: f64) -> f64 {
		self.start + self.slope * t
	}
}

fn linear_ramp(args: &ComponentArgs) -> Result<Box<dyn ScalarProvider>, ConstructError> {
	Ok(Box::new(LinearRamp {
		start: args.f64_or("start", 0.0)?,
		slope: args.f64("slope")?,
	}))
}

static_component!(ScalarFamily, "linearRamp", linear_ramp);

/// Coefficients in ascending powers of `t`.
struct Polynomial(Vec<f64>);

impl ScalarProvider for Polynomial {
	fn value(&self, t: f64) -> f64 {
		self.0.iter().rev().fold(0.0, |acc, c| acc * t + c)
	}
}

fn polynomial(args: &ComponentArgs) -> Result<Box<dyn ScalarProvider>, ConstructError> {
	let coeffs = args.f64_list("coeffs")?;
	if coeffs.is_empty() {
		return Err(ConstructError::invalid("coeffs", "at least one coefficient"));
	}
	Ok(Box::new(Polynomial(coeffs)))
}

static_component!(ScalarFamily, "polynomial", polynomial);
