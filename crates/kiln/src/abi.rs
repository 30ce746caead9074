//! C interface shared between the host and generated units.
//!
//! Mirrors the declarations in `templates/prelude.h` and the per-family
//! vtable structs in the family skeletons. Function pointers supplied by
//! generated code are `Option`s so a null pointer is representable.

use std::ffi::{c_char, c_int, c_void};
use std::fmt;

/// ABI revision stamped into the host table and every vtable header.
pub const KILN_ABI_VERSION: u32 = 1;

/// Status code returned across the boundary.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KilnStatus(pub c_int);

impl KilnStatus {
	pub const OK: Self = Self(0);
	pub const FAILED: Self = Self(1);
	pub const INCOMPATIBLE: Self = Self(2);
}

impl fmt::Display for KilnStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match *self {
			Self::OK => f.write_str("ok"),
			Self::FAILED => f.write_str("failed"),
			Self::INCOMPATIBLE => f.write_str("incompatible"),
			Self(code) => write!(f, "unknown status {code}"),
		}
	}
}

/// Services the host offers to a generated unit during and after registration.
#[repr(C)]
pub struct KilnHostV1 {
	pub abi_version: u32,
	pub log: extern "C" fn(message: *const c_char),
	pub register_type: extern "C" fn(type_name: *const c_char, family: *const c_char, vtable: *const c_void) -> KilnStatus,
}

/// Common prefix of every family vtable.
#[repr(C)]
pub struct KilnVTableHeader {
	pub abi_version: u32,
	/// Size of the full family vtable, header included.
	pub struct_size: u32,
	pub construct: Option<unsafe extern "C" fn(type_name: *const c_char) -> *mut c_void>,
	pub destroy: Option<unsafe extern "C" fn(state: *mut c_void)>,
}

pub type MarkerFn = unsafe extern "C" fn(load: c_int);

pub type EntryFn = unsafe extern "C" fn(host: *const KilnHostV1, type_name: *const c_char) -> KilnStatus;
