//! Host callbacks handed to generated units.
//!
//! Registration is only valid while the bridge is inside an entry call; the
//! bridge installs a per-thread handler with [`RegistrationScope`] for that
//! window and `register_type` routes to it.

use std::cell::RefCell;
use std::ffi::{CStr, c_char, c_void};

use tracing::{info, warn};

use crate::abi::{KILN_ABI_VERSION, KilnHostV1, KilnStatus};

pub(crate) static HOST_V1: KilnHostV1 = KilnHostV1 {
	abi_version: KILN_ABI_VERSION,
	log: host_log,
	register_type: host_register_type,
};

/// One `register_type` call, decoded.
pub(crate) struct RegistrationRequest<'a> {
	pub type_name: &'a str,
	pub family: &'a str,
	pub vtable: *const c_void,
}

pub(crate) type RegistrationHandler = Box<dyn FnMut(RegistrationRequest<'_>) -> KilnStatus>;

thread_local! {
	static ACTIVE_REGISTRATION: RefCell<Option<RegistrationHandler>> = const { RefCell::new(None) };
}

/// Routes `register_type` calls on this thread to a handler until dropped.
pub(crate) struct RegistrationScope {
	previous: Option<RegistrationHandler>,
}

impl RegistrationScope {
	pub(crate) fn enter(handler: RegistrationHandler) -> Self {
		let previous = ACTIVE_REGISTRATION.with(|active| active.replace(Some(handler)));
		Self { previous }
	}
}

impl Drop for RegistrationScope {
	fn drop(&mut self) {
		let previous = self.previous.take();
		ACTIVE_REGISTRATION.with(|active| *active.borrow_mut() = previous);
	}
}

fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
	if ptr.is_null() {
		return None;
	}
	unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

extern "C" fn host_log(message: *const c_char) {
	if message.is_null() {
		return;
	}
	let message = unsafe { CStr::from_ptr(message) }.to_string_lossy();
	info!(target: "kiln::dynamic", "{message}");
}

extern "C" fn host_register_type(type_name: *const c_char, family: *const c_char, vtable: *const c_void) -> KilnStatus {
	let (Some(type_name), Some(family)) = (c_str(type_name), c_str(family)) else {
		warn!("Dynamic code passed an invalid type or family name to register_type");
		return KilnStatus::FAILED;
	};
	if vtable.is_null() {
		warn!(type_name, family, "Dynamic code registered a null vtable");
		return KilnStatus::FAILED;
	}

	ACTIVE_REGISTRATION.with(|active| {
		let mut active = active.borrow_mut();
		match active.as_mut() {
			Some(handler) => handler(RegistrationRequest { type_name, family, vtable }),
			None => {
				warn!(type_name, family, "register_type called outside of an entry call");
				KilnStatus::FAILED
			}
		}
	})
}
