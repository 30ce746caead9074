//! Turning configuration entries into live component instances.
//!
//! [`Kiln`] ties the registry, the renderer and the artifact cache together.
//! A dynamic entry is rendered, its artifact acquired, and the artifact asked
//! to register its synthesized type name before the registry constructs the
//! instance through the ordinary lookup path.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use kiln_build::Driver;
use kiln_codegen::{CodeSpec, RenderedSource, render};
use kiln_registry::{Origin, Registry};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::abi::{KILN_ABI_VERSION, KilnStatus};
use crate::artifact::ArtifactFailure;
use crate::cache::{AcquireMode, ArtifactCache, ArtifactLease, CacheStats};
use crate::config::{ComponentConfig, KilnConfig};
use crate::error::Error;
use crate::families::{ComponentArgs, DynamicFamily};
use crate::host::{RegistrationRequest, RegistrationScope};

/// Registry plus runtime compilation.
pub struct Kiln {
	registry: Arc<Registry>,
	cache: ArtifactCache,
	toolchain_tag: String,
	/// Serializes the check-then-register step for artifact types.
	registration: Mutex<()>,
}

impl Kiln {
	/// Builds a registry with every static component and resolves the toolchain.
	pub fn new(config: KilnConfig) -> Result<Self, Error> {
		let registry = Registry::with_builtins(config.duplicate_policy)?;
		let driver = Driver::new(config.build)?;
		let toolchain_tag = format!("kiln-abi {KILN_ABI_VERSION}; {}", driver.toolchain().tag());
		info!(
			cache = %driver.layout().root().display(),
			toolchain = driver.toolchain().tag(),
			builtins = registry.len(),
			duplicate_policy = ?registry.policy(),
			"Initialized kiln"
		);
		Ok(Self {
			registry: Arc::new(registry),
			cache: ArtifactCache::new(driver),
			toolchain_tag,
			registration: Mutex::new(()),
		})
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn cache(&self) -> &ArtifactCache {
		&self.cache
	}

	pub fn stats(&self) -> CacheStats {
		self.cache.stats()
	}

	/// Renders the unit for `spec` without building it.
	pub fn render<F: DynamicFamily>(&self, spec: &CodeSpec) -> Result<RenderedSource, Error> {
		Ok(render(F::descriptor(), spec, &self.toolchain_tag)?)
	}

	/// Constructs an instance of family `F` from dynamic code.
	///
	/// Equivalent to [`Kiln::materialize_with`] with [`AcquireMode::Cached`].
	pub fn materialize<F: DynamicFamily>(&self, spec: &CodeSpec, options: &toml::Table) -> Result<Box<F::Instance>, Error> {
		self.materialize_with::<F>(spec, options, AcquireMode::Cached)
	}

	/// Constructs an instance of family `F` from dynamic code.
	///
	/// The returned instance keeps its artifact loaded until it is dropped.
	///
	/// # Errors
	///
	/// * [`ErrorKind::TemplateMismatch`] if the family skeleton is malformed.
	/// * [`ErrorKind::CompileError`] or [`ErrorKind::CompileTimeout`] if the build fails.
	/// * [`ErrorKind::VerificationFailed`] if the artifact is not the one the source describes.
	/// * [`ErrorKind::DuplicateType`] if another origin already owns the type name.
	/// * [`ErrorKind::Construct`] if the generated constructor fails.
	///
	/// [`ErrorKind::TemplateMismatch`]: crate::ErrorKind::TemplateMismatch
	/// [`ErrorKind::CompileError`]: crate::ErrorKind::CompileError
	/// [`ErrorKind::CompileTimeout`]: crate::ErrorKind::CompileTimeout
	/// [`ErrorKind::VerificationFailed`]: crate::ErrorKind::VerificationFailed
	/// [`ErrorKind::DuplicateType`]: crate::ErrorKind::DuplicateType
	/// [`ErrorKind::Construct`]: crate::ErrorKind::Construct
	pub fn materialize_with<F: DynamicFamily>(
		&self,
		spec: &CodeSpec,
		options: &toml::Table,
		mode: AcquireMode,
	) -> Result<Box<F::Instance>, Error> {
		let source = self.render::<F>(spec)?;
		let type_name = source.type_name();
		let lease = self.cache.acquire(&source, mode)?;
		self.ensure_registered::<F>(&lease, &type_name)?;

		let instance = self
			.registry
			.create::<F>(&type_name, &ComponentArgs::new(type_name.clone(), options.clone()))?;
		debug!(family = F::NAME, declared = %spec.type_name, type_name = %type_name, "Materialized dynamic component");
		Ok(instance)
	}

	/// Constructs the component an entry describes.
	///
	/// Entries with `code` are compiled; others are looked up by `type`.
	pub fn create_configured<F: DynamicFamily>(&self, entry: &ComponentConfig) -> Result<Box<F::Instance>, Error> {
		if entry.family != F::NAME {
			return Err(Error::UnknownFamily(entry.family.clone()));
		}
		match entry.code_spec() {
			Some(spec) => self.materialize::<F>(&spec, &entry.options),
			None => Ok(self.registry.create::<F>(&entry.type_name, &entry.args(entry.type_name.clone()))?),
		}
	}

	/// Runs the artifact's entry point unless it already registered `type_name`.
	fn ensure_registered<F: DynamicFamily>(&self, lease: &ArtifactLease, type_name: &str) -> Result<(), Error> {
		let digest = lease.digest().to_string();
		let origin = Origin::Artifact(digest.clone());

		let _registration = self.registration.lock();
		if self.registry.origin::<F>(type_name).as_ref() == Some(&origin) {
			return Ok(());
		}

		let artifact = lease.artifact().ok_or_else(|| ArtifactFailure::Verification {
			digest: digest.clone(),
			reason: "artifact was unloaded while leased".to_string(),
		})?;

		let failure: Rc<RefCell<Option<Error>>> = Rc::default();
		let status = {
			let registry = Arc::clone(&self.registry);
			let handle = lease.handle();
			let expected = type_name.to_string();
			let origin = origin.clone();
			let failure = Rc::clone(&failure);

			let _scope = RegistrationScope::enter(Box::new(move |request: RegistrationRequest<'_>| {
				if request.family != F::NAME || request.type_name != expected {
					*failure.borrow_mut() = Some(Error::Artifact(ArtifactFailure::Verification {
						digest: handle.digest().to_string(),
						reason: format!(
							"registered {} type `{}`, expected {} type `{expected}`",
							request.family,
							request.type_name,
							F::NAME
						),
					}));
					return KilnStatus::FAILED;
				}
				let factory = match unsafe { F::bind(request.vtable, handle.clone()) } {
					Ok(factory) => factory,
					Err(reason) => {
						*failure.borrow_mut() = Some(Error::Artifact(ArtifactFailure::Verification {
							digest: handle.digest().to_string(),
							reason,
						}));
						return KilnStatus::INCOMPATIBLE;
					}
				};
				match registry.register::<F>(request.type_name, origin.clone(), factory) {
					Ok(()) => KilnStatus::OK,
					Err(error) => {
						*failure.borrow_mut() = Some(Error::Registry(error));
						KilnStatus::FAILED
					}
				}
			}));
			artifact.register(type_name)
		};

		if let Some(error) = failure.borrow_mut().take() {
			return Err(error);
		}
		if status != KilnStatus::OK {
			return Err(ArtifactFailure::Verification {
				digest,
				reason: format!("entry point returned {status}"),
			}
			.into());
		}
		if self.registry.origin::<F>(type_name).as_ref() != Some(&origin) {
			return Err(ArtifactFailure::Verification {
				digest,
				reason: format!("entry point did not register `{type_name}`"),
			}
			.into());
		}
		debug!(family = F::NAME, type_name, digest = lease.digest().short(), "Registered dynamic type");
		Ok(())
	}

	/// Unloads every artifact no instance refers to and drops its registry entries.
	pub fn evict_idle(&self) -> usize {
		let registry = &self.registry;
		let evicted = self.cache.evict_idle(|digest| {
			let removed = registry.unregister_origin(&Origin::Artifact(digest.to_string()));
			debug!(digest = digest.short(), removed, "Unregistered artifact types");
		});
		evicted.len()
	}
}

impl Drop for Kiln {
	fn drop(&mut self) {
		let evicted = self.evict_idle();
		let stats = self.cache.stats();
		if stats.loads > stats.unloads {
			warn!(
				still_loaded = stats.loads - stats.unloads,
				"Artifacts remain loaded for instances that outlive the loader"
			);
		}
		debug!(evicted, "Shut down kiln");
	}
}
