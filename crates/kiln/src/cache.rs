//! In-process artifact cache.
//!
//! # Invariants
//!
//! - At most one build-and-load runs per digest; concurrent requests for the
//!   same digest wait on the slot and observe the same outcome.
//! - A failed digest stays failed for [`AcquireMode::Cached`] requests until a
//!   request with [`AcquireMode::Retry`] clears it.
//! - A loaded artifact is only unloaded by [`ArtifactCache::evict_idle`], and
//!   only while no [`ArtifactLease`] references it.
//! - Every load of a digest gets a new generation. An [`ArtifactHandle`] only
//!   leases the load it was taken from, never a later reload of the same digest.
//! - No lock is held while the toolchain or the loader runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_build::{BuildMode, Driver};
use kiln_codegen::{ContentDigest, RenderedSource};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::artifact::{ArtifactFailure, LoadedArtifact};

/// Whether a recorded failure may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireMode {
	/// Reuse whatever the cache holds, including a recorded failure.
	#[default]
	Cached,
	/// Discard a recorded failure and any on-disk artifact, then rebuild.
	Retry,
}

/// Observable lifecycle state of a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
	Unloaded,
	Loading,
	Loaded,
	Failed,
}

/// Counters describing cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
	/// Toolchain invocations.
	pub compiles: usize,
	/// Builds satisfied by an artifact already on disk.
	pub disk_hits: usize,
	/// Requests satisfied by an artifact already loaded.
	pub memory_hits: usize,
	pub loads: usize,
	pub unloads: usize,
}

enum SlotState {
	Unloaded,
	Loading,
	Loaded(Arc<LoadedArtifact>),
	Failed(ArtifactFailure),
}

struct SlotInner {
	state: SlotState,
	refs: usize,
	generation: u64,
}

pub(crate) struct Slot {
	digest: ContentDigest,
	inner: Mutex<SlotInner>,
	ready: Condvar,
}

impl Slot {
	fn new(digest: ContentDigest) -> Self {
		Self {
			digest,
			inner: Mutex::new(SlotInner {
				state: SlotState::Unloaded,
				refs: 0,
				generation: 0,
			}),
			ready: Condvar::new(),
		}
	}
}

/// Single-flight map from content digest to loaded artifact.
pub struct ArtifactCache {
	driver: Driver,
	slots: Mutex<HashMap<ContentDigest, Arc<Slot>>>,
	memory_hits: AtomicUsize,
	loads: AtomicUsize,
	unloads: AtomicUsize,
}

enum Step {
	Hit,
	Wait,
	Fail(ArtifactFailure),
	Build,
}

impl ArtifactCache {
	pub fn new(driver: Driver) -> Self {
		Self {
			driver,
			slots: Mutex::new(HashMap::new()),
			memory_hits: AtomicUsize::new(0),
			loads: AtomicUsize::new(0),
			unloads: AtomicUsize::new(0),
		}
	}

	pub fn driver(&self) -> &Driver {
		&self.driver
	}

	fn slot(&self, digest: &ContentDigest) -> Arc<Slot> {
		let mut slots = self.slots.lock();
		Arc::clone(slots.entry(digest.clone()).or_insert_with(|| Arc::new(Slot::new(digest.clone()))))
	}

	/// Returns a lease on the loaded artifact for `source`, building and loading
	/// it first if needed.
	///
	/// # Errors
	///
	/// Returns the build, load or verification failure for the digest. Every
	/// caller waiting on the same build receives a clone of the same failure.
	pub fn acquire(&self, source: &RenderedSource, mode: AcquireMode) -> Result<ArtifactLease, ArtifactFailure> {
		let slot = self.slot(source.digest());

		{
			let mut inner = slot.inner.lock();
			loop {
				let step = match &inner.state {
					SlotState::Loaded(_) => Step::Hit,
					SlotState::Loading => Step::Wait,
					SlotState::Failed(failure) if mode == AcquireMode::Cached => Step::Fail(failure.clone()),
					SlotState::Failed(_) | SlotState::Unloaded => Step::Build,
				};
				match step {
					Step::Hit => {
						inner.refs += 1;
						self.memory_hits.fetch_add(1, Ordering::SeqCst);
						trace!(digest = slot.digest.short(), refs = inner.refs, "Artifact cache hit");
						let generation = inner.generation;
						drop(inner);
						return Ok(ArtifactLease { slot, generation });
					}
					Step::Wait => slot.ready.wait(&mut inner),
					Step::Fail(failure) => return Err(failure),
					Step::Build => break,
				}
			}
			inner.state = SlotState::Loading;
		}

		let mut pending = PendingLoad { slot: &slot, settled: false };
		let result = self.build_and_load(source, mode);

		let mut inner = slot.inner.lock();
		let outcome = match result {
			Ok(artifact) => {
				inner.state = SlotState::Loaded(Arc::new(artifact));
				inner.refs += 1;
				inner.generation += 1;
				Ok(inner.generation)
			}
			Err(failure) => {
				inner.state = SlotState::Failed(failure.clone());
				Err(failure)
			}
		};
		pending.settled = true;
		drop(inner);
		slot.ready.notify_all();

		outcome.map(|generation| ArtifactLease {
			slot: Arc::clone(&slot),
			generation,
		})
	}

	fn build_and_load(&self, source: &RenderedSource, mode: AcquireMode) -> Result<LoadedArtifact, ArtifactFailure> {
		let digest = source.digest();
		let build_mode = match mode {
			AcquireMode::Cached => BuildMode::Cached,
			AcquireMode::Retry => BuildMode::Rebuild,
		};
		let outcome = self.driver.build(source, build_mode)?;

		match LoadedArtifact::load(outcome.path(), digest) {
			Ok(artifact) => {
				self.loads.fetch_add(1, Ordering::SeqCst);
				Ok(artifact)
			}
			Err(failure) => {
				warn!(digest = digest.short(), error = %failure, "Discarding unusable artifact");
				if let Err(e) = self.driver.layout().remove_artifact(digest) {
					warn!(digest = digest.short(), error = %e, "Failed to remove artifact");
				}
				Err(failure)
			}
		}
	}

	pub fn state(&self, digest: &ContentDigest) -> ArtifactState {
		let Some(slot) = self.slots.lock().get(digest).cloned() else {
			return ArtifactState::Unloaded;
		};
		match slot.inner.lock().state {
			SlotState::Unloaded => ArtifactState::Unloaded,
			SlotState::Loading => ArtifactState::Loading,
			SlotState::Loaded(_) => ArtifactState::Loaded,
			SlotState::Failed(_) => ArtifactState::Failed,
		}
	}

	/// Number of live leases on `digest`.
	pub fn ref_count(&self, digest: &ContentDigest) -> usize {
		self.slots.lock().get(digest).map_or(0, |slot| slot.inner.lock().refs)
	}

	/// Unloads every loaded artifact with no live leases.
	///
	/// `on_unload` runs for each such digest before its library is unmapped,
	/// so registry entries pointing into it can be removed first. Unloaded
	/// slots nothing else refers to are then dropped from the map; failed
	/// slots stay so their failure remains sticky.
	pub fn evict_idle(&self, mut on_unload: impl FnMut(&ContentDigest)) -> Vec<ContentDigest> {
		let slots: Vec<Arc<Slot>> = self.slots.lock().values().cloned().collect();
		let mut evicted = Vec::new();

		for slot in slots {
			let mut inner = slot.inner.lock();
			if inner.refs != 0 || !matches!(inner.state, SlotState::Loaded(_)) {
				continue;
			}
			on_unload(&slot.digest);
			let previous = std::mem::replace(&mut inner.state, SlotState::Unloaded);
			drop(inner);
			drop(previous);

			self.unloads.fetch_add(1, Ordering::SeqCst);
			debug!(digest = slot.digest.short(), "Evicted idle artifact");
			evicted.push(slot.digest.clone());
		}

		// A count of one means only the map holds the slot; acquire clones it under the map lock.
		let mut slots = self.slots.lock();
		let before = slots.len();
		slots.retain(|_, slot| Arc::strong_count(slot) > 1 || !matches!(slot.inner.lock().state, SlotState::Unloaded));
		if slots.len() != before {
			trace!(pruned = before - slots.len(), "Pruned unloaded cache slots");
		}
		evicted
	}

	/// Number of digests the cache currently tracks.
	pub fn slot_count(&self) -> usize {
		self.slots.lock().len()
	}

	pub fn stats(&self) -> CacheStats {
		let driver = self.driver.stats();
		CacheStats {
			compiles: driver.invocations,
			disk_hits: driver.disk_hits,
			memory_hits: self.memory_hits.load(Ordering::SeqCst),
			loads: self.loads.load(Ordering::SeqCst),
			unloads: self.unloads.load(Ordering::SeqCst),
		}
	}
}

/// Marks a slot failed if the loading thread unwinds before settling it.
struct PendingLoad<'a> {
	slot: &'a Slot,
	settled: bool,
}

impl Drop for PendingLoad<'_> {
	fn drop(&mut self) {
		if self.settled {
			return;
		}
		let mut inner = self.slot.inner.lock();
		inner.state = SlotState::Failed(ArtifactFailure::Panicked {
			digest: self.slot.digest.to_string(),
		});
		drop(inner);
		self.slot.ready.notify_all();
	}
}

/// A counted reference keeping an artifact loaded.
pub struct ArtifactLease {
	slot: Arc<Slot>,
	generation: u64,
}

impl ArtifactLease {
	pub fn digest(&self) -> &ContentDigest {
		&self.slot.digest
	}

	/// A non-owning handle that can produce further leases while the artifact stays loaded.
	pub fn handle(&self) -> ArtifactHandle {
		ArtifactHandle {
			slot: Arc::clone(&self.slot),
			generation: self.generation,
		}
	}

	pub(crate) fn artifact(&self) -> Option<Arc<LoadedArtifact>> {
		match &self.slot.inner.lock().state {
			SlotState::Loaded(artifact) => Some(Arc::clone(artifact)),
			_ => None,
		}
	}
}

impl Clone for ArtifactLease {
	fn clone(&self) -> Self {
		self.slot.inner.lock().refs += 1;
		Self {
			slot: Arc::clone(&self.slot),
			generation: self.generation,
		}
	}
}

impl Drop for ArtifactLease {
	fn drop(&mut self) {
		let mut inner = self.slot.inner.lock();
		inner.refs = inner.refs.saturating_sub(1);
		trace!(digest = self.slot.digest.short(), refs = inner.refs, "Released artifact lease");
	}
}

impl std::fmt::Debug for ArtifactLease {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("ArtifactLease").field(&self.slot.digest).finish()
	}
}

/// Refers to one load of an artifact without keeping it loaded.
#[derive(Clone)]
pub struct ArtifactHandle {
	slot: Arc<Slot>,
	generation: u64,
}

impl ArtifactHandle {
	pub fn digest(&self) -> &ContentDigest {
		&self.slot.digest
	}

	/// Takes a new lease if the load this handle came from is still mapped.
	///
	/// Returns `None` once that load is evicted, even if the digest has since
	/// been loaded again: pointers resolved from the old mapping are invalid.
	pub fn lease(&self) -> Option<ArtifactLease> {
		let mut inner = self.slot.inner.lock();
		if !matches!(inner.state, SlotState::Loaded(_)) || inner.generation != self.generation {
			return None;
		}
		inner.refs += 1;
		drop(inner);
		Some(ArtifactLease {
			slot: Arc::clone(&self.slot),
			generation: self.generation,
		})
	}
}

#[cfg(test)]
mod tests {
	use kiln_build::BuildConfig;
	use kiln_codegen::{CodeSpec, FamilyDescriptor, render};

	use super::*;

	static BROKEN: FamilyDescriptor = FamilyDescriptor {
		name: "broken",
		operations: &[],
		skeleton: "${codeInclude}${localCode}${code} ${digest} ${toolchain}",
	};

	fn cache(dir: &std::path::Path) -> ArtifactCache {
		ArtifactCache::new(Driver::new(BuildConfig::default().with_cache_dir(dir)).unwrap())
	}

	#[test]
	fn test_unknown_digest_is_unloaded() {
		let tmp = tempfile::tempdir().unwrap();
		let cache = cache(tmp.path());
		let digest = ContentDigest::of("x");
		assert_eq!(cache.state(&digest), ArtifactState::Unloaded);
		assert_eq!(cache.ref_count(&digest), 0);
		assert!(cache.evict_idle(|_| panic!("nothing to evict")).is_empty());
	}

	#[test]
	fn test_failure_is_sticky_until_retry() {
		let tmp = tempfile::tempdir().unwrap();
		let cache = cache(tmp.path());
		let source = render(&BROKEN, &CodeSpec::new("b", "not c at all"), "test").unwrap();

		let first = cache.acquire(&source, AcquireMode::Cached).unwrap_err();
		assert_eq!(cache.state(source.digest()), ArtifactState::Failed);
		let second = cache.acquire(&source, AcquireMode::Cached).unwrap_err();
		assert_eq!(first, second);
		assert_eq!(cache.stats().compiles, 1);

		cache.acquire(&source, AcquireMode::Retry).unwrap_err();
		assert_eq!(cache.stats().compiles, 2);
		assert_eq!(cache.ref_count(source.digest()), 0);
	}
}
