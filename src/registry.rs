//! The identity registry: a bijection between [`ComponentId`]s and driver handles.

use crate::{id::ComponentId, Error};
use core::hash::Hash;
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, instrument, trace};

/// Concurrency-safe bidirectional map from component ids to handles of type `H`.
///
/// Both directions are guarded by one lock, so every operation is linearizable and no reader ever observes half an update.
/// The mapping stays injective both ways: an id maps to at most one handle and a handle to at most one id.
#[derive(Debug)]
pub struct Registry<H> {
	maps: Mutex<Maps<H>>,
}

#[derive(Debug)]
struct Maps<H> {
	by_id: HashMap<ComponentId, H>,
	by_handle: HashMap<H, ComponentId>,
}

impl<H> Default for Registry<H> {
	fn default() -> Self {
		Self {
			maps: Mutex::new(Maps {
				by_id: HashMap::new(),
				by_handle: HashMap::new(),
			}),
		}
	}
}

impl<H: Clone + Eq + Hash> Registry<H> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds `id` to `handle`.
	///
	/// # Errors
	///
	/// [`Error::DuplicateId`] if `id` is already bound, or `handle` is bound to another id.
	/// The existing binding is left untouched.
	#[instrument(skip(self, handle))]
	pub fn put(&self, id: ComponentId, handle: H) -> Result<(), Error> {
		let mut maps = self.maps.lock();
		if maps.by_id.contains_key(&id) {
			debug!("Refusing to rebind registered id.");
			return Err(Error::DuplicateId(id));
		}
		if let Some(existing) = maps.by_handle.get(&handle) {
			debug!(%existing, "Refusing to bind a handle that is registered under another id.");
			return Err(Error::DuplicateId(id));
		}
		maps.by_handle.insert(handle.clone(), id.clone());
		maps.by_id.insert(id, handle);
		trace!(len = maps.by_id.len(), "Registered.");
		Ok(())
	}

	#[must_use]
	pub fn get(&self, id: &str) -> Option<H> {
		self.maps.lock().by_id.get(id).cloned()
	}

	#[must_use]
	pub fn get_by_handle(&self, handle: &H) -> Option<ComponentId> {
		self.maps.lock().by_handle.get(handle).cloned()
	}

	/// Unbinds `id` in both directions. Absent ids are ignored.
	///
	/// Returns the handle that was bound, if any.
	#[instrument(skip(self))]
	pub fn delete(&self, id: &str) -> Option<H> {
		let mut maps = self.maps.lock();
		let handle = maps.by_id.remove(id)?;
		maps.by_handle.remove(&handle);
		trace!(len = maps.by_id.len(), "Deregistered.");
		Some(handle)
	}

	/// Unbinds `handle` in both directions, but only if it is still registered.
	///
	/// Used to clean up after a stale handle without disturbing a newer registration of the same id.
	pub fn delete_handle(&self, handle: &H) -> Option<ComponentId> {
		let mut maps = self.maps.lock();
		let id = maps.by_handle.remove(handle)?;
		maps.by_id.remove(&id);
		trace!(%id, len = maps.by_id.len(), "Deregistered stale handle.");
		Some(id)
	}

	#[must_use]
	pub fn contains(&self, id: &str) -> bool {
		self.maps.lock().by_id.contains_key(id)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.maps.lock().by_id.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// All currently registered ids, sorted.
	#[must_use]
	pub fn ids(&self) -> Vec<ComponentId> {
		let mut ids: Vec<_> = self.maps.lock().by_id.keys().cloned().collect();
		ids.sort();
		ids
	}
}
