//! Topic-based fan-out of events to subscribed components.

use crate::{id::ComponentId, router::Router, Error};
use hashbrown::HashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument, trace};

/// Topic → subscriber lists on top of a [`Router`].
///
/// Subscribers are plain ids. Ones that have been unmounted are pruned lazily on [`publish`](`PubSub::publish`).
#[derive(Debug)]
pub struct PubSub {
	router: Router,
	topics: RwLock<HashMap<String, Vec<ComponentId>>>,
}

impl PubSub {
	#[must_use]
	pub fn new(router: Router) -> Self {
		Self {
			router,
			topics: RwLock::new(HashMap::new()),
		}
	}

	/// Subscribes `id` to `topic`. Returns `false` if it was subscribed already.
	pub fn subscribe(&self, topic: &str, id: impl Into<ComponentId>) -> bool {
		let id = id.into();
		let mut topics = self.topics.write();
		let subscribers = topics.entry_ref(topic).or_default();
		if subscribers.contains(&id) {
			return false;
		}
		trace!(topic, %id, "Subscribed.");
		subscribers.push(id);
		true
	}

	/// Returns whether `id` was subscribed to `topic`.
	pub fn unsubscribe(&self, topic: &str, id: &str) -> bool {
		let mut topics = self.topics.write();
		let subscribers = match topics.get_mut(topic) {
			Some(subscribers) => subscribers,
			None => return false,
		};
		let before = subscribers.len();
		subscribers.retain(|subscriber| subscriber.as_str() != id);
		let removed = subscribers.len() != before;
		if subscribers.is_empty() {
			topics.remove(topic);
		}
		removed
	}

	/// Sends `event_name` with `payload` to every subscriber of `topic`, in subscription order.
	///
	/// Returns how many subscribers the event was queued for.
	///
	/// # Errors
	///
	/// The first non-stale routing error. Remaining subscribers are still served.
	#[instrument(skip(self, event_name, payload))]
	pub fn publish(&self, topic: &str, event_name: &str, payload: &Value) -> Result<usize, Error> {
		let subscribers = match self.topics.read().get(topic) {
			Some(subscribers) => subscribers.clone(),
			None => return Ok(0),
		};

		let mut delivered = 0;
		let mut stale = Vec::new();
		let mut first_error = None;
		for id in subscribers {
			match self.router.route(&id, event_name, payload.clone()) {
				Ok(()) => delivered += 1,
				Err(error) if error.is_stale() => stale.push(id),
				Err(error) => {
					first_error.get_or_insert(error);
				}
			}
		}

		if !stale.is_empty() {
			debug!(stale = stale.len(), "Pruning unmounted subscribers.");
			for id in &stale {
				self.unsubscribe(topic, id);
			}
		}
		match first_error {
			Some(error) => Err(error),
			None => Ok(delivered),
		}
	}

	/// Current subscribers of `topic`, in subscription order.
	#[must_use]
	pub fn subscribers(&self, topic: &str) -> Vec<ComponentId> {
		self.topics.read().get(topic).cloned().unwrap_or_default()
	}
}
