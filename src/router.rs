use crate::{driver::Runtime, handler::Event, id::ComponentId, Error};
use core::fmt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Delivers inbound events to the mailbox of the addressed component.
///
/// Routing only enqueues. A slow handler never holds up delivery to other components.
#[derive(Clone)]
pub struct Router {
	runtime: Arc<Runtime>,
}

impl fmt::Debug for Router {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Router").field("components", &self.runtime.registry.len()).finish()
	}
}

impl Router {
	pub(crate) fn new(runtime: Arc<Runtime>) -> Self {
		Self { runtime }
	}

	/// Resolves `target` and queues the event in its mailbox.
	///
	/// Unknown event names are not an error here. The target's driver ignores them.
	///
	/// # Errors
	///
	/// - [`Error::NotFound`] if no component is registered as `target`.
	/// - [`Error::DriverRetired`] if the component was unmounted after resolution.
	///   The stale registry entry is removed.
	///
	/// Both are expected races with unmounting. See [`Error::is_stale`].
	#[instrument(skip(self, event_name, payload), fields(event = tracing::field::Empty))]
	pub fn route(&self, target: &str, event_name: impl Into<String>, payload: Value) -> Result<(), Error> {
		let event = Event::new(event_name, payload);
		tracing::Span::current().record("event", event.name.as_str());

		let handle = self.runtime.registry.get(target).ok_or_else(|| {
			debug!("No such component.");
			Error::NotFound(ComponentId::from(target))
		})?;
		handle.deliver(event).map_err(|error| {
			if let Error::DriverRetired(_) = error {
				debug!("Component retired after resolution; dropping its registration.");
				self.runtime.registry.delete_handle(&handle);
			}
			error
		})
	}

	/// Whether `id` currently resolves to a live component.
	#[must_use]
	pub fn contains(&self, id: &str) -> bool {
		self.runtime.registry.contains(id)
	}
}
