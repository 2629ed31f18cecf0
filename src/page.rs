use crate::{
	component::Component,
	config::Config,
	driver::{self, Driver, DriverHandle, Runtime},
	frame::{InboundFrame, Outbox},
	id::ComponentId,
	registry::Registry,
	router::Router,
	Error,
};
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// One client session: the identity registry, the outbound transport and the root components.
///
/// Dropping a page unmounts every component that is still mounted.
pub struct Page {
	runtime: Arc<Runtime>,
	roots: Mutex<Vec<DriverHandle>>,
}

impl fmt::Debug for Page {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Page").field("runtime", &self.runtime).field("roots", &*self.roots.lock()).finish()
	}
}

impl Page {
	#[must_use]
	pub fn new(config: Config, outbox: impl Outbox + 'static) -> Self {
		debug!(?config, "Creating page.");
		Self {
			runtime: Arc::new(Runtime {
				registry: Registry::new(),
				outbox: Box::new(outbox),
				config,
			}),
			roots: Mutex::new(Vec::new()),
		}
	}

	#[must_use]
	pub fn config(&self) -> &Config {
		&self.runtime.config
	}

	/// Wraps `component` using this page's configuration.
	///
	/// # Errors
	///
	/// See [`Driver::new`].
	pub fn driver<C: Component>(&self, id: impl Into<ComponentId>, component: C) -> Result<Driver<C>, Error> {
		Driver::new(id, component, &self.runtime.config)
	}

	/// Mounts `driver` as a root component.
	///
	/// Its first render is inserted as the only child of its mount container.
	///
	/// # Errors
	///
	/// - [`Error::DuplicateId`] if the id is taken. Nothing is mounted in that case.
	/// - [`Error::InvalidPhase`] if the driver was already mounted once.
	/// - [`Error::Spawn`].
	pub fn mount<C: Component>(&self, driver: Driver<C>) -> Result<DriverHandle, Error> {
		let handle = driver::mount(driver, &self.runtime, None)?;
		self.roots.lock().push(handle.clone());
		Ok(handle)
	}

	/// Unmounts the component `id` and its subtree, root or not.
	///
	/// # Errors
	///
	/// [`Error::NotFound`] if `id` isn't registered, which includes components that were unmounted before.
	#[instrument(skip(self))]
	pub fn unmount(&self, id: &str) -> Result<(), Error> {
		let handle = self.runtime.registry.get(id).ok_or_else(|| Error::NotFound(id.into()))?;
		driver::unmount(&handle, &self.runtime)?;
		self.roots.lock().retain(|root| root != &handle);
		Ok(())
	}

	/// Routes one inbound frame.
	///
	/// Frames addressed to components that are gone are dropped quietly.
	///
	/// # Errors
	///
	/// Only non-stale failures of [`Router::route`] are passed on.
	#[instrument(skip(self, frame), fields(id = %frame.component_id, event = %frame.event_name))]
	pub fn handle_inbound(&self, frame: InboundFrame) -> Result<(), Error> {
		let InboundFrame {
			component_id,
			event_name,
			payload,
		} = frame;
		match self.router().route(&component_id, event_name, payload) {
			Err(error) if error.is_stale() => {
				debug!(%error, "Dropping stale inbound frame.");
				Ok(())
			}
			result => result,
		}
	}

	#[must_use]
	pub fn router(&self) -> Router {
		Router::new(Arc::clone(&self.runtime))
	}

	/// Resolves `id` to its driver, if it is mounted.
	#[must_use]
	pub fn get(&self, id: &str) -> Option<DriverHandle> {
		self.runtime.registry.get(id)
	}

	/// Ids of all registered components, sorted.
	#[must_use]
	pub fn ids(&self) -> Vec<ComponentId> {
		self.runtime.registry.ids()
	}

	/// Ids of the mounted root components, in mount order.
	#[must_use]
	pub fn roots(&self) -> Vec<ComponentId> {
		self.roots.lock().iter().map(|root| root.id().clone()).collect()
	}
}

impl Drop for Page {
	fn drop(&mut self) {
		let roots = core::mem::take(&mut *self.roots.lock());
		trace!(roots = roots.len(), "Dropping page.");
		for root in roots {
			if let Err(error) = driver::unmount(&root, &self.runtime) {
				trace!(%error, "Root was already retired.");
			}
		}
	}
}
