use crate::{error::Fault, id::ComponentId, node::Node};
use core::fmt;
use std::sync::Arc;

pub const DEFAULT_MAX_HANDLERS_PER_EVENT: usize = 16;
pub const DEFAULT_FAULT_HISTORY: usize = 32;
pub const DEFAULT_DEPTH_LIMIT: usize = 512;

/// Renders what a component shows for one commit cycle after its render or one of its handlers failed.
pub type FallbackRender = Arc<dyn Fn(&ComponentId, &Fault) -> Node + Send + Sync>;

/// Settings shared by every driver of a [`Page`](`crate::Page`).
#[derive(Clone)]
pub struct Config {
	/// How many handlers may be registered under one event pattern, and how many run for one event.
	pub max_handlers_per_event: usize,
	/// How many [`Fault`]s each driver remembers.
	pub fault_history: usize,
	/// See [`Differ::new`](`crate::diff::Differ::new`).
	pub depth_limit: usize,
	pub fallback: Option<FallbackRender>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			max_handlers_per_event: DEFAULT_MAX_HANDLERS_PER_EVENT,
			fault_history: DEFAULT_FAULT_HISTORY,
			depth_limit: DEFAULT_DEPTH_LIMIT,
			fallback: None,
		}
	}
}

impl Config {
	#[must_use]
	pub fn with_max_handlers_per_event(mut self, max_handlers_per_event: usize) -> Self {
		self.max_handlers_per_event = max_handlers_per_event;
		self
	}

	#[must_use]
	pub fn with_fault_history(mut self, fault_history: usize) -> Self {
		self.fault_history = fault_history;
		self
	}

	#[must_use]
	pub fn with_depth_limit(mut self, depth_limit: usize) -> Self {
		self.depth_limit = depth_limit;
		self
	}

	#[must_use]
	pub fn with_fallback(mut self, fallback: impl Fn(&ComponentId, &Fault) -> Node + Send + Sync + 'static) -> Self {
		self.fallback = Some(Arc::new(fallback));
		self
	}
}

impl fmt::Debug for Config {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Config")
			.field("max_handlers_per_event", &self.max_handlers_per_event)
			.field("fault_history", &self.fault_history)
			.field("depth_limit", &self.depth_limit)
			.field("fallback", &self.fallback.is_some())
			.finish()
	}
}
