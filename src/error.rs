use crate::{driver::Phase, id::ComponentId};
use core::{any::Any, fmt};
use serde::Serialize;
use std::collections::VecDeque;

/// What application code returns from handlers, hooks and render.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type of event handlers and lifecycle hooks.
pub type HandlerResult = Result<(), BoxError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The id (or the handle) is already bound in the identity registry.
	#[error("component id {0} is already registered")]
	DuplicateId(ComponentId),

	/// No live component has this id. Usually a race with unmounting.
	#[error("no component with id {0}")]
	NotFound(ComponentId),

	/// The addressed driver has been unmounted and rejects further mailbox delivery.
	#[error("component {0} has been unmounted")]
	DriverRetired(ComponentId),

	/// A handler, hook or render failed. Contained at the driver boundary.
	#[error("{0}")]
	HandlerFault(Fault),

	/// A patch addressed a position the tree doesn't have. Always a bug.
	#[error("diff invariant violated at {path:?}: {reason}")]
	DiffInvariantViolation { path: Vec<usize>, reason: &'static str },

	#[error("more than {limit} handlers registered for event pattern {pattern:?}")]
	HandlerLimit { pattern: String, limit: usize },

	#[error("{operation} is not valid for component {id} while it is {phase:?}")]
	InvalidPhase { id: ComponentId, phase: Phase, operation: &'static str },

	#[error("failed to spawn the worker for component {id}")]
	Spawn {
		id: ComponentId,
		#[source]
		source: std::io::Error,
	},
}

impl Error {
	/// Whether this is one of the expected races with unmounting ([`Error::NotFound`] or [`Error::DriverRetired`]).
	#[must_use]
	pub fn is_stale(&self) -> bool {
		matches!(self, Error::NotFound(_) | Error::DriverRetired(_))
	}
}

/// Where a [`Fault`] happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FaultSite {
	/// While handling the named event.
	Handler(String),
	Render,
	/// In the named lifecycle hook.
	Hook(&'static str),
	/// The driver's own consistency check of a patch batch.
	Diff,
}

/// A recorded failure of application code inside a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
	pub site: FaultSite,
	pub message: String,
	/// Whether the failure was a panic rather than a returned error.
	pub panicked: bool,
}

impl Fault {
	pub(crate) fn from_error(site: FaultSite, error: &BoxError) -> Self {
		Self {
			site,
			message: error.to_string(),
			panicked: false,
		}
	}

	pub(crate) fn from_panic(site: FaultSite, payload: &(dyn Any + Send)) -> Self {
		let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
			(*message).to_owned()
		} else if let Some(message) = payload.downcast_ref::<String>() {
			message.clone()
		} else {
			"opaque panic payload".to_owned()
		};
		Self { site, message, panicked: true }
	}
}

impl fmt::Display for Fault {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.site {
			FaultSite::Handler(event) => write!(f, "handler for {:?}", event)?,
			FaultSite::Render => f.write_str("render")?,
			FaultSite::Hook(hook) => write!(f, "hook {}", hook)?,
			FaultSite::Diff => f.write_str("diff")?,
		}
		f.write_str(if self.panicked { " panicked: " } else { " failed: " })?;
		f.write_str(&self.message)
	}
}

/// The most recent faults of one driver, oldest first.
#[derive(Debug)]
pub(crate) struct FaultLog {
	entries: VecDeque<Fault>,
	capacity: usize,
	total: u64,
}

impl FaultLog {
	pub(crate) fn new(capacity: usize) -> Self {
		Self {
			entries: VecDeque::with_capacity(capacity.min(64)),
			capacity,
			total: 0,
		}
	}

	pub(crate) fn push(&mut self, fault: Fault) {
		self.total += 1;
		if self.capacity == 0 {
			return;
		}
		if self.entries.len() == self.capacity {
			self.entries.pop_front();
		}
		self.entries.push_back(fault);
	}

	pub(crate) fn snapshot(&self) -> Vec<Fault> {
		self.entries.iter().cloned().collect()
	}

	/// Faults recorded over the driver's lifetime, including evicted ones.
	pub(crate) fn total(&self) -> u64 {
		self.total
	}
}
