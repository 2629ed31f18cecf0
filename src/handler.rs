//! Event handler registration and matching.
//!
//! Handlers are registered by pattern when a driver is constructed:
//!
//! - `"save"` matches exactly `"save"`,
//! - `"todo:*"` matches every event starting with `"todo:"`,
//! - `"*"` matches everything.
//!
//! An event runs every matching handler in registration order.

use crate::{
	driver::Context,
	error::HandlerResult,
	rc_hash_map::{CountSaturatedError, RcHashMap},
	Error,
};
use core::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{trace, warn};

/// One inbound interaction, as handed to handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub name: String,
	/// Passed through uninterpreted.
	#[serde(default)]
	pub payload: Value,
}

impl Event {
	#[must_use]
	pub fn new(name: impl Into<String>, payload: Value) -> Self {
		Self { name: name.into(), payload }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPattern {
	Exact(String),
	/// Matches names that start with this prefix. Written as `prefix*`.
	Prefix(String),
	Any,
}

impl EventPattern {
	#[must_use]
	pub fn parse(pattern: &str) -> Self {
		match pattern.strip_suffix('*') {
			Some("") => Self::Any,
			Some(prefix) => Self::Prefix(prefix.to_owned()),
			None => Self::Exact(pattern.to_owned()),
		}
	}

	#[must_use]
	pub fn matches(&self, name: &str) -> bool {
		match self {
			EventPattern::Exact(exact) => exact == name,
			EventPattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
			EventPattern::Any => true,
		}
	}
}

/// A registered event handler for components of type `C`.
pub type Handler<C> = Box<dyn Fn(&mut C, &Event, &mut Context<'_>) -> HandlerResult + Send>;

/// Identifies one registration in a [`HandlerTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct Registration<C> {
	id: HandlerId,
	pattern: String,
	handler: Handler<C>,
}

/// The event name → handler table of one component.
pub struct HandlerTable<C> {
	registrations: Vec<Registration<C>>,
	/// Registration count and parsed form per pattern.
	patterns: RcHashMap<String, u16, EventPattern>,
	limit: usize,
	next_id: u64,
}

impl<C> fmt::Debug for HandlerTable<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HandlerTable")
			.field("registrations", &self.registrations.iter().map(|r| (r.id, &r.pattern)).collect::<Vec<_>>())
			.field("limit", &self.limit)
			.finish()
	}
}

impl<C> HandlerTable<C> {
	/// Creates an empty table that accepts at most `limit` handlers per pattern and runs at most `limit` handlers per event.
	#[must_use]
	pub fn new(limit: usize) -> Self {
		Self {
			registrations: Vec::new(),
			patterns: RcHashMap::default(),
			limit,
			next_id: 0,
		}
	}

	/// Registers `handler` for events matching `pattern`.
	///
	/// # Errors
	///
	/// [`Error::HandlerLimit`] if `pattern` already has the maximum number of handlers.
	pub fn on(&mut self, pattern: &str, handler: impl Fn(&mut C, &Event, &mut Context<'_>) -> HandlerResult + Send + 'static) -> Result<HandlerId, Error> {
		let limit_error = || Error::HandlerLimit {
			pattern: pattern.to_owned(),
			limit: self.limit,
		};
		if usize::from(self.patterns.count(pattern)) >= self.limit {
			warn!(pattern, limit = self.limit, "Refusing handler registration over the limit.");
			return Err(limit_error());
		}
		self.patterns
			.increment_or_insert_with(pattern.to_owned(), || EventPattern::parse(pattern))
			.map_err(|CountSaturatedError| limit_error())?;

		let id = HandlerId(self.next_id);
		self.next_id += 1;
		self.registrations.push(Registration {
			id,
			pattern: pattern.to_owned(),
			handler: Box::new(handler),
		});
		trace!(pattern, ?id, "Registered handler.");
		Ok(id)
	}

	/// Removes one registration. Returns whether it existed.
	pub fn off(&mut self, id: HandlerId) -> bool {
		let index = match self.registrations.iter().position(|r| r.id == id) {
			Some(index) => index,
			None => return false,
		};
		let registration = self.registrations.remove(index);
		if self.patterns.weak_decrement(registration.pattern.as_str()).is_err() {
			warn!(pattern = %registration.pattern, "Handler pattern count underflow.");
		}
		let freed = self.patterns.drain_weak().count();
		trace!(?id, "Removed handler; freed {} pattern(s).", freed);
		true
	}

	/// The handlers for `name`, in registration order, at most [`limit`](`HandlerTable::new`) many.
	pub fn matching<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Handler<C>> + 'a {
		let mut matched = 0_usize;
		let limit = self.limit;
		self.registrations
			.iter()
			.filter(move |r| self.patterns.get(r.pattern.as_str()).map_or(false, |pattern| pattern.matches(name)))
			.filter(move |_| {
				matched += 1;
				if matched == limit + 1 {
					warn!(event = name, limit, "Skipping handlers over the per-event limit.");
				}
				matched <= limit
			})
			.map(|r| &r.handler)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.registrations.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.registrations.is_empty()
	}

	/// Number of distinct registered patterns.
	#[must_use]
	pub fn pattern_count(&self) -> usize {
		self.patterns.len()
	}
}
