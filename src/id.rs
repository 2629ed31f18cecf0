use core::{borrow::Borrow, fmt, ops::Deref};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The externally visible identifier of a mounted component.
///
/// Ids are opaque to the client, which only echoes them back in inbound event frames.
/// Cloning is cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(Arc<str>);

impl ComponentId {
	#[must_use]
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.0, f)
	}
}

impl fmt::Display for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl Deref for ComponentId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl Borrow<str> for ComponentId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

impl From<&str> for ComponentId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for ComponentId {
	fn from(id: String) -> Self {
		Self::new(id)
	}
}

impl From<&ComponentId> for ComponentId {
	fn from(id: &ComponentId) -> Self {
		id.clone()
	}
}
