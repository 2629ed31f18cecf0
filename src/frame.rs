//! Frames exchanged with the transport.
//!
//! Wire encoding is up to the transport. Every frame type here implements the matching `serde` trait.

use crate::{id::ComponentId, node::Node, patch::Patch};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// An interaction forwarded by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
	pub component_id: ComponentId,
	pub event_name: String,
	#[serde(default)]
	pub payload: Value,
}

/// The result of one commit of one component. An empty patch list means "no visible change".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchFrame {
	pub component_id: ComponentId,
	pub patches: Vec<Patch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveFrame {
	pub component_id: ComponentId,
	pub directives: Vec<Directive>,
}

/// Imperative client actions that bypass diffing. Emitted verbatim.
///
/// Ids here are client-side element ids, not [`ComponentId`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Directive {
	SetText { id: String, text: String },
	SetHtml { id: String, html: String },
	SetAttribute { id: String, name: String, value: String },
	SetStyle { id: String, property: String, value: String },
	/// Evaluates an opaque client-side script.
	Eval { script: String },
	/// Appends `node` to the element with id `parent_id`.
	#[serde(rename_all = "camelCase")]
	InsertNode { parent_id: String, node: Node },
	RemoveNode { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
	Patches(PatchFrame),
	Directives(DirectiveFrame),
}

impl Outbound {
	#[must_use]
	pub fn component_id(&self) -> &ComponentId {
		match self {
			Outbound::Patches(PatchFrame { component_id, .. }) | Outbound::Directives(DirectiveFrame { component_id, .. }) => component_id,
		}
	}
}

/// Where drivers send outbound frames.
///
/// Called concurrently from every driver's worker. Frames of one component arrive in commit order.
pub trait Outbox: Send + Sync {
	fn send(&self, frame: Outbound);
}

impl<F: Fn(Outbound) + Send + Sync> Outbox for F {
	fn send(&self, frame: Outbound) {
		self(frame);
	}
}

/// An [`Outbox`] that forwards into a standard channel.
#[derive(Debug)]
pub struct ChannelOutbox(Mutex<Sender<Outbound>>);

impl ChannelOutbox {
	#[must_use]
	pub fn new() -> (Self, Receiver<Outbound>) {
		let (sender, receiver) = mpsc::channel();
		(Self(Mutex::new(sender)), receiver)
	}
}

impl Outbox for ChannelOutbox {
	fn send(&self, frame: Outbound) {
		if self.0.lock().send(frame).is_err() {
			debug!("Transport receiver is gone; dropping outbound frame.");
		}
	}
}
