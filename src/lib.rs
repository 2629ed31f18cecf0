#![doc(html_root_url = "https://docs.rs/lignin-live/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Server-side live components.
//!
//! A [`Page`] hosts mounted components. Each one is wrapped in a [`Driver`] that owns its state,
//! processes its events one at a time on its own worker and turns every commit into a minimal [`Patch`] stream.
//!
//! See the README for a complete example.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod component;
pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod frame;
pub mod handler;
pub mod id;
pub mod node;
pub mod page;
pub mod patch;
pub mod pubsub;
mod rc_hash_map;
pub mod registry;
pub mod router;

pub use component::Component;
pub use config::Config;
pub use driver::{Context, Driver, DriverHandle, Phase};
pub use error::{BoxError, Error, Fault, FaultSite, HandlerResult};
pub use frame::{ChannelOutbox, Directive, InboundFrame, Outbound, Outbox, PatchFrame};
pub use handler::{Event, HandlerTable};
pub use id::ComponentId;
pub use node::{Element, Node};
pub use page::Page;
pub use patch::Patch;
pub use pubsub::PubSub;
pub use router::Router;
