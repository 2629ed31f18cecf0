//! The virtual tree that components render to.
//!
//! Trees are owned values. A commit keeps the previous one around as the old side of the next diff,
//! so nothing here borrows from component state.

use crate::id::ComponentId;
use serde::Serialize;
use std::collections::BTreeMap;

/// One renderable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Node {
	Element(Element),
	Text(String),
	/// Stands in for a mounted child component's output.
	///
	/// The differ never descends past this node: the child re-renders itself under its own commit.
	Driver(DriverRef),
}

/// An element node.
///
/// Attributes are kept sorted by name, which makes attribute diffs canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
	pub tag: String,
	/// Stable identity among siblings for keyed reconciliation. Not rendered as an attribute.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
	pub attributes: BTreeMap<String, String>,
	pub children: Vec<Node>,
}

/// Opaque boundary marker for a mounted child component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DriverRef {
	pub id: ComponentId,
}

/// What keyed reconciliation matches siblings by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MatchKey<'a> {
	Key(&'a str),
	Driver(&'a ComponentId),
}

impl Element {
	#[must_use]
	pub fn new(tag: impl Into<String>) -> Self {
		Self {
			tag: tag.into(),
			key: None,
			attributes: BTreeMap::new(),
			children: Vec::new(),
		}
	}

	#[must_use]
	pub fn key(mut self, key: impl Into<String>) -> Self {
		self.key = Some(key.into());
		self
	}

	#[must_use]
	pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(name.into(), value.into());
		self
	}

	#[must_use]
	pub fn child(mut self, child: impl Into<Node>) -> Self {
		self.children.push(child.into());
		self
	}

	#[must_use]
	pub fn children<N: Into<Node>>(mut self, children: impl IntoIterator<Item = N>) -> Self {
		self.children.extend(children.into_iter().map(Into::into));
		self
	}

	#[must_use]
	pub fn text(self, text: impl Into<String>) -> Self {
		self.child(Node::Text(text.into()))
	}
}

impl Node {
	#[must_use]
	pub fn element(tag: impl Into<String>) -> Element {
		Element::new(tag)
	}

	#[must_use]
	pub fn text(text: impl Into<String>) -> Self {
		Self::Text(text.into())
	}

	/// A boundary marker for the child component `id`.
	#[must_use]
	pub fn driver(id: impl Into<ComponentId>) -> Self {
		Self::Driver(DriverRef { id: id.into() })
	}

	#[must_use]
	pub fn children(&self) -> &[Node] {
		match self {
			Node::Element(element) => &element.children,
			Node::Text(_) | Node::Driver(_) => &[],
		}
	}

	/// Resolves `path` relative to this node.
	#[must_use]
	pub fn get(&self, path: &[usize]) -> Option<&Node> {
		path.iter().try_fold(self, |node, &i| node.children().get(i))
	}

	pub(crate) fn get_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
		let mut node = self;
		for &i in path {
			node = match node {
				Node::Element(element) => element.children.get_mut(i)?,
				Node::Text(_) | Node::Driver(_) => return None,
			};
		}
		Some(node)
	}

	/// Finds the boundary marker of the child component `id`, depth first in document order.
	///
	/// Returns the path relative to this node.
	#[must_use]
	pub fn find_driver(&self, id: &ComponentId) -> Option<Vec<usize>> {
		match self {
			Node::Driver(driver) if &driver.id == id => Some(Vec::new()),
			Node::Element(element) => element.children.iter().enumerate().find_map(|(i, child)| {
				child.find_driver(id).map(|mut path| {
					path.insert(0, i);
					path
				})
			}),
			Node::Text(_) | Node::Driver(_) => None,
		}
	}

	/// Number of nodes in this subtree, including itself.
	#[must_use]
	pub fn subtree_len(&self) -> usize {
		1 + self.children().iter().map(Node::subtree_len).sum::<usize>()
	}

	pub(crate) fn match_key(&self) -> Option<MatchKey<'_>> {
		match self {
			Node::Element(Element { key: Some(key), .. }) => Some(MatchKey::Key(key)),
			Node::Driver(driver) => Some(MatchKey::Driver(&driver.id)),
			Node::Element(_) | Node::Text(_) => None,
		}
	}
}

impl From<Element> for Node {
	fn from(element: Element) -> Self {
		Self::Element(element)
	}
}

impl From<&str> for Node {
	fn from(text: &str) -> Self {
		Self::text(text)
	}
}

impl From<String> for Node {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}
