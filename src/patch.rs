//! The incremental update vocabulary and a reference interpreter for it.
//!
//! Paths are relative to a component's *mount container*:
//! `[]` is the container itself, `[0]` the component's root node, `[0, i]` the root's `i`-th child and so on.
//! A first render is therefore `InsertChild { path: [], index: 0, .. }`.
//!
//! Patches must be applied in emission order. A path is only valid against the tree as left by all earlier patches of the same batch.

use crate::{node::Node, Error};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, instrument};

pub type Path = Vec<usize>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Patch {
	ReplaceSubtree {
		path: Path,
		node: Node,
	},
	/// Attributes in `changed` are added or overwritten; `removed` attributes are deleted. Both are sorted by name.
	UpdateAttributes {
		path: Path,
		changed: BTreeMap<String, String>,
		removed: Vec<String>,
	},
	UpdateText {
		path: Path,
		text: String,
	},
	InsertChild {
		path: Path,
		index: usize,
		node: Node,
	},
	RemoveChild {
		path: Path,
		index: usize,
	},
	/// Permutes the children of the node at `path` so that `new[i] = old[order[i]]`.
	Reorder {
		path: Path,
		order: Vec<usize>,
	},
}

impl Patch {
	#[must_use]
	pub fn path(&self) -> &[usize] {
		match self {
			Patch::ReplaceSubtree { path, .. }
			| Patch::UpdateAttributes { path, .. }
			| Patch::UpdateText { path, .. }
			| Patch::InsertChild { path, .. }
			| Patch::RemoveChild { path, .. }
			| Patch::Reorder { path, .. } => path,
		}
	}
}

/// Applies `patches` in order to the contents of a mount container.
///
/// `root` is `None` for an empty container.
///
/// # Errors
///
/// [`Error::DiffInvariantViolation`] if a patch addresses a position that doesn't exist or has the wrong node kind.
/// Patches before the offending one remain applied.
#[instrument(skip_all, fields(patches = patches.len()))]
pub fn apply(root: &mut Option<Node>, patches: &[Patch]) -> Result<(), Error> {
	for patch in patches {
		apply_one(root, patch).map_err(|error| {
			error!("Rejected patch: {}", error);
			error
		})?;
	}
	Ok(())
}

fn violation(path: &[usize], reason: &'static str) -> Error {
	Error::DiffInvariantViolation { path: path.to_vec(), reason }
}

fn resolve<'a>(root: &'a mut Option<Node>, path: &[usize]) -> Result<&'a mut Node, Error> {
	match (path.split_first(), root) {
		(Some((&0, rest)), Some(root)) => root.get_mut(rest).ok_or_else(|| violation(path, "no node at path")),
		(Some(_), Some(_)) => Err(violation(path, "a mount container holds at most one root")),
		(Some(_), None) => Err(violation(path, "mount container is empty")),
		(None, _) => Err(violation(path, "the mount container itself can't be addressed here")),
	}
}

fn children_at<'a>(root: &'a mut Option<Node>, path: &[usize]) -> Result<&'a mut Vec<Node>, Error> {
	match resolve(root, path)? {
		Node::Element(element) => Ok(&mut element.children),
		Node::Text(_) | Node::Driver(_) => Err(violation(path, "expected an element")),
	}
}

fn apply_one(root: &mut Option<Node>, patch: &Patch) -> Result<(), Error> {
	match patch {
		Patch::ReplaceSubtree { path, node } => {
			*resolve(root, path)? = node.clone();
		}

		Patch::UpdateAttributes { path, changed, removed } => match resolve(root, path)? {
			Node::Element(element) => {
				for name in removed {
					element.attributes.remove(name);
				}
				for (name, value) in changed {
					element.attributes.insert(name.clone(), value.clone());
				}
			}
			Node::Text(_) | Node::Driver(_) => return Err(violation(path, "attributes on a non-element")),
		},

		Patch::UpdateText { path, text } => match resolve(root, path)? {
			Node::Text(old) => *old = text.clone(),
			Node::Element(_) | Node::Driver(_) => return Err(violation(path, "expected a text node")),
		},

		Patch::InsertChild { path, index, node } if path.is_empty() => {
			if *index != 0 || root.is_some() {
				return Err(violation(path, "mount container is occupied"));
			}
			*root = Some(node.clone());
		}
		Patch::InsertChild { path, index, node } => {
			let children = children_at(root, path)?;
			if *index > children.len() {
				return Err(violation(path, "insertion index out of bounds"));
			}
			children.insert(*index, node.clone());
		}

		Patch::RemoveChild { path, index } if path.is_empty() => {
			if *index != 0 || root.take().is_none() {
				return Err(violation(path, "nothing to remove from the mount container"));
			}
		}
		Patch::RemoveChild { path, index } => {
			let children = children_at(root, path)?;
			if *index >= children.len() {
				return Err(violation(path, "removal index out of bounds"));
			}
			children.remove(*index);
		}

		Patch::Reorder { path, order } => {
			let children = children_at(root, path)?;
			let mut seen = vec![false; children.len()];
			if order.len() != children.len() || !order.iter().all(|&i| i < seen.len() && !std::mem::replace(&mut seen[i], true)) {
				return Err(violation(path, "reorder is not a permutation of the children"));
			}
			let mut old: Vec<Option<Node>> = children.drain(..).map(Some).collect();
			children.extend(order.iter().filter_map(|&i| old[i].take()));
		}
	}
	Ok(())
}
