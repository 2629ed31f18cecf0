//! Turns a pair of rendered trees into a [`Patch`] stream.
//!
//! # Algorithm
//!
//! - Driver boundaries are opaque. Two boundaries for the same child are equal, regardless of what that child currently shows.
//! - Elements with different tags or keys, and nodes of different kinds, are replaced wholesale.
//! - Attributes are compared in sorted name order and produce at most one [`Patch::UpdateAttributes`] per element.
//! - Children are reconciled by key first (element keys and boundary ids), then the remaining keyless children positionally.
//!   Per sibling list this emits removals (descending), at most one [`Patch::Reorder`], insertions (ascending),
//!   and then recurses into matched pairs at their final positions.
//! - Text is compared byte-for-byte.
//!
//! If a key appears more than once in one sibling list, only its first occurrence is keyed.
//! Later duplicates are reconciled positionally along with the keyless children.
//!
//! No step depends on hash map iteration order, so equal inputs always produce identical output.

use crate::{
	node::{Element, MatchKey, Node},
	patch::{Patch, Path},
};
use hashbrown::{hash_map::Entry, HashMap};
use std::collections::BTreeMap;
use tracing::{error, instrument, trace, trace_span};

/// Diffs with the default depth limit. See [`Differ::diff`].
#[must_use]
pub fn diff(old: Option<&Node>, new: Option<&Node>) -> Vec<Patch> {
	Differ::default().diff(old, new)
}

/// Stateless tree differ with a recursion bound.
#[derive(Debug, Clone, Copy)]
pub struct Differ {
	depth_limit: usize,
}

impl Default for Differ {
	fn default() -> Self {
		Self::new(crate::config::DEFAULT_DEPTH_LIMIT)
	}
}

impl Differ {
	/// Subtrees nested deeper than `depth_limit` are replaced as a whole (if they changed at all) instead of being descended into.
	#[must_use]
	pub fn new(depth_limit: usize) -> Self {
		Self { depth_limit }
	}

	/// Computes the patches that transform the mount container content `old` into `new`.
	///
	/// `None` stands for an empty container: `(None, Some(_))` is a first render, `(Some(_), None)` a removal.
	#[must_use]
	#[instrument(skip_all, fields(depth_limit = self.depth_limit))]
	pub fn diff(&self, old: Option<&Node>, new: Option<&Node>) -> Vec<Patch> {
		let mut patches = Vec::new();
		match (old, new) {
			(None, None) => (),
			(None, Some(new)) => {
				trace!("Creating root with {} node(s).", new.subtree_len());
				patches.push(Patch::InsertChild {
					path: Vec::new(),
					index: 0,
					node: new.clone(),
				});
			}
			(Some(_), None) => {
				trace!("Removing root.");
				patches.push(Patch::RemoveChild { path: Vec::new(), index: 0 });
			}
			(Some(old), Some(new)) => self.diff_node(&mut vec![0], old, new, self.depth_limit, &mut patches),
		}
		trace!("Emitting {} patch(es).", patches.len());
		patches
	}

	fn diff_node(&self, path: &mut Path, old: &Node, new: &Node, depth_limit: usize, patches: &mut Vec<Patch>) {
		if depth_limit == 0 {
			error!("Depth limit reached");
			if old != new {
				replace(path, new, patches);
			}
			return;
		}

		match (old, new) {
			(Node::Driver(d_1), Node::Driver(d_2)) => {
				let span = trace_span!("Diffing driver boundary", id_1 = %d_1.id, id_2 = %d_2.id);
				let _enter = span.enter();
				if d_1.id != d_2.id {
					replace(path, new, patches);
				}
			}

			(Node::Text(t_1), Node::Text(t_2)) => {
				let span = trace_span!("Diffing text");
				let _enter = span.enter();
				if t_1 != t_2 {
					if cfg!(feature = "dangerous-logging") {
						trace!(old = %t_1, new = %t_2, "Updating text.");
					}
					log_path(path, "UpdateText");
					patches.push(Patch::UpdateText { path: path.clone(), text: t_2.clone() });
				}
			}

			(Node::Element(e_1), Node::Element(e_2)) if e_1.tag == e_2.tag && e_1.key == e_2.key => {
				let span = trace_span!("Diffing element", tag = %e_1.tag);
				let _enter = span.enter();
				diff_attributes(path, e_1, e_2, patches);
				self.diff_children(path, &e_1.children, &e_2.children, depth_limit - 1, patches);
			}

			// Mismatching nodes: Replace.
			(_, _) => {
				let span = trace_span!("Replace mismatching");
				let _enter = span.enter();
				replace(path, new, patches);
			}
		}
	}

	fn diff_children(&self, path: &mut Path, old: &[Node], new: &[Node], depth_limit: usize, patches: &mut Vec<Patch>) {
		if old.is_empty() && new.is_empty() {
			return;
		}
		let span = trace_span!("Diffing children", old = old.len(), new = new.len());
		let _enter = span.enter();

		let old_keyed = first_occurrences(old);
		let new_keyed = first_occurrences(new);

		// For each new child, the old child it continues (if any).
		let mut sources: Vec<Option<usize>> = vec![None; new.len()];
		let mut old_matched = vec![false; old.len()];
		for (j, key) in new_keyed.keys.iter().enumerate() {
			if let Some(&i) = key.as_ref().and_then(|key| old_keyed.by_key.get(key)) {
				sources[j] = Some(i);
				old_matched[i] = true;
			}
		}
		let old_keyless = (0..old.len()).filter(|&i| old_keyed.keys[i].is_none());
		let new_keyless = (0..new.len()).filter(|&j| new_keyed.keys[j].is_none());
		for (i, j) in old_keyless.zip(new_keyless) {
			sources[j] = Some(i);
			old_matched[i] = true;
		}

		for i in (0..old.len()).rev().filter(|&i| !old_matched[i]) {
			log_path(path, "RemoveChild");
			patches.push(Patch::RemoveChild { path: path.clone(), index: i });
		}

		// Survivors keep their old relative order after the removals. Sort them into new order.
		let mut survivor_slot = vec![0; old.len()];
		for (slot, i) in (0..old.len()).filter(|&i| old_matched[i]).enumerate() {
			survivor_slot[i] = slot;
		}
		let order: Vec<usize> = sources.iter().filter_map(|source| source.map(|i| survivor_slot[i])).collect();
		if order.iter().enumerate().any(|(slot, &from)| slot != from) {
			log_path(path, "Reorder");
			patches.push(Patch::Reorder { path: path.clone(), order });
		}

		for (j, node) in new.iter().enumerate().filter(|&(j, _)| sources[j].is_none()) {
			log_path(path, "InsertChild");
			patches.push(Patch::InsertChild {
				path: path.clone(),
				index: j,
				node: node.clone(),
			});
		}

		for (j, source) in sources.iter().enumerate() {
			if let Some(i) = *source {
				path.push(j);
				self.diff_node(path, &old[i], &new[j], depth_limit, patches);
				path.pop();
			}
		}
	}
}

struct Keyed<'a> {
	/// Per child, its key if it is the first occurrence of that key.
	keys: Vec<Option<MatchKey<'a>>>,
	by_key: HashMap<MatchKey<'a>, usize>,
}

fn first_occurrences(children: &[Node]) -> Keyed<'_> {
	let mut by_key = HashMap::new();
	let keys = children
		.iter()
		.enumerate()
		.map(|(i, child)| {
			let key = child.match_key()?;
			match by_key.entry(key) {
				Entry::Vacant(vacant) => {
					vacant.insert(i);
					Some(key)
				}
				Entry::Occupied(_) => {
					trace!("Duplicate sibling key at index {}; treating it as keyless.", i);
					None
				}
			}
		})
		.collect();
	Keyed { keys, by_key }
}

fn diff_attributes(path: &Path, e_1: &Element, e_2: &Element, patches: &mut Vec<Patch>) {
	let changed: BTreeMap<String, String> = e_2
		.attributes
		.iter()
		.filter(|&(name, value)| e_1.attributes.get(name) != Some(value))
		.map(|(name, value)| (name.clone(), value.clone()))
		.collect();
	let removed: Vec<String> = e_1.attributes.keys().filter(|name| !e_2.attributes.contains_key(*name)).cloned().collect();
	if changed.is_empty() && removed.is_empty() {
		return;
	}
	if cfg!(feature = "dangerous-logging") {
		trace!(?changed, ?removed, "Updating attributes.");
	} else {
		trace!(changed = changed.len(), removed = removed.len(), "Updating attributes.");
	}
	log_path(path, "UpdateAttributes");
	patches.push(Patch::UpdateAttributes {
		path: path.clone(),
		changed,
		removed,
	});
}

fn replace(path: &Path, new: &Node, patches: &mut Vec<Patch>) {
	trace!("Replacing subtree with {} node(s).", new.subtree_len());
	log_path(path, "ReplaceSubtree");
	patches.push(Patch::ReplaceSubtree {
		path: path.clone(),
		node: new.clone(),
	});
}

fn log_path(path: &Path, op: &'static str) {
	if cfg!(feature = "log-paths") {
		trace!(?path, op);
	}
}
