//! Component drivers: lifecycle, mailbox and commit protocol.
//!
//! Every mounted driver runs on its own worker thread that owns the component state, its handler table and its last render.
//! Events reach the worker through an unbounded FIFO mailbox, so handlers of one component never run concurrently
//! and render, diff and patch emission need no locking.
//!
//! The few things other threads need (phase, mailbox sender, child list, fault log) live in a shared block behind a [`DriverHandle`].

use crate::{
	component::Component,
	config::Config,
	diff::Differ,
	error::{BoxError, Fault, FaultLog, FaultSite},
	frame::{Directive, DirectiveFrame, Outbound, Outbox, PatchFrame},
	handler::{Event, HandlerTable},
	id::ComponentId,
	node::Node,
	patch::{self, Patch},
	registry::Registry,
	router::Router,
	Error,
};
use core::{
	fmt,
	mem,
	hash::{Hash, Hasher},
	sync::atomic::{AtomicU64, AtomicU8, Ordering},
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
	panic::{self, AssertUnwindSafe},
	sync::{
		mpsc::{self, Receiver, Sender},
		Arc, Weak,
	},
	thread,
};
use tracing::{debug, debug_span, error, instrument, trace, trace_span, warn};

/// Lifecycle phase of a driver.
///
/// `Created → Mounted → Active → Unmounted`, where `Unmounted` is terminal and reachable from every other phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Phase {
	/// Constructed, not yet registered. `on_create` hasn't run.
	Created = 0,
	/// Registered and initialized, first commit pending.
	Mounted = 1,
	/// Committed at least once.
	Active = 2,
	Unmounted = 3,
}

impl Phase {
	fn from_u8(value: u8) -> Self {
		match value {
			0 => Phase::Created,
			1 => Phase::Mounted,
			2 => Phase::Active,
			_ => Phase::Unmounted,
		}
	}
}

/// State shared by all drivers of one page.
pub(crate) struct Runtime {
	pub(crate) registry: Registry<DriverHandle>,
	pub(crate) outbox: Box<dyn Outbox>,
	pub(crate) config: Config,
}

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime").field("registry", &self.registry).field("config", &self.config).finish_non_exhaustive()
	}
}

enum Envelope {
	Event(Event),
	/// A child was unmounted by someone other than this driver.
	ChildRetired(ComponentId),
}

pub(crate) struct Shared {
	id: ComponentId,
	phase: AtomicU8,
	/// `None` before mount and after retirement.
	mailbox: Mutex<Option<Sender<Envelope>>>,
	children: Mutex<HashMap<ComponentId, DriverHandle>>,
	parent: Mutex<Option<Weak<Shared>>>,
	faults: Mutex<FaultLog>,
	commits: AtomicU64,
}

impl Shared {
	fn phase(&self) -> Phase {
		Phase::from_u8(self.phase.load(Ordering::Acquire))
	}

	fn advance(&self, from: Phase, to: Phase) -> bool {
		self.phase.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire).is_ok()
	}

	fn record(&self, fault: Fault) {
		warn!(id = %self.id, %fault, "Contained fault.");
		self.faults.lock().push(fault);
	}
}

/// A cheap, thread-safe reference to a driver.
///
/// Handles compare equal exactly if they refer to the same driver instance.
#[derive(Clone)]
pub struct DriverHandle(Arc<Shared>);

impl PartialEq for DriverHandle {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for DriverHandle {}
impl Hash for DriverHandle {
	fn hash<H: Hasher>(&self, state: &mut H) {
		Arc::as_ptr(&self.0).hash(state);
	}
}

impl fmt::Debug for DriverHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DriverHandle").field("id", &self.0.id).field("phase", &self.phase()).finish()
	}
}

impl DriverHandle {
	#[must_use]
	pub fn id(&self) -> &ComponentId {
		&self.0.id
	}

	#[must_use]
	pub fn phase(&self) -> Phase {
		self.0.phase()
	}

	/// Queues `event` in this driver's mailbox. Returns once queued, not once handled.
	///
	/// # Errors
	///
	/// - [`Error::DriverRetired`] after unmounting.
	/// - [`Error::InvalidPhase`] before mounting.
	pub fn deliver(&self, event: Event) -> Result<(), Error> {
		self.post(Envelope::Event(event))
	}

	fn post(&self, envelope: Envelope) -> Result<(), Error> {
		if self.phase() == Phase::Unmounted {
			return Err(Error::DriverRetired(self.0.id.clone()));
		}
		// The mailbox opens right before registration, so events that arrive during `on_create` are queued.
		match self.0.mailbox.lock().as_ref() {
			Some(sender) => sender.send(envelope).map_err(|_| Error::DriverRetired(self.0.id.clone())),
			None if self.phase() == Phase::Created => Err(Error::InvalidPhase {
				id: self.0.id.clone(),
				phase: Phase::Created,
				operation: "mailbox delivery",
			}),
			None => Err(Error::DriverRetired(self.0.id.clone())),
		}
	}

	/// The most recent faults, oldest first.
	#[must_use]
	pub fn faults(&self) -> Vec<Fault> {
		self.0.faults.lock().snapshot()
	}

	/// All faults over this driver's lifetime, including those evicted from [`faults`](`DriverHandle::faults`).
	#[must_use]
	pub fn fault_count(&self) -> u64 {
		self.0.faults.lock().total()
	}

	/// Number of completed commits.
	#[must_use]
	pub fn commit_count(&self) -> u64 {
		self.0.commits.load(Ordering::Acquire)
	}

	/// Ids of the currently mounted children, sorted.
	#[must_use]
	pub fn children(&self) -> Vec<ComponentId> {
		let mut children: Vec<_> = self.0.children.lock().keys().cloned().collect();
		children.sort();
		children
	}
}

/// A component together with its handler table, not yet mounted.
pub struct Driver<C: Component> {
	handle: DriverHandle,
	state: C,
	table: HandlerTable<C>,
}

impl<C: Component> fmt::Debug for Driver<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Driver").field("handle", &self.handle).field("table", &self.table).finish_non_exhaustive()
	}
}

impl<C: Component> Driver<C> {
	/// Wraps `component` and builds its handler table.
	///
	/// # Errors
	///
	/// Whatever [`Component::handlers`] returns, usually [`Error::HandlerLimit`].
	pub fn new(id: impl Into<ComponentId>, component: C, config: &Config) -> Result<Self, Error> {
		let id = id.into();
		let mut table = HandlerTable::new(config.max_handlers_per_event);
		C::handlers(&mut table)?;
		trace!(%id, handlers = table.len(), "Created driver.");
		Ok(Self {
			handle: DriverHandle(Arc::new(Shared {
				id,
				phase: AtomicU8::new(Phase::Created as u8),
				mailbox: Mutex::new(None),
				children: Mutex::new(HashMap::new()),
				parent: Mutex::new(None),
				faults: Mutex::new(FaultLog::new(config.fault_history)),
				commits: AtomicU64::new(0),
			})),
			state: component,
			table,
		})
	}

	#[must_use]
	pub fn id(&self) -> &ComponentId {
		self.handle.id()
	}

	/// A handle to this driver. Stays valid (but inert) if the driver is never mounted.
	#[must_use]
	pub fn handle(&self) -> DriverHandle {
		self.handle.clone()
	}
}

/// Registers, initializes and starts `driver`.
#[instrument(skip_all, fields(id = %driver.id()))]
pub(crate) fn mount<C: Component>(driver: Driver<C>, runtime: &Arc<Runtime>, parent: Option<&Arc<Shared>>) -> Result<DriverHandle, Error> {
	let Driver { handle, mut state, table } = driver;
	let shared = &handle.0;
	if shared.phase() != Phase::Created {
		return Err(Error::InvalidPhase {
			id: shared.id.clone(),
			phase: shared.phase(),
			operation: "mount",
		});
	}
	let (sender, receiver) = mpsc::channel();
	*shared.mailbox.lock() = Some(sender);
	if let Err(error) = runtime.registry.put(shared.id.clone(), handle.clone()) {
		shared.mailbox.lock().take();
		return Err(error);
	}

	if let Err(fault) = guarded(FaultSite::Hook("on_create"), || state.on_create()) {
		shared.record(fault);
	}
	*shared.parent.lock() = parent.map(Arc::downgrade);
	shared.advance(Phase::Created, Phase::Mounted);

	let core = Core {
		shared: Arc::clone(shared),
		runtime: Arc::clone(runtime),
		snapshot: Snapshot::Empty,
		differ: Differ::new(runtime.config.depth_limit),
		root: parent.is_none(),
	};
	let spawned = thread::Builder::new()
		.name(format!("lignin-live:{}", shared.id))
		.spawn(move || work(state, &table, core, &receiver));
	if let Err(source) = spawned {
		error!("Failed to spawn driver worker: {}", source);
		retire(&handle, &runtime.registry);
		return Err(Error::Spawn { id: shared.id.clone(), source });
	}

	if let Some(parent) = parent {
		parent.children.lock().insert(shared.id.clone(), handle.clone());
		// The parent may have been retired concurrently, after draining its children.
		if parent.phase() == Phase::Unmounted {
			retire(&handle, &runtime.registry);
			return Err(Error::DriverRetired(parent.id.clone()));
		}
	}
	debug!("Mounted.");
	Ok(handle)
}

/// Unmounts `handle` and its subtree on behalf of someone other than its parent.
pub(crate) fn unmount(handle: &DriverHandle, runtime: &Runtime) -> Result<(), Error> {
	let parent = handle.0.parent.lock().as_ref().and_then(Weak::upgrade);
	if !retire(handle, &runtime.registry) {
		return Err(Error::DriverRetired(handle.id().clone()));
	}
	if let Some(parent) = parent {
		parent.children.lock().remove(handle.id());
		if let Err(error) = DriverHandle(parent).post(Envelope::ChildRetired(handle.id().clone())) {
			debug!(%error, "Parent is gone as well.");
		}
	}
	Ok(())
}

/// Moves `handle` and all of its descendants to [`Phase::Unmounted`], deregisters them and closes their mailboxes.
///
/// Returns `false` if `handle` was already retired.
/// Pending mailbox items are discarded by the respective workers.
fn retire(handle: &DriverHandle, registry: &Registry<DriverHandle>) -> bool {
	let shared = &handle.0;
	if Phase::from_u8(shared.phase.swap(Phase::Unmounted as u8, Ordering::AcqRel)) == Phase::Unmounted {
		return false;
	}
	let span = trace_span!("Retiring", id = %shared.id);
	let _enter = span.enter();

	let children: Vec<DriverHandle> = shared.children.lock().drain().map(|(_, child)| child).collect();
	for child in &children {
		retire(child, registry);
	}
	registry.delete_handle(handle);
	shared.mailbox.lock().take();
	debug!(children = children.len(), "Retired.");
	true
}

/// Runs `f`, turning both its errors and its panics into a [`Fault`].
fn guarded<T>(site: FaultSite, f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, Fault> {
	match panic::catch_unwind(AssertUnwindSafe(f)) {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(error)) => Err(Fault::from_error(site, &error)),
		Err(payload) => Err(Fault::from_panic(site, &*payload)),
	}
}

/// The worker loop of one driver.
fn work<C: Component>(mut state: C, table: &HandlerTable<C>, mut core: Core, mailbox: &Receiver<Envelope>) {
	let span = debug_span!("driver", id = %core.shared.id);
	let _enter = span.enter();

	{
		let mut cx = Context { core: &mut core };
		if let Err(fault) = guarded(FaultSite::Hook("on_mount"), || state.on_mount(&mut cx)) {
			core.shared.record(fault);
		}
	}
	if core.shared.phase() == Phase::Mounted {
		if let Err(error) = core.commit(&state) {
			debug!(%error, "Initial commit failed.");
		}
	}

	let mut discarded = 0_usize;
	while let Ok(envelope) = mailbox.recv() {
		if core.shared.phase() == Phase::Unmounted {
			discarded += 1;
			continue;
		}
		match envelope {
			Envelope::Event(event) => core.dispatch(&mut state, table, &event),
			Envelope::ChildRetired(id) => core.remove_boundary(&id),
		}
	}
	if discarded != 0 {
		debug!("Discarded {} pending mailbox item(s).", discarded);
	}

	if let Err(fault) = guarded(FaultSite::Hook("on_unmount"), || {
		state.on_unmount();
		Ok(())
	}) {
		core.shared.record(fault);
	}
	if core.root && !matches!(core.snapshot, Snapshot::Empty) {
		core.emit(vec![Patch::RemoveChild { path: Vec::new(), index: 0 }]);
	}
	trace!("Worker exiting.");
}

/// What the client is assumed to show for a component.
enum Snapshot {
	/// Nothing rendered yet.
	Empty,
	/// Rendered, but invalidated by a structural change. The next commit replaces the root.
	///
	/// Still tracks what the client shows, so child boundaries can be removed in the meantime.
	Stale(Node),
	Fresh(Node),
}

/// The worker-owned part of a driver, minus component state and handler table.
pub(crate) struct Core {
	shared: Arc<Shared>,
	runtime: Arc<Runtime>,
	snapshot: Snapshot,
	differ: Differ,
	root: bool,
}

impl Core {
	fn commit<C: Component>(&mut self, state: &C) -> Result<(), Error> {
		match self.shared.phase() {
			Phase::Mounted | Phase::Active => (),
			Phase::Unmounted => return Err(Error::DriverRetired(self.shared.id.clone())),
			phase @ Phase::Created => {
				return Err(Error::InvalidPhase {
					id: self.shared.id.clone(),
					phase,
					operation: "commit",
				})
			}
		}
		let span = trace_span!("commit");
		let _enter = span.enter();

		let rendered = match guarded(FaultSite::Render, || state.render()) {
			Ok(rendered) => rendered,
			Err(fault) => {
				self.shared.record(fault.clone());
				match self.fallback(&fault) {
					Some(fallback) => fallback,
					None => return Err(Error::HandlerFault(fault)),
				}
			}
		};
		self.publish(rendered);
		Ok(())
	}

	/// Renders the configured fallback for `fault`, if any.
	///
	/// A failing fallback is recorded as a render fault and yields `None`.
	fn fallback(&self, fault: &Fault) -> Option<Node> {
		let fallback = self.runtime.config.fallback.clone()?;
		match guarded(FaultSite::Render, || Ok(fallback(&self.shared.id, fault))) {
			Ok(node) => Some(node),
			Err(fallback_fault) => {
				self.shared.record(fallback_fault);
				None
			}
		}
	}

	/// Diffs `rendered` against the snapshot, emits the result and stores `rendered` as the new snapshot.
	fn publish(&mut self, rendered: Node) {
		let mut patches = match &self.snapshot {
			Snapshot::Empty => self.differ.diff(None, Some(&rendered)),
			Snapshot::Stale(_) => vec![Patch::ReplaceSubtree {
				path: vec![0],
				node: rendered.clone(),
			}],
			Snapshot::Fresh(old) => self.differ.diff(Some(old), Some(&rendered)),
		};

		if cfg!(debug_assertions) {
			if let Snapshot::Fresh(old) = &self.snapshot {
				let mut check = Some(old.clone());
				let result = patch::apply(&mut check, &patches);
				if result.is_err() || check.as_ref() != Some(&rendered) {
					error!(?result, "Patch batch doesn't reproduce the render; falling back to a full replacement.");
					self.shared.record(Fault {
						site: FaultSite::Diff,
						message: "patch batch doesn't reproduce the render".to_owned(),
						panicked: false,
					});
					patches = vec![Patch::ReplaceSubtree {
						path: vec![0],
						node: rendered.clone(),
					}];
				}
			}
		}

		self.snapshot = Snapshot::Fresh(rendered);
		self.shared.advance(Phase::Mounted, Phase::Active);
		self.shared.commits.fetch_add(1, Ordering::AcqRel);
		trace!(patches = patches.len(), "Committed.");
		self.emit(patches);
	}

	fn emit(&self, patches: Vec<Patch>) {
		self.runtime.outbox.send(Outbound::Patches(PatchFrame {
			component_id: self.shared.id.clone(),
			patches,
		}));
	}

	fn dispatch<C: Component>(&mut self, state: &mut C, table: &HandlerTable<C>, event: &Event) {
		let span = debug_span!("dispatch", event = %event.name);
		let _enter = span.enter();
		if cfg!(feature = "dangerous-logging") {
			trace!(payload = %event.payload, "Dispatching.");
		}

		let mut handled = 0_usize;
		for handler in table.matching(&event.name) {
			handled += 1;
			let mut cx = Context { core: &mut *self };
			if let Err(fault) = guarded(FaultSite::Handler(event.name.clone()), || handler(&mut *state, event, &mut cx)) {
				self.shared.record(fault.clone());
				if self.shared.phase() != Phase::Unmounted {
					if let Some(fallback) = self.fallback(&fault) {
						self.publish(fallback);
					}
				}
			}
		}
		if handled == 0 {
			debug!("No handler registered for this event; ignoring it.");
		}
	}

	/// Invalidates the snapshot after a structural change.
	fn invalidate(&mut self) {
		self.snapshot = match mem::replace(&mut self.snapshot, Snapshot::Empty) {
			Snapshot::Fresh(root) | Snapshot::Stale(root) => Snapshot::Stale(root),
			Snapshot::Empty => Snapshot::Empty,
		};
	}

	/// Emits the removal of the boundary node of the (already retired) child `id`, then invalidates the snapshot.
	fn remove_boundary(&mut self, id: &ComponentId) {
		let path = match &self.snapshot {
			Snapshot::Fresh(root) | Snapshot::Stale(root) => root.find_driver(id),
			Snapshot::Empty => None,
		};
		match path {
			Some(path) => {
				let mut full_path = vec![0];
				full_path.extend(path);
				let index = full_path.pop().unwrap_or(0);
				let root_removed = full_path.is_empty();
				self.emit(vec![Patch::RemoveChild { path: full_path.clone(), index }]);
				if root_removed {
					self.snapshot = Snapshot::Empty;
					return;
				}
				// Keep the snapshot in step with the client, so later removals address the right index.
				if let Snapshot::Fresh(root) | Snapshot::Stale(root) = &mut self.snapshot {
					if let Some(Node::Element(parent)) = root.get_mut(&full_path[1..]) {
						parent.children.remove(index);
					}
				}
				self.invalidate();
			}
			None => {
				trace!(child = %id, "Child boundary isn't in the last render.");
				self.invalidate();
			}
		}
	}
}

/// What handlers and hooks can do besides mutating their component's state.
pub struct Context<'a> {
	core: &'a mut Core,
}

impl fmt::Debug for Context<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context").field("id", &self.core.shared.id).finish_non_exhaustive()
	}
}

impl Context<'_> {
	#[must_use]
	pub fn id(&self) -> &ComponentId {
		&self.core.shared.id
	}

	#[must_use]
	pub fn handle(&self) -> DriverHandle {
		DriverHandle(Arc::clone(&self.core.shared))
	}

	#[must_use]
	pub fn phase(&self) -> Phase {
		self.core.shared.phase()
	}

	/// Renders `state`, diffs against the last render and emits the patches, even if there are none.
	///
	/// Runs synchronously on the calling worker.
	///
	/// # Errors
	///
	/// - [`Error::HandlerFault`] if rendering failed and no fallback is configured. The fault is recorded either way.
	/// - [`Error::DriverRetired`] if this component has been unmounted in the meantime.
	pub fn commit<C: Component>(&mut self, state: &C) -> Result<(), Error> {
		self.core.commit(state)
	}

	/// Wraps `component` using this page's configuration, ready for [`mount`](`Context::mount`).
	///
	/// # Errors
	///
	/// See [`Driver::new`].
	pub fn driver<C: Component>(&self, id: impl Into<ComponentId>, component: C) -> Result<Driver<C>, Error> {
		Driver::new(id, component, &self.core.runtime.config)
	}

	/// Mounts `child` under this component.
	///
	/// Invalidates this component's last render, so the next commit replaces it as a whole.
	///
	/// # Errors
	///
	/// - [`Error::DuplicateId`] if the id is taken.
	/// - [`Error::DriverRetired`] if this component has been unmounted.
	/// - [`Error::Spawn`].
	pub fn mount<C: Component>(&mut self, child: Driver<C>) -> Result<DriverHandle, Error> {
		if self.core.shared.phase() == Phase::Unmounted {
			return Err(Error::DriverRetired(self.core.shared.id.clone()));
		}
		let handle = mount(child, &self.core.runtime, Some(&self.core.shared))?;
		self.core.invalidate();
		Ok(handle)
	}

	/// Unmounts the child `id` and its subtree, and emits the removal of its boundary node.
	///
	/// The child's pending events are discarded.
	///
	/// # Errors
	///
	/// [`Error::NotFound`] if `id` isn't a child of this component.
	pub fn unmount(&mut self, id: &str) -> Result<(), Error> {
		let child = self.core.shared.children.lock().remove(id).ok_or_else(|| Error::NotFound(id.into()))?;
		retire(&child, &self.core.runtime.registry);
		self.core.remove_boundary(child.id());
		Ok(())
	}

	/// Ids of the currently mounted children, sorted.
	#[must_use]
	pub fn children(&self) -> Vec<ComponentId> {
		self.handle().children()
	}

	/// Emits client directives for this component right away, outside of any diff.
	pub fn directives(&mut self, directives: impl IntoIterator<Item = Directive>) {
		let directives: Vec<_> = directives.into_iter().collect();
		if directives.is_empty() {
			return;
		}
		self.core.runtime.outbox.send(Outbound::Directives(DirectiveFrame {
			component_id: self.core.shared.id.clone(),
			directives,
		}));
	}

	/// A router for this page.
	#[must_use]
	pub fn router(&self) -> Router {
		Router::new(Arc::clone(&self.core.runtime))
	}

	/// Queues an event for another component (or this one, after the current handler).
	///
	/// # Errors
	///
	/// See [`Router::route`].
	pub fn route(&self, target: &str, event_name: impl Into<String>, payload: Value) -> Result<(), Error> {
		self.router().route(target, event_name, payload)
	}
}
