use crate::{
	driver::Context,
	error::{BoxError, HandlerResult},
	handler::HandlerTable,
	node::Node,
	Error,
};

/// User-defined behavior driven by a [`Driver`](`crate::Driver`).
///
/// A component owns its state. Everything else (identity, mailbox, last render, children) belongs to its driver.
///
/// # Lifecycle
///
/// 1. The component value is constructed and [`handlers`](`Component::handlers`) fills its handler table.
/// 2. On mount, [`on_create`](`Component::on_create`) runs on the mounting thread.
/// 3. On the driver's own worker, [`on_mount`](`Component::on_mount`) runs and the first commit follows (unless `on_mount` committed already).
/// 4. Handlers run one event at a time.
/// 5. After unmounting, [`on_unmount`](`Component::on_unmount`) runs once on the worker and pending events are discarded.
pub trait Component: Send + 'static {
	/// Renders the current state. Must not have side effects.
	///
	/// # Errors
	///
	/// Any error is recorded as a [`Fault`](`crate::Fault`) and the commit is abandoned (or replaced by the configured fallback render).
	fn render(&self) -> Result<Node, BoxError>;

	/// Registers this component type's event handlers.
	///
	/// # Errors
	///
	/// Propagate registration errors ([`Error::HandlerLimit`]) with `?`.
	fn handlers(table: &mut HandlerTable<Self>) -> Result<(), Error>
	where
		Self: Sized,
	{
		let _ = table;
		Ok(())
	}

	/// Initializes the component's state.
	///
	/// # Errors
	///
	/// A failure is recorded as a fault but doesn't prevent mounting.
	fn on_create(&mut self) -> HandlerResult {
		Ok(())
	}

	/// Runs on the driver's worker before the first commit. Children can be mounted here.
	///
	/// # Errors
	///
	/// A failure is recorded as a fault. The first commit still happens.
	fn on_mount(&mut self, cx: &mut Context<'_>) -> HandlerResult {
		let _ = cx;
		Ok(())
	}

	fn on_unmount(&mut self) {}
}
