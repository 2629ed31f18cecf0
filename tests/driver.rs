use lignin_live::{
	BoxError, Component, ComponentId, Config, Directive, Error, Event, FaultSite, HandlerTable, InboundFrame, Node, Outbound, Patch, Phase,
};
use serde_json::{json, Value};
use std::{
	sync::{
		mpsc::{self, Receiver, Sender},
		Arc, Mutex,
	},
	thread,
};

use components_::{page, Parent, Recorder};

#[test]
fn first_commit_follows_mount() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let handle = page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();

	assert_eq!(
		frames.patches_for("recorder"),
		vec![Patch::InsertChild {
			path: vec![],
			index: 0,
			node: Recorder::root(""),
		}]
	);
	assert_eq!(handle.phase(), Phase::Active);
	assert_eq!(handle.commit_count(), 1);
}

#[test]
fn unchanged_commit_is_empty() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();
	frames.patches_for("recorder");

	let router = page.router();
	router.route("recorder", "commit", Value::Null).unwrap();
	assert_eq!(frames.patches_for("recorder"), vec![]);
	router.route("recorder", "commit", Value::Null).unwrap();
	assert_eq!(frames.patches_for("recorder"), vec![]);
}

#[test]
fn label_change_updates_in_place() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	page.mount(
		page.driver(
			"recorder",
			Recorder {
				label: "a".to_owned(),
				..Recorder::default()
			},
		)
		.unwrap(),
	)
	.unwrap();
	frames.patches_for("recorder");

	page.router().route("recorder", "label", json!("b")).unwrap();
	let mut changed = std::collections::BTreeMap::new();
	changed.insert("class".to_owned(), "b".to_owned());
	assert_eq!(
		frames.patches_for("recorder"),
		vec![
			Patch::UpdateAttributes {
				path: vec![0],
				changed,
				removed: vec![],
			},
			Patch::UpdateText {
				path: vec![0, 0],
				text: "b".to_owned(),
			},
		]
	);
}

#[test]
fn mailbox_is_fifo_per_sender() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let recorder = Recorder::default();
	let seen = recorder.seen();
	page.mount(page.driver("recorder", recorder).unwrap()).unwrap();
	frames.patches_for("recorder");

	thread::scope(|scope| {
		for t in 0..4 {
			let router = page.router();
			scope.spawn(move || {
				for i in 0..100 {
					router.route("recorder", "push", json!([t, i])).unwrap();
				}
			});
		}
	});
	page.router().route("recorder", "commit", Value::Null).unwrap();
	frames.patches_for("recorder");

	let seen = seen.lock().unwrap();
	assert_eq!(seen.len(), 400);
	for t in 0..4 {
		let sequence: Vec<u64> = seen.iter().filter(|value| value[0] == t).filter_map(|value| value[1].as_u64()).collect();
		assert_eq!(sequence, (0..100).collect::<Vec<_>>());
	}
}

#[test]
fn unmount_discards_pending_events() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let (release, gate) = mpsc::channel();
	let recorder = Recorder {
		gate: Some(gate),
		..Recorder::default()
	};
	let seen = recorder.seen();
	let unmounted = recorder.unmounted();
	let handle = page.mount(page.driver("recorder", recorder).unwrap()).unwrap();
	frames.patches_for("recorder");

	let router = page.router();
	router.route("recorder", "wait", Value::Null).unwrap();
	for i in 0..10 {
		router.route("recorder", "push", json!(i)).unwrap();
	}
	page.unmount("recorder").unwrap();
	// The worker may have discarded "wait" and exited already.
	let _ = release.send(());

	assert_eq!(frames.patches_for("recorder"), vec![Patch::RemoveChild { path: vec![], index: 0 }]);
	assert!(seen.lock().unwrap().is_empty());
	assert!(Recorder::was_unmounted(&unmounted));

	assert_eq!(handle.phase(), Phase::Unmounted);
	assert!(matches!(handle.deliver(Event::new("push", Value::Null)), Err(Error::DriverRetired(_))));
	assert!(matches!(router.route("recorder", "push", Value::Null), Err(Error::NotFound(_))));
	assert!(matches!(page.unmount("recorder"), Err(Error::NotFound(_))));
}

#[test]
fn faults_are_contained() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let handle = page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();
	frames.patches_for("recorder");

	let router = page.router();
	router.route("recorder", "panic", Value::Null).unwrap();
	router.route("recorder", "fail", Value::Null).unwrap();
	router.route("recorder", "label", json!("alive")).unwrap();
	assert_eq!(frames.patches_for("recorder").len(), 2);

	let faults = handle.faults();
	assert_eq!(faults.len(), 2);
	assert_eq!(faults[0].site, FaultSite::Handler("panic".to_owned()));
	assert!(faults[0].panicked);
	assert_eq!(faults[0].message, "kaboom");
	assert_eq!(faults[1].site, FaultSite::Handler("fail".to_owned()));
	assert!(!faults[1].panicked);
	assert_eq!(faults[1].message, "boom");
	assert_eq!(handle.phase(), Phase::Active);
}

#[test]
fn failed_render_keeps_the_last_render() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let handle = page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();
	frames.patches_for("recorder");

	let router = page.router();
	router.route("recorder", "break", Value::Null).unwrap();
	router.route("recorder", "fix", Value::Null).unwrap();
	assert_eq!(frames.patches_for("recorder"), vec![]);

	let faults = handle.faults();
	assert_eq!(faults.len(), 1);
	assert_eq!(faults[0].site, FaultSite::Render);
	assert_eq!(handle.commit_count(), 2);
}

#[test]
fn fallback_replaces_faulted_render() {
	log_::init();
	let config = Config::default().with_fallback(|id, _| Node::text(format!("{} is unavailable", id)));
	let (page, mut frames) = page(config);
	page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();
	frames.patches_for("recorder");

	page.router().route("recorder", "fail", Value::Null).unwrap();
	assert_eq!(
		frames.patches_for("recorder"),
		vec![Patch::ReplaceSubtree {
			path: vec![0],
			node: Node::text("recorder is unavailable"),
		}]
	);

	// The next regular commit diffs against the fallback.
	page.router().route("recorder", "commit", Value::Null).unwrap();
	assert_eq!(
		frames.patches_for("recorder"),
		vec![Patch::ReplaceSubtree {
			path: vec![0],
			node: Recorder::root(""),
		}]
	);
}

#[test]
fn panicking_fallback_is_contained() {
	log_::init();
	let (page, mut frames) = page(Config::default().with_fallback(|_, _| panic!("fallback exploded")));
	let handle = page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();
	frames.patches_for("recorder");

	page.router().route("recorder", "fail", Value::Null).unwrap();
	page.router().route("recorder", "label", json!("alive")).unwrap();
	assert_eq!(frames.patches_for("recorder").len(), 2);

	let faults = handle.faults();
	assert_eq!(faults.len(), 2);
	assert_eq!(faults[0].site, FaultSite::Handler("fail".to_owned()));
	assert_eq!(faults[1].site, FaultSite::Render);
	assert!(faults[1].panicked);
	assert_eq!(faults[1].message, "fallback exploded");
	assert_eq!(handle.phase(), Phase::Active);
	assert!(page.get("recorder").is_some());
}

#[test]
fn unknown_events_are_ignored() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let handle = page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();
	frames.patches_for("recorder");

	page.router().route("recorder", "Foo", json!({ "x": 1 })).unwrap();
	page.router().route("recorder", "commit", Value::Null).unwrap();
	assert_eq!(frames.patches_for("recorder"), vec![]);
	assert_eq!(handle.fault_count(), 0);
}

#[test]
fn duplicate_mount_is_refused() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let first = page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();
	frames.patches_for("recorder");

	let second = page.driver("recorder", Recorder::default()).unwrap();
	let second_handle = second.handle();
	assert!(matches!(page.mount(second), Err(Error::DuplicateId(_))));
	assert_eq!(second_handle.phase(), Phase::Created);

	assert_eq!(page.get("recorder"), Some(first));
	assert_eq!(page.roots().len(), 1);
	frames.assert_quiet("recorder");
}

#[test]
fn delivery_before_mount_is_refused() {
	log_::init();
	let (page, _frames) = page(Config::default());
	let driver = page.driver("recorder", Recorder::default()).unwrap();
	assert!(matches!(
		driver.handle().deliver(Event::new("push", Value::Null)),
		Err(Error::InvalidPhase { phase: Phase::Created, .. })
	));
}

#[test]
fn directives_bypass_the_diff() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	page.mount(page.driver("recorder", Recorder::default()).unwrap()).unwrap();
	frames.patches_for("recorder");

	page.router().route("recorder", "directive", Value::Null).unwrap();
	match frames.next_for("recorder") {
		Outbound::Directives(frame) => assert_eq!(
			frame.directives,
			vec![Directive::SetText {
				id: "status".to_owned(),
				text: "ok".to_owned(),
			}]
		),
		other => panic!("Expected directives, got {:?}", other),
	}
}

#[test]
fn handlers_can_route_to_others() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let target = Recorder::default();
	let seen = target.seen();
	page.mount(page.driver("source", Recorder::default()).unwrap()).unwrap();
	page.mount(page.driver("target", target).unwrap()).unwrap();
	frames.patches_for("source");
	frames.patches_for("target");

	page.router().route("source", "forward", json!({ "to": "target", "value": 7 })).unwrap();
	page.router().route("source", "commit", Value::Null).unwrap();
	frames.patches_for("source");
	page.router().route("target", "commit", Value::Null).unwrap();
	frames.patches_for("target");

	assert_eq!(*seen.lock().unwrap(), vec![json!(7)]);
}

#[test]
fn child_lifecycle() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let parent = page.mount(page.driver("parent", Parent::default()).unwrap()).unwrap();

	assert_eq!(
		frames.patches_for("parent"),
		vec![Patch::InsertChild {
			path: vec![],
			index: 0,
			node: Parent::root(true),
		}]
	);
	assert!(matches!(&frames.patches_for("child")[..], [Patch::InsertChild { index: 0, .. }]));
	assert_eq!(parent.children(), vec![ComponentId::from("child")]);
	let child = page.get("child").unwrap();

	page.router().route("parent", "drop-child", Value::Null).unwrap();
	assert_eq!(frames.patches_for("parent"), vec![Patch::RemoveChild { path: vec![0], index: 1 }]);
	assert_eq!(child.phase(), Phase::Unmounted);
	assert!(page.get("child").is_none());
	assert!(parent.children().is_empty());

	// A structural change invalidates the parent's last render.
	page.router().route("parent", "commit", Value::Null).unwrap();
	assert_eq!(
		frames.patches_for("parent"),
		vec![Patch::ReplaceSubtree {
			path: vec![0],
			node: Parent::root(false),
		}]
	);
	frames.assert_quiet("child");
}

#[test]
fn external_child_unmount_notifies_parent() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	page.mount(page.driver("parent", Parent::default()).unwrap()).unwrap();
	frames.patches_for("parent");
	frames.patches_for("child");

	page.unmount("child").unwrap();
	assert_eq!(frames.patches_for("parent"), vec![Patch::RemoveChild { path: vec![0], index: 1 }]);
	assert_eq!(page.ids(), vec![ComponentId::from("parent")]);
}

#[test]
fn stale_parent_still_removes_unmounted_child() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	page.mount(page.driver("parent", Parent::default()).unwrap()).unwrap();
	frames.patches_for("parent");
	frames.patches_for("child");

	page.router().route("parent", "mount-second", Value::Null).unwrap();
	frames.patches_for("second");

	page.unmount("child").unwrap();
	assert_eq!(frames.patches_for("parent"), vec![Patch::RemoveChild { path: vec![0], index: 1 }]);

	page.router().route("parent", "commit", Value::Null).unwrap();
	assert_eq!(
		frames.patches_for("parent"),
		vec![Patch::ReplaceSubtree {
			path: vec![0],
			node: Parent::root(true),
		}]
	);
}

#[test]
fn unmount_is_recursive() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let parent = page.mount(page.driver("parent", Parent::default()).unwrap()).unwrap();
	frames.patches_for("parent");
	frames.patches_for("child");
	let child = page.get("child").unwrap();

	page.unmount("parent").unwrap();
	assert_eq!(parent.phase(), Phase::Unmounted);
	assert_eq!(child.phase(), Phase::Unmounted);
	assert!(page.ids().is_empty());
	assert!(page.roots().is_empty());
	assert_eq!(frames.patches_for("parent"), vec![Patch::RemoveChild { path: vec![], index: 0 }]);
}

#[test]
fn dropping_the_page_unmounts_roots() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let recorder = Recorder::default();
	let unmounted = recorder.unmounted();
	let handle = page.mount(page.driver("recorder", recorder).unwrap()).unwrap();
	frames.patches_for("recorder");

	drop(page);
	assert_eq!(frames.patches_for("recorder"), vec![Patch::RemoveChild { path: vec![], index: 0 }]);
	assert!(Recorder::was_unmounted(&unmounted));
	assert_eq!(handle.phase(), Phase::Unmounted);
}

struct Greedy;

impl Component for Greedy {
	fn render(&self) -> Result<Node, BoxError> {
		Ok(Node::text("greedy"))
	}

	fn handlers(table: &mut HandlerTable<Self>) -> Result<(), Error> {
		table.on("click", |_, _, _| Ok(()))?;
		table.on("click", |_, _, _| Ok(()))?;
		Ok(())
	}
}

#[test]
fn handler_limit() {
	log_::init();
	let (strict, _frames) = page(Config::default().with_max_handlers_per_event(1));
	assert!(matches!(
		strict.driver("greedy", Greedy),
		Err(Error::HandlerLimit { limit: 1, ref pattern }) if pattern == "click"
	));

	let (lenient, _frames) = page(Config::default());
	assert!(lenient.driver("greedy", Greedy).is_ok());
}

/// Holds up `on_create` until told to continue.
struct SlowStart {
	started: Sender<()>,
	proceed: Receiver<()>,
	seen: Arc<Mutex<Vec<Value>>>,
}

impl Component for SlowStart {
	fn render(&self) -> Result<Node, BoxError> {
		Ok(Node::text("slow"))
	}

	fn handlers(table: &mut HandlerTable<Self>) -> Result<(), Error> {
		table.on("push", |slow, event, _| {
			slow.seen.lock().unwrap().push(event.payload.clone());
			Ok(())
		})?;
		table.on("commit", |slow, _, cx| Ok(cx.commit(&*slow)?))?;
		Ok(())
	}

	fn on_create(&mut self) -> lignin_live::HandlerResult {
		self.started.send(())?;
		self.proceed.recv_timeout(components_::TIMEOUT)?;
		Ok(())
	}
}

#[test]
fn events_during_on_create_are_queued() {
	log_::init();
	let (page, mut frames) = page(Config::default());
	let (started, on_started) = mpsc::channel();
	let (proceed, on_proceed) = mpsc::channel();
	let seen = Arc::new(Mutex::new(Vec::new()));
	let slow = SlowStart {
		started,
		proceed: on_proceed,
		seen: Arc::clone(&seen),
	};

	thread::scope(|scope| {
		let mounting = scope.spawn(|| page.mount(page.driver("slow", slow).unwrap()).unwrap());
		on_started.recv_timeout(components_::TIMEOUT).unwrap();

		page.handle_inbound(InboundFrame {
			component_id: "slow".into(),
			event_name: "push".to_owned(),
			payload: json!(1),
		})
		.unwrap();
		page.router().route("slow", "push", json!(2)).unwrap();

		proceed.send(()).unwrap();
		mounting.join().unwrap();
	});

	frames.patches_for("slow");
	page.router().route("slow", "commit", Value::Null).unwrap();
	frames.patches_for("slow");
	assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
}
