//! Integration tests for subject parsing and module lifecycles
//!
//! These tests drive the public loader surface end to end using mock tests
//! and mock module code.

use async_trait::async_trait;
use conditioner_rs::condition::{ChangeNotifier, Test, TestFactory};
use conditioner_rs::config::{CONDITIONS_ATTR, MODULES_ATTR, MODULE_ATTR, PRIORITY_ATTR};
use conditioner_rs::event::Event;
use conditioner_rs::module::{
    ControllerEvent, ControllerTopic, ExecuteStatus, Module, ModuleConstructor, ModuleDescriptor,
    ModuleError, ModuleRegistry, ModuleResolver, ModuleState,
};
use conditioner_rs::subject::{Element, Subject, SubjectRef, INITIALIZED_ATTR};
use conditioner_rs::sync::{GroupEvent, GroupTopic, SyncMember};
use conditioner_rs::{LoadError, ModuleLoader};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::Notify;
use tokio::task::LocalSet;

// ============================================================================
// Mock Components
// ============================================================================

/// A named flag shared by every test instance built for it
#[derive(Clone, Default)]
struct Flag {
    value: Rc<Cell<bool>>,
    notifiers: Rc<RefCell<Vec<ChangeNotifier>>>,
}

impl Flag {
    fn new(value: bool) -> Self {
        let flag = Self::default();
        flag.value.set(value);
        flag
    }

    fn set(&self, value: bool) {
        self.value.set(value);
        let notifiers: Vec<ChangeNotifier> = self
            .notifiers
            .borrow()
            .iter()
            .filter(|n| n.is_active())
            .cloned()
            .collect();
        for notifier in notifiers {
            notifier.notify();
        }
    }

    fn register(&self, tests: &TestFactory, name: &str) {
        let flag = self.clone();
        tests.register(
            name,
            move |_: &SubjectRef, _: Option<&str>| -> conditioner_rs::Result<Box<dyn Test>> {
                Ok(Box::new(FlagTest { flag: flag.clone() }))
            },
        );
    }
}

struct FlagTest {
    flag: Flag,
}

impl Test for FlagTest {
    fn setup(&mut self, notifier: ChangeNotifier) {
        self.flag.notifiers.borrow_mut().push(notifier);
    }

    fn value(&self) -> bool {
        self.flag.value.get()
    }
}

/// Journal of everything mock modules did, in order
type Journal = Rc<RefCell<Vec<String>>>;

struct Recorder {
    name: String,
    journal: Journal,
}

impl ModuleConstructor for Recorder {
    fn construct(&self, subject: &SubjectRef, options: &Value) -> Result<Box<dyn Module>, LoadError> {
        let label = format!("{}@{}", self.name, subject.id());
        self.journal.borrow_mut().push(format!("load {}", label));
        Ok(Box::new(RecordedModule {
            label,
            options: options.clone(),
            journal: self.journal.clone(),
        }))
    }
}

struct RecordedModule {
    label: String,
    options: Value,
    journal: Journal,
}

impl Module for RecordedModule {
    fn unload(&mut self) {
        self.journal.borrow_mut().push(format!("unload {}", self.label));
    }

    fn execute(&mut self, method: &str, params: &[Value]) -> Result<Value, ModuleError> {
        match method {
            "options" => Ok(self.options.clone()),
            "sum" => Ok(json!(params.iter().filter_map(Value::as_i64).sum::<i64>())),
            _ => Err(ModuleError::MethodNotFound(method.to_string())),
        }
    }
}

/// Resolver whose resolutions can be held back
#[derive(Clone, Default)]
struct MockResolver {
    constructors: Rc<RefCell<HashMap<String, Rc<dyn ModuleConstructor>>>>,
    held: Rc<Cell<bool>>,
    gate: Rc<Notify>,
}

impl MockResolver {
    fn with_modules(names: &[&str], journal: &Journal) -> Self {
        let resolver = Self::default();
        for name in names {
            resolver.constructors.borrow_mut().insert(
                name.to_string(),
                Rc::new(Recorder {
                    name: name.to_string(),
                    journal: journal.clone(),
                }),
            );
        }
        resolver
    }

    fn hold(&self) {
        self.held.set(true);
    }

    fn release(&self) {
        self.held.set(false);
        self.gate.notify_waiters();
    }
}

#[async_trait(?Send)]
impl ModuleResolver for MockResolver {
    async fn resolve(&self, path: &str) -> Result<Rc<dyn ModuleConstructor>, LoadError> {
        while self.held.get() {
            self.gate.notified().await;
        }
        self.constructors
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::new(path, "not found"))
    }
}

struct Harness {
    loader: ModuleLoader,
    resolver: MockResolver,
    journal: Journal,
}

impl Harness {
    fn new(registry: ModuleRegistry) -> Self {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let resolver = MockResolver::with_modules(&["ui/clock", "ui/map", "ui/menu"], &journal);
        let loader = ModuleLoader::new(registry, TestFactory::new(), Rc::new(resolver.clone()));
        Self {
            loader,
            resolver,
            journal,
        }
    }

    fn flag(&self, name: &str, value: bool) -> Flag {
        let flag = Flag::new(value);
        flag.register(self.loader.tests(), name);
        flag
    }

    fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }
}

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn subject(id: &str, module: &str) -> Element {
    Element::new(id).with_attribute(MODULE_ATTR, module)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_static_and_conditional_modules_on_one_subject() {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::new(ModuleRegistry::new());
            let x = harness.flag("x", false);
            let header = Element::new("header")
                .with_attribute(
                    MODULES_ATTR,
                    r#"[{"path": "ui/clock"}, {"path": "ui/map", "conditions": "x"}]"#,
                )
                .into_ref();

            harness.loader.parse(&[header.clone()]);
            settle().await;

            let node = harness.loader.node_controller(&header.id()).unwrap();
            assert!(!node.are_modules_active());
            assert_eq!(header.attribute(INITIALIZED_ATTR).as_deref(), Some("ui/clock"));

            x.set(true);
            settle().await;
            assert!(node.are_modules_active());
            assert_eq!(
                header.attribute(INITIALIZED_ATTR).as_deref(),
                Some("ui/clock,ui/map")
            );

            x.set(false);
            assert_eq!(header.attribute(INITIALIZED_ATTR).as_deref(), Some("ui/clock"));
        })
        .await;
}

#[tokio::test]
async fn test_destroy_and_reparse_reads_current_state() {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::new(ModuleRegistry::new());
            let online = harness.flag("online", true);
            let el = subject("status", "ui/menu")
                .with_attribute(CONDITIONS_ATTR, "online")
                .into_ref();

            harness.loader.parse(&[el.clone()]);
            settle().await;
            assert!(harness.loader.is_module_active(&el.id(), "ui/menu"));

            harness.loader.destroy(&el.id());
            assert!(!el.is_processed());
            assert!(el.attribute(INITIALIZED_ATTR).is_none());

            online.set(false);
            let report = harness.loader.parse(&[el.clone()]);
            assert_eq!(report.created.len(), 1);
            settle().await;
            assert!(!harness.loader.is_module_active(&el.id(), "ui/menu"));

            online.set(true);
            settle().await;
            assert!(harness.loader.is_module_active(&el.id(), "ui/menu"));
            assert_eq!(
                harness.journal(),
                vec![
                    "load ui/menu@status",
                    "unload ui/menu@status",
                    "load ui/menu@status"
                ]
            );
        })
        .await;
}

#[tokio::test]
async fn test_higher_priority_subjects_load_first() {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::new(ModuleRegistry::new());
            let subjects = vec![
                subject("footer", "ui/clock").into_ref(),
                subject("nav", "ui/menu")
                    .with_attribute(PRIORITY_ATTR, "10")
                    .into_ref(),
                subject("aside", "ui/clock")
                    .with_attribute(PRIORITY_ATTR, "10")
                    .into_ref(),
                subject("hero", "ui/map")
                    .with_attribute(PRIORITY_ATTR, "-1")
                    .into_ref(),
            ];

            harness.loader.parse(&subjects);
            settle().await;

            assert_eq!(
                harness.journal(),
                vec![
                    "load ui/menu@nav",
                    "load ui/clock@aside",
                    "load ui/clock@footer",
                    "load ui/map@hero"
                ]
            );
        })
        .await;
}

#[tokio::test]
async fn test_broken_subjects_do_not_block_the_batch() {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::new(ModuleRegistry::new());
            let subjects = vec![
                subject("a", "ui/map")
                    .with_attribute(CONDITIONS_ATTR, "(wide")
                    .into_ref(),
                subject("b", "ui/map")
                    .with_attribute(CONDITIONS_ATTR, "unregistered")
                    .into_ref(),
                subject("c", "ui/clock").into_ref(),
            ];

            let report = harness.loader.parse(&subjects);
            settle().await;

            assert_eq!(report.failed.len(), 2);
            assert_eq!(report.created.len(), 1);
            assert_eq!(harness.journal(), vec!["load ui/clock@c"]);
        })
        .await;
}

#[tokio::test]
async fn test_execute_on_modules() {
    LocalSet::new()
        .run_until(async {
            let registry = ModuleRegistry::new();
            registry.register(
                ModuleDescriptor::new("ui/map")
                    .with_alias("map")
                    .with_options(json!({"zoom": 4})),
            );
            let harness = Harness::new(registry);
            let el = subject("map", "map").into_ref();
            harness.loader.parse(&[el.clone()]);
            settle().await;

            let results = harness.loader.execute(&el.id(), "map", "sum", &[json!(2), json!(3)]);
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].path, "ui/map");
            assert_eq!(results[0].result.result, Some(json!(5)));

            let results = harness.loader.execute(&el.id(), "ui/map", "options", &[]);
            assert_eq!(results[0].result.result, Some(json!({"zoom": 4})));

            let results = harness.loader.execute(&el.id(), "ui/map", "fly", &[]);
            assert_eq!(results[0].result.status, ExecuteStatus::MethodNotFound);

            assert!(harness
                .loader
                .execute(&el.id(), "ui/unknown", "sum", &[])
                .is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_synced_group_is_edge_triggered() {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::new(ModuleRegistry::new());
            let a = harness.flag("a", false);
            let b = harness.flag("b", false);
            let first = subject("first", "ui/map")
                .with_attribute(CONDITIONS_ATTR, "a")
                .into_ref();
            let second = subject("second", "ui/menu")
                .with_attribute(CONDITIONS_ATTR, "b")
                .into_ref();
            harness.loader.parse(&[first.clone(), second.clone()]);

            let members: Vec<SyncMember> = [&first, &second]
                .iter()
                .filter_map(|s| harness.loader.node_controller(&s.id()))
                .map(SyncMember::from)
                .collect();
            let group = harness.loader.sync(members).unwrap();

            let seen = Rc::new(RefCell::new(Vec::new()));
            for topic in [GroupTopic::Load, GroupTopic::Unload] {
                let s = seen.clone();
                group.events().subscribe(topic, move |e: &GroupEvent| {
                    let members = match e {
                        GroupEvent::Load(m) | GroupEvent::Unload(m) => m.len(),
                    };
                    s.borrow_mut().push((e.topic(), members));
                });
            }

            b.set(true);
            a.set(true);
            settle().await;
            assert_eq!(*seen.borrow(), vec![(GroupTopic::Load, 2)]);

            b.set(false);
            b.set(true);
            b.set(false);
            b.set(true);
            assert_eq!(
                *seen.borrow(),
                vec![(GroupTopic::Load, 2), (GroupTopic::Unload, 2)]
            );

            settle().await;
            assert_eq!(
                *seen.borrow(),
                vec![
                    (GroupTopic::Load, 2),
                    (GroupTopic::Unload, 2),
                    (GroupTopic::Load, 2)
                ]
            );
        })
        .await;
}

#[tokio::test]
async fn test_condition_dropping_while_loading_never_loads() {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::new(ModuleRegistry::new());
            let wide = harness.flag("wide", true);
            harness.resolver.hold();

            let el = subject("map", "ui/map")
                .with_attribute(CONDITIONS_ATTR, "wide")
                .into_ref();
            harness.loader.parse(&[el.clone()]);
            let controller = harness.loader.module_controller(&el.id(), "ui/map").unwrap();
            assert_eq!(controller.state(), ModuleState::Loading);

            let loads = Rc::new(Cell::new(0));
            let l = loads.clone();
            controller
                .events()
                .subscribe(ControllerTopic::Load, move |_: &ControllerEvent| l.set(l.get() + 1));

            wide.set(false);
            harness.resolver.release();
            settle().await;

            assert_eq!(controller.state(), ModuleState::Unloaded);
            assert_eq!(loads.get(), 0);
            assert!(harness.journal().is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_load_error_leaves_module_unloaded() {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::new(ModuleRegistry::new());
            let wide = harness.flag("wide", true);
            let el = subject("ghost", "ui/ghost")
                .with_attribute(CONDITIONS_ATTR, "wide")
                .into_ref();
            harness.loader.parse(&[el.clone()]);

            let node = harness.loader.node_controller(&el.id()).unwrap();
            let failures = Rc::new(RefCell::new(Vec::new()));
            let f = failures.clone();
            node.events()
                .subscribe(ControllerTopic::LoadFailed, move |e: &ControllerEvent| {
                    if let ControllerEvent::LoadFailed(_, err) = e {
                        f.borrow_mut().push(err.path.clone());
                    }
                });
            settle().await;

            assert_eq!(*failures.borrow(), vec!["ui/ghost".to_string()]);
            let controller = harness.loader.module_controller(&el.id(), "ui/ghost").unwrap();
            assert!(controller.has_failed());

            wide.set(false);
            wide.set(true);
            settle().await;
            assert_eq!(controller.state(), ModuleState::Unloaded);
            assert_eq!(failures.borrow().len(), 1);

            let results = harness.loader.execute(&el.id(), "ui/ghost", "sum", &[]);
            assert_eq!(results[0].result.status, ExecuteStatus::NotActive);
        })
        .await;
}

#[tokio::test]
async fn test_registry_from_yaml_drives_activation() {
    LocalSet::new()
        .run_until(async {
            let registry = ModuleRegistry::from_yaml(
                r#"
modules:
  ui/map:
    alias: map
    conditions: "wide and not touch"
    options:
      zoom: 7
"#,
            )
            .unwrap();
            let harness = Harness::new(registry);
            let wide = harness.flag("wide", true);
            let touch = harness.flag("touch", true);

            let el = subject("map", "map").into_ref();
            harness.loader.parse(&[el.clone()]);
            settle().await;
            assert!(!harness.loader.is_module_active(&el.id(), "map"));

            touch.set(false);
            settle().await;
            assert!(harness.loader.is_module_active(&el.id(), "map"));

            wide.set(false);
            assert!(!harness.loader.is_module_active(&el.id(), "map"));
            assert_eq!(
                harness.journal(),
                vec!["load ui/map@map", "unload ui/map@map"]
            );
        })
        .await;
}

#[tokio::test]
async fn test_destroy_all_unloads_everything() {
    LocalSet::new()
        .run_until(async {
            let harness = Harness::new(ModuleRegistry::new());
            harness.loader.parse(&[
                subject("a", "ui/clock").into_ref(),
                subject("b", "ui/menu").into_ref(),
            ]);
            settle().await;

            harness.loader.destroy_all();
            assert!(harness.loader.node_controllers().is_empty());

            let mut journal = harness.journal();
            journal.sort();
            assert_eq!(
                journal,
                vec![
                    "load ui/clock@a",
                    "load ui/menu@b",
                    "unload ui/clock@a",
                    "unload ui/menu@b"
                ]
            );
        })
        .await;
}
