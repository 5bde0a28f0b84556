//! An in-memory host for driving the charm in tests
//!
//! `Harness` owns a fake model and fake Pebble containers, delivers events to the charm the way
//! the host would, and keeps deferred events around to deliver again before the next one.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::debug;

use crate::charm::{Action, ActionFailed, ActionResults, Event, LivepatchCharm, Outcome};
use crate::charm_source::{CharmSource, Metadata};
use crate::config::{ConfigData, ConfigValue};
use crate::contracts::{ContractsClient, HttpContractsClient};
use crate::error::CharmError;
use crate::model::{
    Databag, Model, Relation, RelationEvent, RelationEventKind, RelationId, RelationRole, Status,
};
use crate::pebble::{
    Container, ExecError, ExecOutput, Layer, Plan, ServiceInfo, ServiceStatus, Startup,
};

/// What a faked command does when run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn ok<S: Into<String>>(stdout: S) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failed<S: Into<String>>(exit_code: i32, stderr: S) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct ContainerState {
    can_connect: bool,
    layers: Vec<(String, Layer)>,
    running: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    exec_handlers: Vec<(Vec<String>, ExecResult)>,
    exec_log: Vec<Vec<String>>,
}

impl ContainerState {
    fn plan(&self) -> Plan {
        let mut plan = Plan::default();
        for (_, layer) in &self.layers {
            plan.combine(layer);
        }
        plan
    }

    /// The handler with the longest command prefix matching `command`
    fn handler(&self, command: &[String]) -> Option<&ExecResult> {
        self.exec_handlers
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, result)| result)
    }
}

#[derive(Debug)]
struct Backend {
    app_name: String,
    unit_name: String,
    model_name: String,
    model_uuid: String,
    leader: bool,
    config: ConfigData,
    metadata: Metadata,
    relations: BTreeMap<RelationId, Relation>,
    next_relation_id: RelationId,
    status: Status,
    containers: BTreeMap<String, ContainerState>,
}

impl Backend {
    fn relation_mut(&mut self, id: RelationId) -> Result<&mut Relation, CharmError> {
        self.relations
            .get_mut(&id)
            .ok_or(CharmError::RelationNotFound(id))
    }

    fn container_mut(&mut self, name: &str) -> Result<&mut ContainerState, CharmError> {
        self.containers
            .get_mut(name)
            .ok_or_else(|| CharmError::ContainerNotFound(name.into()))
    }
}

/// The model as the charm sees it; clones share the same backend
#[derive(Debug, Clone)]
pub struct TestModel {
    backend: Rc<RefCell<Backend>>,
}

impl Model for TestModel {
    fn app_name(&self) -> String {
        self.backend.borrow().app_name.clone()
    }

    fn unit_name(&self) -> String {
        self.backend.borrow().unit_name.clone()
    }

    fn model_name(&self) -> String {
        self.backend.borrow().model_name.clone()
    }

    fn model_uuid(&self) -> String {
        self.backend.borrow().model_uuid.clone()
    }

    fn is_leader(&self) -> bool {
        self.backend.borrow().leader
    }

    fn config(&self) -> ConfigData {
        self.backend.borrow().config.clone()
    }

    fn relations(&self, relation_name: &str) -> Vec<Relation> {
        let backend = self.backend.borrow();
        backend
            .relations
            .values()
            .filter(|r| r.name == relation_name)
            .map(|r| {
                let mut relation = r.clone();
                if !backend.leader && relation.role != RelationRole::Peer {
                    relation.local_app_data.clear();
                }
                relation
            })
            .collect()
    }

    fn update_app_data(&self, relation_id: RelationId, data: Databag) -> Result<(), CharmError> {
        let mut backend = self.backend.borrow_mut();
        if !backend.leader {
            return Err(CharmError::NotLeader(relation_id));
        }
        backend.relation_mut(relation_id)?.local_app_data = data;
        Ok(())
    }

    fn status(&self) -> Status {
        self.backend.borrow().status.clone()
    }

    fn set_status(&self, status: Status) {
        debug!(%status, "Unit status");
        self.backend.borrow_mut().status = status;
    }

    fn container(&self, name: &str) -> Result<Box<dyn Container + '_>, CharmError> {
        if !self.backend.borrow().containers.contains_key(name) {
            return Err(CharmError::ContainerNotFound(name.into()));
        }
        Ok(Box::new(TestContainer {
            backend: self.backend.clone(),
            name: name.into(),
        }))
    }
}

/// A Pebble container held in memory
#[derive(Debug, Clone)]
pub struct TestContainer {
    backend: Rc<RefCell<Backend>>,
    name: String,
}

impl TestContainer {
    /// Run `f` on the container's state, failing like Pebble does when it is unreachable
    fn with<T, F>(&self, f: F) -> Result<T, CharmError>
    where
        F: FnOnce(&mut ContainerState) -> Result<T, CharmError>,
    {
        let mut backend = self.backend.borrow_mut();
        let container = backend.container_mut(&self.name)?;
        if !container.can_connect {
            return Err(CharmError::PebbleError(format!(
                "cannot connect to Pebble in container {}",
                self.name
            )));
        }
        f(container)
    }
}

impl Container for TestContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_connect(&self) -> bool {
        self.backend
            .borrow()
            .containers
            .get(&self.name)
            .map(|c| c.can_connect)
            .unwrap_or(false)
    }

    fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<(), CharmError> {
        self.with(|c| {
            match c.layers.iter_mut().find(|(l, _)| l == label) {
                Some((_, existing)) if combine => existing.combine(layer),
                Some(_) => {
                    return Err(CharmError::PebbleError(format!(
                        "layer {} already exists",
                        label
                    )))
                }
                None => c.layers.push((label.into(), layer.clone())),
            }
            Ok(())
        })
    }

    fn plan(&self) -> Result<Plan, CharmError> {
        self.with(|c| Ok(c.plan()))
    }

    fn service(&self, name: &str) -> Result<ServiceInfo, CharmError> {
        self.with(|c| {
            let plan = c.plan();
            let service = plan
                .services
                .get(name)
                .ok_or_else(|| CharmError::PebbleError(format!("service {} not found", name)))?;
            Ok(ServiceInfo {
                name: name.into(),
                startup: service.startup.unwrap_or(Startup::Disabled),
                current: if c.running.contains(name) {
                    ServiceStatus::Active
                } else {
                    ServiceStatus::Inactive
                },
            })
        })
    }

    fn start(&self, services: &[&str]) -> Result<(), CharmError> {
        self.with(|c| {
            let plan = c.plan();
            for service in services {
                if !plan.services.contains_key(*service) {
                    return Err(CharmError::PebbleError(format!(
                        "cannot start unknown service {}",
                        service
                    )));
                }
                c.running.insert((*service).into());
            }
            Ok(())
        })
    }

    fn stop(&self, services: &[&str]) -> Result<(), CharmError> {
        self.with(|c| {
            for service in services {
                c.running.remove(*service);
            }
            Ok(())
        })
    }

    fn replan(&self) -> Result<(), CharmError> {
        self.with(|c| {
            let plan = c.plan();
            c.running.retain(|s| plan.services.contains_key(s));
            for (name, service) in &plan.services {
                if service.startup == Some(Startup::Enabled) {
                    c.running.insert(name.clone());
                }
            }
            Ok(())
        })
    }

    fn push(&self, path: &str, content: &[u8], _make_dirs: bool) -> Result<(), CharmError> {
        self.with(|c| {
            c.files.insert(path.into(), content.to_vec());
            Ok(())
        })
    }

    fn exists(&self, path: &str) -> Result<bool, CharmError> {
        self.with(|c| Ok(c.files.contains_key(path)))
    }

    fn exec(&self, command: &[&str]) -> Result<ExecOutput, CharmError> {
        let command: Vec<String> = command.iter().map(|s| s.to_string()).collect();
        self.with(|c| {
            c.exec_log.push(command.clone());
            let result = c.handler(&command).cloned().ok_or_else(|| {
                CharmError::PebbleError(format!("no exec handler registered for {:?}", command))
            })?;

            if result.exit_code == 0 {
                Ok(ExecOutput {
                    stdout: result.stdout,
                    stderr: result.stderr,
                })
            } else {
                Err(ExecError {
                    command,
                    exit_code: result.exit_code,
                    stdout: result.stdout,
                    stderr: result.stderr,
                }
                .into())
            }
        })
    }
}

/// Plays the host for a single unit of the charm
pub struct Harness {
    backend: Rc<RefCell<Backend>>,
    charm: LivepatchCharm<TestModel>,
    deferred: Vec<Event>,
    hooks_enabled: bool,
}

impl Harness {
    pub fn new() -> Result<Self, CharmError> {
        Self::with_contracts_client(Box::new(HttpContractsClient))
    }

    /// A harness whose charm talks to the given contracts client
    ///
    /// Hooks start disabled; call `begin` once the initial state is set up.
    pub fn with_contracts_client(contracts: Box<dyn ContractsClient>) -> Result<Self, CharmError> {
        let source = CharmSource::livepatch()?;
        let app_name = source.metadata.name.clone();

        let backend = Rc::new(RefCell::new(Backend {
            unit_name: format!("{}/0", app_name),
            app_name,
            model_name: "livepatch-model".into(),
            model_uuid: "b8a5e1b3-6bd6-4bd1-8f5c-1b7b6e0d7a34".into(),
            leader: false,
            config: source.config_defaults(),
            containers: source
                .metadata
                .containers
                .keys()
                .map(|name| (name.clone(), ContainerState::default()))
                .collect(),
            metadata: source.metadata,
            relations: BTreeMap::new(),
            next_relation_id: 0,
            status: Status::Unknown,
        }));

        let model = TestModel {
            backend: backend.clone(),
        };

        Ok(Self {
            backend,
            charm: LivepatchCharm::with_contracts_client(model, contracts),
            deferred: vec![],
            hooks_enabled: false,
        })
    }

    pub fn begin(&mut self) {
        self.hooks_enabled = true;
    }

    pub fn disable_hooks(&mut self) {
        self.hooks_enabled = false;
    }

    pub fn enable_hooks(&mut self) {
        self.hooks_enabled = true;
    }

    pub fn charm(&self) -> &LivepatchCharm<TestModel> {
        &self.charm
    }

    pub fn model(&self) -> &TestModel {
        self.charm.model()
    }

    /// Deliver an event, after delivering any previously deferred ones
    pub fn emit(&mut self, event: Event) -> Result<Outcome, CharmError> {
        if !self.hooks_enabled {
            return Ok(Outcome::Complete);
        }

        let mut pending = std::mem::take(&mut self.deferred).into_iter();
        while let Some(deferred) = pending.next() {
            match self.charm.handle(&deferred) {
                Ok(Outcome::Defer) => self.deferred.push(deferred),
                Ok(Outcome::Complete) => {}
                Err(err) => {
                    // the host retries the failed event and everything queued behind it
                    self.deferred.push(deferred);
                    self.deferred.extend(pending);
                    self.deferred.push(event);
                    return Err(err);
                }
            }
        }

        let outcome = self.charm.handle(&event)?;
        if outcome == Outcome::Defer {
            debug!(?event, "Event deferred");
            self.deferred.push(event);
        }
        Ok(outcome)
    }

    /// Events waiting to be delivered again
    pub fn deferred(&self) -> &[Event] {
        &self.deferred
    }

    pub fn run_action(&mut self, action: Action) -> Result<ActionResults, ActionFailed> {
        self.charm.run_action(&action)
    }

    pub fn set_leader(&mut self, leader: bool) -> Result<(), CharmError> {
        let was_leader = {
            let mut backend = self.backend.borrow_mut();
            let was_leader = backend.leader;
            backend.leader = leader;
            was_leader
        };

        if leader && !was_leader {
            self.emit(Event::LeaderElected)?;
        }
        Ok(())
    }

    pub fn update_config(&mut self, values: &[(&str, ConfigValue)]) -> Result<(), CharmError> {
        {
            let mut backend = self.backend.borrow_mut();
            for (key, value) in values {
                backend.config.insert((*key).into(), value.clone());
            }
        }
        self.emit(Event::ConfigChanged).map(|_| ())
    }

    pub fn unset_config(&mut self, keys: &[&str]) -> Result<(), CharmError> {
        {
            let mut backend = self.backend.borrow_mut();
            for key in keys {
                backend.config.remove(*key);
            }
        }
        self.emit(Event::ConfigChanged).map(|_| ())
    }

    pub fn add_relation(&mut self, name: &str, remote_app: &str) -> Result<RelationId, CharmError> {
        let id = {
            let mut backend = self.backend.borrow_mut();
            let role = backend
                .metadata
                .relation_role(name)
                .ok_or_else(|| CharmError::UnknownEndpoint(name.into()))?;

            let id = backend.next_relation_id;
            backend.next_relation_id += 1;

            let app = if role == RelationRole::Peer {
                backend.app_name.clone()
            } else {
                remote_app.into()
            };

            backend.relations.insert(
                id,
                Relation {
                    id,
                    name: name.into(),
                    role,
                    app: Some(app),
                    units: vec![],
                    local_app_data: Databag::new(),
                    remote_app_data: Databag::new(),
                    remote_units_data: BTreeMap::new(),
                },
            );
            id
        };

        self.emit_relation(RelationEventKind::Created, id, None)?;
        Ok(id)
    }

    pub fn add_relation_unit(&mut self, id: RelationId, unit: &str) -> Result<(), CharmError> {
        {
            let mut backend = self.backend.borrow_mut();
            let relation = backend.relation_mut(id)?;
            relation.units.push(unit.into());
            relation
                .remote_units_data
                .insert(unit.into(), Databag::new());
        }
        self.emit_relation(RelationEventKind::Joined, id, Some(unit.into()))
    }

    /// Write into a databag as `app_or_unit`
    ///
    /// Writing our own application's databag is the host seeding state and emits nothing. Empty
    /// values remove the key.
    pub fn update_relation_data(
        &mut self,
        id: RelationId,
        app_or_unit: &str,
        data: &[(&str, &str)],
    ) -> Result<(), CharmError> {
        let remote_unit = {
            let mut backend = self.backend.borrow_mut();
            let app_name = backend.app_name.clone();
            let relation = backend.relation_mut(id)?;

            let (databag, remote_unit) = if app_or_unit == app_name {
                (&mut relation.local_app_data, None)
            } else if relation.app.as_ref().map(String::as_str) == Some(app_or_unit) {
                (&mut relation.remote_app_data, Some(None))
            } else {
                let databag = relation
                    .remote_units_data
                    .get_mut(app_or_unit)
                    .ok_or_else(|| CharmError::RelationNotFound(id))?;
                (databag, Some(Some(app_or_unit.to_string())))
            };

            for (key, value) in data {
                if value.is_empty() {
                    databag.remove(*key);
                } else {
                    databag.insert((*key).into(), (*value).into());
                }
            }
            remote_unit
        };

        match remote_unit {
            Some(unit) => self.emit_relation(RelationEventKind::Changed, id, unit),
            None => Ok(()),
        }
    }

    pub fn remove_relation_unit(&mut self, id: RelationId, unit: &str) -> Result<(), CharmError> {
        {
            let mut backend = self.backend.borrow_mut();
            let relation = backend.relation_mut(id)?;
            relation.units.retain(|u| u != unit);
            relation.remote_units_data.remove(unit);
        }
        self.emit_relation(RelationEventKind::Departed, id, Some(unit.into()))
    }

    /// Depart every unit, then break the relation
    ///
    /// The relation is gone from the model by the time the broken event is delivered.
    pub fn remove_relation(&mut self, id: RelationId) -> Result<(), CharmError> {
        let units = self
            .backend
            .borrow()
            .relations
            .get(&id)
            .map(|r| r.units.clone())
            .ok_or(CharmError::RelationNotFound(id))?;

        for unit in units {
            self.remove_relation_unit(id, &unit)?;
        }

        let name = self
            .backend
            .borrow_mut()
            .relations
            .remove(&id)
            .map(|r| r.name)
            .ok_or(CharmError::RelationNotFound(id))?;

        self.emit(Event::Relation(RelationEvent::new(
            RelationEventKind::Broken,
            name,
            id,
            None,
        )))
        .map(|_| ())
    }

    fn emit_relation(
        &mut self,
        kind: RelationEventKind,
        id: RelationId,
        unit: Option<String>,
    ) -> Result<(), CharmError> {
        let name = self.relation(id)?.name;
        self.emit(Event::Relation(RelationEvent::new(kind, name, id, unit)))
            .map(|_| ())
    }

    pub fn relation(&self, id: RelationId) -> Result<Relation, CharmError> {
        self.backend
            .borrow()
            .relations
            .get(&id)
            .cloned()
            .ok_or(CharmError::RelationNotFound(id))
    }

    pub fn set_can_connect(&mut self, container: &str, can_connect: bool) -> Result<(), CharmError> {
        self.backend
            .borrow_mut()
            .container_mut(container)?
            .can_connect = can_connect;
        Ok(())
    }

    /// Pebble in `container` came up
    pub fn container_pebble_ready(&mut self, container: &str) -> Result<(), CharmError> {
        self.set_can_connect(container, true)?;
        self.emit(Event::PebbleReady(container.into())).map(|_| ())
    }

    /// Fake the result of commands starting with `prefix`; an empty prefix matches everything
    pub fn handle_exec(
        &mut self,
        container: &str,
        prefix: &[&str],
        result: ExecResult,
    ) -> Result<(), CharmError> {
        self.backend
            .borrow_mut()
            .container_mut(container)?
            .exec_handlers
            .push((prefix.iter().map(|s| s.to_string()).collect(), result));
        Ok(())
    }

    /// Put a file into a container, as if the image shipped it
    pub fn add_file(&mut self, container: &str, path: &str, content: &[u8]) -> Result<(), CharmError> {
        self.backend
            .borrow_mut()
            .container_mut(container)?
            .files
            .insert(path.into(), content.to_vec());
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.backend.borrow().status.clone()
    }

    pub fn config(&self) -> ConfigData {
        self.backend.borrow().config.clone()
    }

    pub fn plan(&self, container: &str) -> Result<Plan, CharmError> {
        Ok(self.backend.borrow_mut().container_mut(container)?.plan())
    }

    pub fn file(&self, container: &str, path: &str) -> Result<Option<Vec<u8>>, CharmError> {
        Ok(self
            .backend
            .borrow_mut()
            .container_mut(container)?
            .files
            .get(path)
            .cloned())
    }

    pub fn is_running(&self, container: &str, service: &str) -> Result<bool, CharmError> {
        Ok(self
            .backend
            .borrow_mut()
            .container_mut(container)?
            .running
            .contains(service))
    }

    /// Commands run in `container`, oldest first
    pub fn exec_log(&self, container: &str) -> Result<Vec<Vec<String>>, CharmError> {
        Ok(self
            .backend
            .borrow_mut()
            .container_mut(container)?
            .exec_log
            .clone())
    }
}
