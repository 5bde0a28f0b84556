//! Interface to the host runtime that delivers events and owns unit, relation and config state

use std::collections::BTreeMap;
use std::fmt;

use crate::config::ConfigData;
use crate::error::CharmError;
use crate::pebble::Container;

/// The flat string-keyed transport for one side of one relation
pub type Databag = BTreeMap<String, String>;

pub type RelationId = u32;

/// Which side of an integration this charm is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationRole {
    Provider,
    Requirer,
    Peer,
}

/// Snapshot of a relation, taken fresh from the host on every read
///
/// Nothing in the charm keeps one of these across events.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: RelationId,

    /// Endpoint name as declared in metadata.yaml
    pub name: String,

    pub role: RelationRole,

    /// The remote application, if it is known yet
    pub app: Option<String>,

    /// Remote units, in the order they joined
    pub units: Vec<String>,

    /// This application's databag
    ///
    /// On non-peer relations the host only lets the leader read it; other units see it empty.
    pub local_app_data: Databag,

    /// The remote application's databag
    pub remote_app_data: Databag,

    /// Databags of each remote unit
    pub remote_units_data: BTreeMap<String, Databag>,
}

impl Relation {
    pub fn unit_data(&self, unit: &str) -> Option<&Databag> {
        self.remote_units_data.get(unit)
    }
}

/// Unit status, the primary channel for reporting reconciliation problems
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Unknown,
    Active(String),
    Maintenance(String),
    Waiting(String),
    Blocked(String),
}

impl Status {
    pub fn active() -> Self {
        Status::Active(String::new())
    }

    pub fn waiting<S: Into<String>>(msg: S) -> Self {
        Status::Waiting(msg.into())
    }

    pub fn blocked<S: Into<String>>(msg: S) -> Self {
        Status::Blocked(msg.into())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Active(_) => "active",
            Status::Maintenance(_) => "maintenance",
            Status::Waiting(_) => "waiting",
            Status::Blocked(_) => "blocked",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Status::Unknown => "",
            Status::Active(m)
            | Status::Maintenance(m)
            | Status::Waiting(m)
            | Status::Blocked(m) => m.as_str(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message().is_empty() {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{}: {}", self.name(), self.message())
        }
    }
}

/// Low-level relation lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationEventKind {
    Created,
    Joined,
    Changed,
    Departed,
    Broken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEvent {
    pub kind: RelationEventKind,
    pub relation_name: String,
    pub relation_id: RelationId,

    /// The remote unit that joined, changed or departed
    pub unit: Option<String>,
}

impl RelationEvent {
    pub fn new<S: Into<String>>(
        kind: RelationEventKind,
        relation_name: S,
        relation_id: RelationId,
        unit: Option<String>,
    ) -> Self {
        Self {
            kind,
            relation_name: relation_name.into(),
            relation_id,
            unit,
        }
    }
}

/// The host runtime, as seen from inside a single event
///
/// Every read returns the host's current view. Writes to application data are only accepted from
/// the leader unit; other units get `CharmError::NotLeader`.
pub trait Model {
    fn app_name(&self) -> String;

    fn unit_name(&self) -> String;

    fn model_name(&self) -> String;

    fn model_uuid(&self) -> String;

    fn is_leader(&self) -> bool;

    fn config(&self) -> ConfigData;

    /// All active relations on the given endpoint
    fn relations(&self, relation_name: &str) -> Vec<Relation>;

    /// The single relation on an endpoint with `limit: 1`
    fn relation(&self, relation_name: &str) -> Option<Relation> {
        self.relations(relation_name).into_iter().next()
    }

    /// Replace this application's databag on a relation
    fn update_app_data(&self, relation_id: RelationId, data: Databag) -> Result<(), CharmError>;

    fn status(&self) -> Status;

    fn set_status(&self, status: Status);

    fn container(&self, name: &str) -> Result<Box<dyn Container + '_>, CharmError>;
}
