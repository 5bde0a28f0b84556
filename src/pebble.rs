//! Interface to the Pebble container supervisor and its declarative layer format

use std::collections::BTreeMap;

use failure::Fail;
use serde_derive::{Deserialize, Serialize};
use serde_yaml::to_string;

use crate::error::CharmError;

/// How a layer entry combines with an entry of the same name in lower layers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Override {
    Merge,
    Replace,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Startup {
    Enabled,
    Disabled,
}

/// A service entry of a Pebble layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Service {
    #[serde(rename = "override")]
    pub override_: Override,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<Startup>,

    /// Command to run, interpreted by Pebble with shell-like splitting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl Service {
    fn merge(&mut self, other: &Service) {
        if other.summary.is_some() {
            self.summary = other.summary.clone();
        }
        if other.description.is_some() {
            self.description = other.description.clone();
        }
        if other.startup.is_some() {
            self.startup = other.startup;
        }
        if other.command.is_some() {
            self.command = other.command.clone();
        }
        self.environment.extend(
            other
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct HttpCheck {
    pub url: String,
}

/// A health check entry of a Pebble layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Check {
    #[serde(rename = "override")]
    pub override_: Override,

    /// Interval between checks, in Pebble duration format such as `1m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpCheck>,
}

impl Check {
    fn merge(&mut self, other: &Check) {
        if other.period.is_some() {
            self.period = other.period.clone();
        }
        if other.http.is_some() {
            self.http = other.http.clone();
        }
    }
}

/// A Pebble configuration layer
///
/// The container's plan is the combination of all of its layers, in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Layer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, Service>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, Check>,
}

/// The combined view of every layer in a container
pub type Plan = Layer;

impl Layer {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.checks.is_empty()
    }

    /// Combine `other` on top of this layer
    ///
    /// Entries marked `merge` are merged field by field, with environment variables merged key by
    /// key. Entries marked `replace` overwrite whatever was there.
    pub fn combine(&mut self, other: &Layer) {
        if other.summary.is_some() {
            self.summary = other.summary.clone();
        }
        if other.description.is_some() {
            self.description = other.description.clone();
        }

        for (name, service) in &other.services {
            match (self.services.get_mut(name), service.override_) {
                (Some(existing), Override::Merge) => existing.merge(service),
                _ => {
                    self.services.insert(name.clone(), service.clone());
                }
            }
        }

        for (name, check) in &other.checks {
            match (self.checks.get_mut(name), check.override_) {
                (Some(existing), Override::Merge) => existing.merge(check),
                _ => {
                    self.checks.insert(name.clone(), check.clone());
                }
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String, CharmError> {
        Ok(to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Active,
    Inactive,
    Error,
}

/// Runtime information about a service in the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub startup: Startup,
    pub current: ServiceStatus,
}

impl ServiceInfo {
    pub fn is_running(&self) -> bool {
        self.current == ServiceStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A command run through Pebble exited with a non-zero status
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
#[fail(
    display = "non-zero exit code {} executing {:?}, stdout='{}', stderr='{}'",
    exit_code, command, stdout, stderr
)]
pub struct ExecError {
    pub command: Vec<String>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A workload container managed by Pebble
///
/// Connection and API failures surface as `CharmError::PebbleError`. A command that runs but
/// exits non-zero surfaces as `CharmError::Exec`, so callers can inspect the exit code.
pub trait Container {
    fn name(&self) -> &str;

    fn can_connect(&self) -> bool;

    fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<(), CharmError>;

    fn plan(&self) -> Result<Plan, CharmError>;

    fn service(&self, name: &str) -> Result<ServiceInfo, CharmError>;

    fn start(&self, services: &[&str]) -> Result<(), CharmError>;

    fn stop(&self, services: &[&str]) -> Result<(), CharmError>;

    /// Bring running services in line with the current plan, restarting changed ones
    fn replan(&self) -> Result<(), CharmError>;

    fn push(&self, path: &str, content: &[u8], make_dirs: bool) -> Result<(), CharmError>;

    fn exists(&self, path: &str) -> Result<bool, CharmError>;

    fn exec(&self, command: &[&str]) -> Result<ExecOutput, CharmError>;
}
