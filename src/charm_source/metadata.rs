use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::model::RelationRole;

/// Scope of a given relation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub enum RelationScope {
    Global,
    Container,
}

impl Default for RelationScope {
    fn default() -> Self {
        Self::Global
    }
}

/// A relation endpoint declared by the charm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RelationSpec {
    /// The interface this endpoint speaks, e.g. `postgresql_client`
    pub interface: String,

    /// Maximum number of supported connections to this relation endpoint
    pub limit: Option<u32>,

    /// Informational only
    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub scope: RelationScope,
}

/// A storage mount inside a workload container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ContainerMount {
    pub storage: String,
    pub location: String,
}

/// A workload container run as a sidecar to the charm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ContainerSpec {
    /// The oci-image resource the container is created from
    pub resource: String,

    #[serde(default)]
    pub mounts: Vec<ContainerMount>,
}

/// A resource attached to the charm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ResourceSpec {
    #[serde(rename_all = "kebab-case")]
    OciImage {
        description: Option<String>,
        upstream_source: Option<String>,
    },

    #[serde(rename_all = "kebab-case")]
    File {
        description: Option<String>,
        filename: String,
    },
}

/// A charm's metadata.yaml file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Metadata {
    /// The name of the charm
    pub name: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// A short, one-line description of the charm
    pub summary: String,

    pub description: String,

    #[serde(default)]
    pub assumes: Vec<String>,

    /// Sidecar containers, keyed by the name Pebble knows them by
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerSpec>,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,

    #[serde(default)]
    pub provides: BTreeMap<String, RelationSpec>,

    #[serde(default)]
    pub requires: BTreeMap<String, RelationSpec>,

    #[serde(default)]
    pub peers: BTreeMap<String, RelationSpec>,
}

impl Metadata {
    /// Which side of the named endpoint this charm is on
    pub fn relation_role(&self, name: &str) -> Option<RelationRole> {
        if self.provides.contains_key(name) {
            Some(RelationRole::Provider)
        } else if self.requires.contains_key(name) {
            Some(RelationRole::Requirer)
        } else if self.peers.contains_key(name) {
            Some(RelationRole::Peer)
        } else {
            None
        }
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.provides
            .get(name)
            .or_else(|| self.requires.get(name))
            .or_else(|| self.peers.get(name))
    }
}
