//! The charm's own declarations: metadata.yaml and config.yaml

pub mod config;
pub mod metadata;

pub use config::{Config, ConfigOption};
pub use metadata::{ContainerSpec, Metadata, RelationScope, RelationSpec, ResourceSpec};

use std::path::PathBuf;

use ex::fs::read;
use serde_derive::{Deserialize, Serialize};
use serde_yaml::from_slice;

use crate::config::ConfigData;
use crate::error::CharmError;

/// A charm, as represented by the source directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CharmSource {
    /// The path to the charm's source code
    source: PathBuf,

    /// The charm's config.yaml file
    pub config: Option<Config>,

    /// The charm's metadata.yaml file
    pub metadata: Metadata,
}

impl CharmSource {
    /// Load a charm from its source directory
    pub fn load<P: Into<PathBuf>>(source: P) -> Result<Self, CharmError> {
        let source = source.into();
        let config: Option<Config> = read(source.join("config.yaml"))
            .map(|bytes| from_slice(&bytes))
            .unwrap_or(Ok(None))?;
        let metadata = from_slice(&read(source.join("metadata.yaml"))?)?;

        Ok(Self {
            source,
            config,
            metadata,
        })
    }

    /// Build from already-read metadata.yaml and config.yaml contents
    pub fn from_bytes(metadata: &[u8], config: Option<&[u8]>) -> Result<Self, CharmError> {
        let config = match config {
            Some(bytes) => Some(from_slice(bytes)?),
            None => None,
        };

        Ok(Self {
            source: PathBuf::new(),
            config,
            metadata: from_slice(metadata)?,
        })
    }

    /// The livepatch charm's own declarations, as shipped with this crate
    pub fn livepatch() -> Result<Self, CharmError> {
        Self::from_bytes(
            include_bytes!("../../metadata.yaml"),
            Some(&include_bytes!("../../config.yaml")[..]),
        )
    }

    pub fn source(&self) -> &PathBuf {
        &self.source
    }

    /// Default values of every option with a default
    pub fn config_defaults(&self) -> ConfigData {
        self.config
            .as_ref()
            .map(Config::defaults)
            .unwrap_or_default()
    }
}
