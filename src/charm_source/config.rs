use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::config::{ConfigData, ConfigValue};

/// Config option as defined in config.yaml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, tag = "type", rename_all = "kebab-case")]
pub enum ConfigOption {
    /// String config option
    #[serde(rename_all = "kebab-case")]
    String {
        default: Option<String>,
        description: String,
    },

    /// Integer config option
    #[serde(rename = "int", rename_all = "kebab-case")]
    Integer {
        default: Option<i64>,
        description: String,
    },

    /// Floating point config option
    #[serde(rename_all = "kebab-case")]
    Float {
        default: Option<f64>,
        description: String,
    },

    /// Boolean config option
    #[serde(rename_all = "kebab-case")]
    Boolean {
        default: Option<bool>,
        description: String,
    },
}

impl ConfigOption {
    /// The value a freshly deployed unit sees for this option
    pub fn default_value(&self) -> Option<ConfigValue> {
        match self {
            ConfigOption::String { default, .. } => default.clone().map(ConfigValue::String),
            ConfigOption::Integer { default, .. } => default.map(ConfigValue::Int),
            ConfigOption::Float { default, .. } => default.map(ConfigValue::Float),
            ConfigOption::Boolean { default, .. } => default.map(ConfigValue::Bool),
        }
    }
}

/// A charm's config.yaml file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    pub options: BTreeMap<String, ConfigOption>,
}

impl Config {
    /// Config as it looks before the operator sets anything
    ///
    /// Options without a default are left out, the same way the host leaves them unset.
    pub fn defaults(&self) -> ConfigData {
        self.options
            .iter()
            .filter_map(|(name, option)| option.default_value().map(|v| (name.clone(), v)))
            .collect()
    }
}
