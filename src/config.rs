//! Typed view over the charm's runtime config values

use std::collections::BTreeMap;
use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// A single config value as delivered by the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    /// Python-style truthiness, used where a setting just needs to be "on"
    pub fn is_truthy(&self) -> bool {
        match self {
            ConfigValue::Bool(b) => *b,
            ConfigValue::Int(i) => *i != 0,
            ConfigValue::Float(f) => *f != 0.0,
            ConfigValue::String(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.into())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

pub type ConfigData = BTreeMap<String, ConfigValue>;

/// A non-empty string option
pub fn get_str<'a>(config: &'a ConfigData, key: &str) -> Option<&'a str> {
    match config.get(key) {
        Some(ConfigValue::String(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// An option that is set and truthy
pub fn get_bool(config: &ConfigData, key: &str) -> bool {
    config.get(key).map(ConfigValue::is_truthy).unwrap_or(false)
}

/// Workload environment variable name for a config option
///
/// `patch-sync.token` becomes `LP_PATCH_SYNC_TOKEN`.
pub fn env_var_name(option: &str) -> String {
    format!("LP_{}", option.replace('-', "_").replace('.', "_").to_uppercase())
}

/// Map every config option to the workload's `LP_*` environment variable
pub fn to_env_vars(config: &ConfigData) -> BTreeMap<String, String> {
    config
        .iter()
        .map(|(k, v)| (env_var_name(k), v.to_string()))
        .collect()
}
