//! Translate the config of the old machine charm into this charm's config layout

use std::collections::BTreeMap;

use serde_derive::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::error::CharmError;

/// Root key the migrated config is written under, so `juju config --file` picks it up
pub const APP_KEY: &str = "canonical-livepatch-server-k8s";

/// Old option name to new option name; `None` means the option no longer exists
const CONFIG_MAP: &[(&str, Option<&str>)] = &[
    ("auth_basic_users", Some("auth.basic.users")),
    ("auth_lp_teams", Some("auth.sso.teams")),
    ("auth_sso_location", Some("auth.sso.url")),
    ("auth_sso_public_key", Some("auth.sso.public-key")),
    ("burst_limit", Some("server.burst-limit")),
    ("concurrency_limit", Some("server.concurrency-limit")),
    ("log_level", Some("server.log-level")),
    ("url_template", Some("server.url-template")),
    ("dbconn_max_lifetime", Some("database.connection-lifetime-max")),
    ("dbconn_max", Some("database.connection-pool-max")),
    ("psql_dbname", None),
    ("psql_roles", None),
    ("patch_sync_enabled", Some("patch-sync.enabled")),
    ("sync_flavors", Some("patch-sync.flavors")),
    ("sync_interval", Some("patch-sync.interval")),
    ("sync_minimum_kernel_version", Some("patch-sync.minimum-kernel-version")),
    ("sync_architectures", Some("patch-sync.architectures")),
    ("sync_token", Some("patch-sync.token")),
    ("sync_upstream", Some("patch-sync.upstream-url")),
    ("sync_send_machine_reports", Some("patch-sync.send-machine-reports")),
    ("sync_identity", None),
    ("sync_tier", None),
    ("sync_upstream_tier", None),
    ("http_proxy", Some("patch-sync.proxy.http")),
    ("https_proxy", Some("patch-sync.proxy.https")),
    ("no_proxy", Some("patch-sync.proxy.no-proxy")),
    ("patchstore", Some("patch-storage.type")),
    ("storage_path", Some("patch-storage.filesystem-path")),
    ("s3_access_key_id", Some("patch-storage.s3-access-key")),
    ("s3_bucket", Some("patch-storage.s3-bucket")),
    ("s3_endpoint", Some("patch-storage.s3-endpoint")),
    ("s3_region", Some("patch-storage.s3-region")),
    ("s3_secret_key", Some("patch-storage.s3-secret-key")),
    ("s3_secure", Some("patch-storage.s3-secure")),
    ("swift_apikey", Some("patch-storage.swift-api-key")),
    ("swift_auth_url", Some("patch-storage.swift-auth-url")),
    ("swift_container_name", Some("patch-storage.swift-container")),
    ("swift_domain_name", Some("patch-storage.swift-domain")),
    ("swift_region_name", Some("patch-storage.swift-region")),
    ("swift_tenant_name", Some("patch-storage.swift-tenant")),
    ("swift_username", Some("patch-storage.swift-username")),
    ("patch_cache_on", Some("patch-cache.enabled")),
    ("patch_cache_size", Some("patch-cache.cache-size")),
    ("patch_cache_ttl", Some("patch-cache.cache-ttl")),
    ("blocklist_cache_refresh", Some("patch-blocklist.refresh-interval")),
    ("event_bus_brokers", Some("machine-reports.event-bus.brokers")),
    ("event_bus_ca_cert", Some("machine-reports.event-bus.ca-cert")),
    ("event_bus_client_cert", Some("machine-reports.event-bus.client-cert")),
    ("event_bus_client_key", Some("machine-reports.event-bus.client-key")),
    ("report_cleanup_interval", Some("machine-reports.database.cleanup-interval")),
    ("report_cleanup_row_limit", Some("machine-reports.database.cleanup-row-limit")),
    ("report_retention", Some("machine-reports.database.retention-days")),
    ("kpi_reports", Some("kpi-reports.interval")),
    ("contract_server_password", Some("contracts.password")),
    ("contract_server_url", Some("contracts.url")),
    ("contract_server_user", Some("contracts.user")),
    ("profiler_block_profile_rate", Some("profiler.block_profile_rate")),
    ("profiler_enabled", Some("profiler.enabled")),
    ("profiler_hostname", Some("profiler.hostname")),
    ("profiler_mutex_profile_fraction", Some("profiler.mutex_profile_fraction")),
    ("profiler_profile_allocations", Some("profiler.profile_allocations")),
    ("profiler_profile_blocks", Some("profiler.profile_blocks")),
    ("profiler_profile_goroutines", Some("profiler.profile_goroutines")),
    ("profiler_profile_inuse", Some("profiler.profile_inuse")),
    ("profiler_profile_mutexes", Some("profiler.profile_mutexes")),
    ("profiler_sample_rate", Some("profiler.sample_rate")),
    ("profiler_server_address", Some("profiler.server_address")),
    ("profiler_upload_rate", Some("profiler.upload_rate")),
    ("cloud_delay_default_delay_hours", None),
    ("is_cloud_delay_enabled", None),
];

/// Settings implied by an old option having any value
const IMPLIED: &[(&str, &str, Implied)] = &[
    ("auth_basic_users", "auth.basic.enabled", Implied::Bool(true)),
    ("auth_lp_teams", "auth.sso.enabled", Implied::Bool(true)),
    ("auth_sso_public_key", "auth.sso.enabled", Implied::Bool(true)),
    ("blocklist_cache_refresh", "patch-blocklist.enabled", Implied::Bool(true)),
    ("contract_server_password", "contracts.enabled", Implied::Bool(true)),
    ("contract_server_user", "contracts.enabled", Implied::Bool(true)),
    ("event_bus_brokers", "machine-reports.event-bus.enabled", Implied::Bool(true)),
    ("event_bus_ca_cert", "machine-reports.event-bus.enabled", Implied::Bool(true)),
    ("event_bus_client_cert", "machine-reports.event-bus.enabled", Implied::Bool(true)),
    ("event_bus_client_key", "machine-reports.event-bus.enabled", Implied::Bool(true)),
    ("filebacked", "patch-storage.type", Implied::Str("filesystem")),
    ("http_proxy", "patch-sync.proxy.enabled", Implied::Bool(true)),
    ("https_proxy", "patch-sync.proxy.enabled", Implied::Bool(true)),
    ("kpi_reports", "kpi-reports.enabled", Implied::Bool(true)),
    ("no_proxy", "patch-sync.proxy.enabled", Implied::Bool(true)),
    ("sync_architectures", "patch-sync.enabled", Implied::Bool(true)),
    ("sync_flavors", "patch-sync.enabled", Implied::Bool(true)),
    ("sync_interval", "patch-sync.enabled", Implied::Bool(true)),
    ("sync_minimum_kernel_version", "patch-sync.enabled", Implied::Bool(true)),
    ("sync_token", "patch-sync.enabled", Implied::Bool(true)),
    ("sync_upstream", "patch-sync.enabled", Implied::Bool(true)),
];

/// Values whose meaning changed: (new option, old value, new value)
const OVERRIDES: &[(&str, &str, &str)] = &[("patch-storage.type", "file", "filesystem")];

#[derive(Debug, Clone, Copy)]
enum Implied {
    Bool(bool),
    Str(&'static str),
}

impl From<Implied> for Value {
    fn from(implied: Implied) -> Self {
        match implied {
            Implied::Bool(b) => Value::Bool(b),
            Implied::Str(s) => Value::String(s.into()),
        }
    }
}

/// Outcome of a migration, in the shape the `emit-updated-config` action reports it
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationResult {
    /// YAML ready for `juju config --file`
    pub new_config: String,

    /// Old options that have no counterpart any more
    pub removed_keys: Vec<String>,

    /// Old options this charm does not know about
    pub unrecognized_keys: Vec<String>,
}

fn lookup<'a, T>(table: &'a [(&'static str, T)], key: &str) -> Option<&'a T> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
}

fn implied(key: &str) -> Option<(&'static str, Implied)> {
    IMPLIED
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, target, value)| (*target, *value))
}

fn has_value(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// The settings block of an exported config: `options`, or else `settings`
fn settings(config: &Mapping) -> Option<&Mapping> {
    ["options", "settings"]
        .iter()
        .filter_map(|key| config.get(&Value::String((*key).into())))
        .filter_map(Value::as_mapping)
        .find(|m| !m.is_empty())
}

/// Migrate a parsed `juju config` export of the old charm
pub fn migrate(config: &Mapping) -> Result<MigrationResult, CharmError> {
    let settings = settings(config).ok_or_else(|| {
        CharmError::ConfigMigration("No valid key for configuration found.".into())
    })?;

    let mut converted: BTreeMap<String, Value> = BTreeMap::new();
    let mut removed_keys = vec![];
    let mut unrecognized_keys = vec![];

    for (key, setting) in settings {
        let key = match key.as_str() {
            Some(key) => key,
            None => continue,
        };
        let value = setting
            .as_mapping()
            .and_then(|m| m.get(&Value::String("value".into())))
            .cloned()
            .unwrap_or(Value::Null);

        let implication = implied(key);
        if let Some((target, implied_value)) = implication {
            if has_value(&value) {
                converted.insert(target.into(), implied_value.into());
            }
        }

        match lookup(CONFIG_MAP, key) {
            Some(Some(target)) => match &value {
                Value::Null => {
                    return Err(CharmError::ConfigMigration(format!(
                        "{} doesn't have a set value for it",
                        key
                    )))
                }
                Value::String(s) if s.is_empty() => {
                    debug!(key, "Skipping empty value");
                }
                _ => {
                    converted.insert((*target).into(), value);
                }
            },
            Some(None) => removed_keys.push(key.to_string()),
            None if implication.is_some() => {}
            None => {
                warn!(key, "Unrecognized option");
                unrecognized_keys.push(key.to_string());
            }
        }
    }

    for (target, from, to) in OVERRIDES {
        if let Some(value) = converted.get_mut(*target) {
            if value.as_str() == Some(*from) {
                *value = Value::String((*to).into());
            }
        }
    }

    let mut root = BTreeMap::new();
    root.insert(APP_KEY.to_string(), converted);
    let yaml = serde_yaml::to_string(&root)?;

    Ok(MigrationResult {
        new_config: yaml.trim_start_matches("---").trim().to_string(),
        removed_keys,
        unrecognized_keys,
    })
}

/// Parse exported config YAML, which must be a mapping
pub fn parse(content: &str) -> Result<Mapping, CharmError> {
    let parsed: Value = serde_yaml::from_str(content).map_err(|_| invalid_format(content))?;
    match parsed {
        Value::Mapping(config) => Ok(config),
        _ => Err(invalid_format(content)),
    }
}

/// Migrate an exported config given as YAML text
pub fn migrate_str(content: &str) -> Result<MigrationResult, CharmError> {
    migrate(&parse(content)?)
}

fn invalid_format(content: &str) -> CharmError {
    CharmError::ConfigMigration(format!(
        "invalid config file format. Got content {}",
        content
    ))
}
