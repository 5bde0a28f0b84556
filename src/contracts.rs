//! Client for the contracts server that hands out patch-sync resource tokens

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use ex::fs::read_to_string;
use reqwest::{Certificate, Client, Proxy};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CharmError;

pub const DEFAULT_CONTRACTS_URL: &str = "https://contracts.canonical.com";
pub const RESOURCE_NAME: &str = "livepatch-onprem";
const MACHINE_ID: &str = "livepatch-onprem";
const TIMEOUT: Duration = Duration::from_secs(60);

/// Proxy settings, taken from the `JUJU_CHARM_*` environment of the unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub no_proxy: Vec<String>,
}

impl ProxySettings {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            http: var("JUJU_CHARM_HTTP_PROXY"),
            https: var("JUJU_CHARM_HTTPS_PROXY"),
            no_proxy: var("JUJU_CHARM_NO_PROXY")
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_string())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Whether requests to `host` should skip the proxy
    pub fn bypasses(&self, host: &str) -> bool {
        self.no_proxy.iter().any(|entry| {
            let entry = entry.trim_start_matches('.');
            entry == "*" || host == entry || host.ends_with(&format!(".{}", entry))
        })
    }
}

/// Where and how to reach the contracts server
#[derive(Debug, Clone, PartialEq)]
pub struct ContractsEndpoint {
    pub url: String,
    pub proxies: ProxySettings,

    /// Extra PEM root certificate to trust
    pub ca_certificate: Option<Vec<u8>>,
}

impl ContractsEndpoint {
    pub fn new<S: Into<String>>(url: S) -> Self {
        let url = url.into();
        Self {
            url: if url.is_empty() {
                DEFAULT_CONTRACTS_URL.into()
            } else {
                url.trim_end_matches('/').into()
            },
            proxies: ProxySettings::default(),
            ca_certificate: None,
        }
    }

    pub fn machine_token_url(&self) -> String {
        format!("{}/v1/context/machines/token", self.url)
    }

    pub fn resource_token_url(&self) -> String {
        format!(
            "{}/v1/resources/{}/context/machines/{}",
            self.url, RESOURCE_NAME, MACHINE_ID
        )
    }
}

/// Talks to the contracts server
pub trait ContractsClient {
    /// Exchange a contract token for a machine token
    fn machine_token(
        &self,
        endpoint: &ContractsEndpoint,
        contract_token: &str,
    ) -> Result<String, CharmError>;

    /// Exchange a machine token for the livepatch-onprem resource token
    fn resource_token(
        &self,
        endpoint: &ContractsEndpoint,
        machine_token: &str,
    ) -> Result<String, CharmError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct OsInfo {
    distribution: String,
    kernel: String,
    release: String,
    series: String,
    #[serde(rename = "type")]
    type_: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct MachineTokenRequest {
    architecture: String,
    host_type: String,
    machine_id: String,
    os: OsInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineTokenResponse {
    #[serde(default)]
    machine_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceTokenResponse {
    #[serde(default)]
    resource_token: String,
}

/// Parse `/etc/os-release` style `KEY=value` lines, keys lowercased
pub fn parse_os_release(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(2, '=');
            let key = parts.next()?.trim();
            let value = parts.next()?.trim().trim_matches('"');
            if key.is_empty() || key.starts_with('#') {
                return None;
            }
            Some((key.to_lowercase(), value.to_string()))
        })
        .collect()
}

fn machine_token_request() -> Result<MachineTokenRequest, CharmError> {
    let os_release = parse_os_release(&read_to_string("/etc/os-release")?);
    let kernel = read_to_string("/proc/sys/kernel/osrelease")
        .map(|k| k.trim().to_string())
        .unwrap_or_default();
    let get = |key: &str| os_release.get(key).cloned().unwrap_or_default();

    Ok(MachineTokenRequest {
        architecture: env::consts::ARCH.into(),
        host_type: "container".into(),
        machine_id: MACHINE_ID.into(),
        os: OsInfo {
            distribution: get("version"),
            kernel,
            release: get("version_id"),
            series: get("version_codename"),
            type_: "Linux".into(),
        },
    })
}

/// `ContractsClient` over HTTPS
#[derive(Debug, Clone, Default)]
pub struct HttpContractsClient;

impl HttpContractsClient {
    fn client(&self, endpoint: &ContractsEndpoint) -> Result<Client, CharmError> {
        let mut builder = Client::builder().timeout(TIMEOUT);

        let host = url::Url::parse(&endpoint.url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_default();

        if !endpoint.proxies.bypasses(&host) {
            if let Some(proxy) = &endpoint.proxies.http {
                builder = builder.proxy(Proxy::http(proxy.as_str())?);
            }
            if let Some(proxy) = &endpoint.proxies.https {
                builder = builder.proxy(Proxy::https(proxy.as_str())?);
            }
        }

        if let Some(pem) = &endpoint.ca_certificate {
            builder = builder.add_root_certificate(Certificate::from_pem(pem)?);
        }

        Ok(builder.build()?)
    }
}

impl ContractsClient for HttpContractsClient {
    fn machine_token(
        &self,
        endpoint: &ContractsEndpoint,
        contract_token: &str,
    ) -> Result<String, CharmError> {
        let url = endpoint.machine_token_url();
        info!(url = %url, "Requesting machine token");

        let response: MachineTokenResponse = self
            .client(endpoint)?
            .post(&url)
            .bearer_auth(contract_token)
            .json(&machine_token_request()?)
            .send()?
            .error_for_status()?
            .json()?;

        if response.machine_token.is_empty() {
            return Err(CharmError::MissingToken("machine token"));
        }
        Ok(response.machine_token)
    }

    fn resource_token(
        &self,
        endpoint: &ContractsEndpoint,
        machine_token: &str,
    ) -> Result<String, CharmError> {
        let url = endpoint.resource_token_url();
        info!(url = %url, "Requesting resource token");

        let response: ResourceTokenResponse = self
            .client(endpoint)?
            .get(&url)
            .bearer_auth(machine_token)
            .send()?
            .error_for_status()?
            .json()?;

        debug!(empty = response.resource_token.is_empty(), "Resource token response");
        if response.resource_token.is_empty() {
            return Err(CharmError::MissingToken("resource token"));
        }
        Ok(response.resource_token)
    }
}
