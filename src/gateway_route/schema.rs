//! Records exchanged over the gateway-route interface

use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::{Deserialize, Serialize};
use url::Url;

use super::databag::{DataValidationError, DatabagModel};
use crate::model::RelationId;

lazy_static! {
    static ref DOMAIN: Regex = Regex::new(
        r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+(?:[a-zA-Z]{2,63}|xn--[a-zA-Z0-9-]{1,59})$"
    )
    .unwrap();
}

/// Check a hostname is a fully qualified domain
///
/// A single leading `*.` wildcard label is accepted. Bare top-level domains are not.
pub fn valid_fqdn(value: &str) -> Result<(), String> {
    let fqdn = if value.starts_with("*.") {
        &value[2..]
    } else {
        value
    };

    if fqdn.len() > 253 || !DOMAIN.is_match(fqdn) {
        return Err(format!("Invalid domain: {}", value));
    }

    Ok(())
}

/// What a requirer asks the gateway to route to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RequirerApplicationData {
    /// Hostname the service should be reachable under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// URL paths to route to this service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,

    /// The model the application is in
    pub model: String,

    /// The application requesting the route
    pub name: String,

    /// The port the service is listening on
    pub port: i64,
}

impl DatabagModel for RequirerApplicationData {
    const MODEL: &'static str = "RequirerApplicationData";
    const FIELDS: &'static [&'static str] = &["hostname", "paths", "model", "name", "port"];

    fn validate(&self) -> Result<(), DataValidationError> {
        let invalid = |field, reason| DataValidationError::Field {
            model: Self::MODEL,
            field,
            reason,
        };

        if let Some(hostname) = &self.hostname {
            valid_fqdn(hostname).map_err(|reason| invalid("hostname", reason))?;
        }
        if self.model.is_empty() {
            return Err(invalid("model", "must not be empty".into()));
        }
        if self.name.is_empty() {
            return Err(invalid("name", "must not be empty".into()));
        }
        if self.port < 1 || self.port > 65535 {
            return Err(invalid(
                "port",
                format!("{} is outside of 1-65535", self.port),
            ));
        }

        Ok(())
    }
}

/// The endpoints a gateway publishes back to the requirer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayRouteProviderAppData {
    pub endpoints: Vec<Url>,
}

impl DatabagModel for GatewayRouteProviderAppData {
    const MODEL: &'static str = "GatewayRouteProviderAppData";
    const FIELDS: &'static [&'static str] = &["endpoints"];

    fn validate(&self) -> Result<(), DataValidationError> {
        for endpoint in &self.endpoints {
            let http = endpoint.scheme() == "http" || endpoint.scheme() == "https";
            if !http || endpoint.host_str().is_none() {
                return Err(DataValidationError::Field {
                    model: Self::MODEL,
                    field: "endpoints",
                    reason: format!("{} is not an http(s) URL", endpoint),
                });
            }
        }
        Ok(())
    }
}

/// Validated requirer data, tagged with the relation it came from
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRouteRequirerData {
    pub relation_id: RelationId,
    pub application_data: RequirerApplicationData,
}
