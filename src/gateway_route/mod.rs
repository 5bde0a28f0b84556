//! The gateway-route relation interface
//!
//! A requirer publishes where it listens (`RequirerApplicationData`) and a provider, typically a
//! gateway, publishes back the URLs it routes to it (`GatewayRouteProviderAppData`). Both sides
//! read the other's application databag fresh on every event and never cache it.

pub mod databag;
pub mod events;
pub mod provider;
pub mod requirer;
pub mod schema;

pub use databag::{DataValidationError, DatabagModel};
pub use events::{ProviderEvent, RelationPhase, RequirerEvent};
pub use provider::GatewayRouteProvider;
pub use requirer::{GatewayRouteRequirer, RouteRequest};
pub use schema::{
    valid_fqdn, GatewayRouteProviderAppData, GatewayRouteRequirerData, RequirerApplicationData,
};

use failure::Fail;

use crate::model::RelationId;

pub const GATEWAY_ROUTE_RELATION_NAME: &str = "gateway-route";

/// Requirer data failed validation and the provider was asked to be strict about it
#[derive(Debug, Fail)]
#[fail(
    display = "gateway-route data validation failed for relation: {}",
    relation_id
)]
pub struct InvalidRelationDataError {
    pub relation_id: RelationId,

    #[fail(cause)]
    pub cause: DataValidationError,
}
