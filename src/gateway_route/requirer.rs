use tracing::{debug, error, warn};
use url::Url;

use super::databag::{DataValidationError, DatabagModel};
use super::events::{RelationPhase, RequirerEvent};
use super::schema::{GatewayRouteProviderAppData, RequirerApplicationData};
use crate::error::CharmError;
use crate::model::{Model, Relation, RelationEvent, RelationEventKind};

/// What this application wants routed, as far as it is known
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteRequest {
    pub name: Option<String>,
    pub model: Option<String>,
    pub port: Option<i64>,
    pub hostname: Option<String>,
    pub paths: Vec<String>,
}

impl RouteRequest {
    /// Whether there is enough to publish without the provider rejecting it
    pub fn is_complete(&self) -> bool {
        self.hostname.as_ref().map(|h| !h.is_empty()).unwrap_or(false) && self.port.is_some()
    }

    fn to_application_data(&self) -> Result<RequirerApplicationData, DataValidationError> {
        let required = |field: &'static str, value: &Option<String>| {
            value.clone().ok_or(DataValidationError::Field {
                model: RequirerApplicationData::MODEL,
                field,
                reason: "field required".into(),
            })
        };

        let data = RequirerApplicationData {
            hostname: self.hostname.clone(),
            paths: self.paths.clone(),
            model: required("model", &self.model)?,
            name: required("name", &self.name)?,
            port: self.port.unwrap_or_default(),
        };
        data.validate()?;
        Ok(data)
    }
}

/// The side of a gateway-route relation that asks to be routed to
#[derive(Debug, Clone)]
pub struct GatewayRouteRequirer {
    relation_name: String,
    request: RouteRequest,
}

impl GatewayRouteRequirer {
    /// Bind to an endpoint without publishing anything yet
    pub fn new<S: Into<String>>(relation_name: S) -> Self {
        Self {
            relation_name: relation_name.into(),
            request: RouteRequest::default(),
        }
    }

    /// Bind to an endpoint and publish the given requirements straight away
    pub fn with_requirements<M: Model + ?Sized, S: Into<String>>(
        model: &M,
        relation_name: S,
        request: RouteRequest,
    ) -> Result<Self, CharmError> {
        let mut requirer = Self::new(relation_name);
        requirer.provide_gateway_route_requirements(model, request)?;
        Ok(requirer)
    }

    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    pub fn request(&self) -> &RouteRequest {
        &self.request
    }

    pub fn relation<M: Model + ?Sized>(&self, model: &M) -> Option<Relation> {
        model.relation(&self.relation_name)
    }

    /// Replace the requirements and publish them
    pub fn provide_gateway_route_requirements<M: Model + ?Sized>(
        &mut self,
        model: &M,
        request: RouteRequest,
    ) -> Result<(), CharmError> {
        self.request = request;
        self.update_relation_data(model)
    }

    /// Publish the current requirements into our application databag
    ///
    /// Does nothing until both a hostname and a port are known, and on units that are not the
    /// leader.
    pub fn update_relation_data<M: Model + ?Sized>(&self, model: &M) -> Result<(), CharmError> {
        if !self.request.is_complete() {
            warn!("Required field(s) are missing, skipping update of the relation data.");
            return Ok(());
        }

        let relation = match self.relation(model) {
            Some(relation) => relation,
            None => return Ok(()),
        };

        if !model.is_leader() {
            debug!(relation_id = relation.id, "Not the leader, leaving route data alone");
            return Ok(());
        }

        let data = self.request.to_application_data().map_err(|err| {
            error!("Validation error when preparing requirer application data.");
            err
        })?;

        let mut databag = relation.local_app_data.clone();
        data.dump(&mut databag, true)?;
        if databag != relation.local_app_data {
            model.update_app_data(relation.id, databag)?;
        }

        Ok(())
    }

    /// Endpoints the provider has published
    ///
    /// Empty when the relation is missing, the provider has not published yet, or what it
    /// published is invalid.
    pub fn get_routed_endpoints<M: Model + ?Sized>(&self, model: &M) -> Vec<Url> {
        let relation = match self.relation(model) {
            Some(relation) => relation,
            None => return vec![],
        };

        if relation.app.is_none() || relation.remote_app_data.is_empty() {
            return vec![];
        }

        match GatewayRouteProviderAppData::load(&relation.remote_app_data) {
            Ok(data) => data.endpoints,
            Err(err) => {
                error!("Invalid provider url: {}", err);
                vec![]
            }
        }
    }

    /// React to a relation signal on this endpoint
    pub fn handle<M: Model + ?Sized>(
        &self,
        model: &M,
        event: &RelationEvent,
    ) -> Result<Vec<RequirerEvent>, CharmError> {
        if event.relation_name != self.relation_name {
            return Ok(vec![]);
        }

        match RelationPhase::after(event.kind) {
            Some(RelationPhase::Broken) if event.kind == RelationEventKind::Broken => {
                Ok(vec![RequirerEvent::Removed])
            }
            Some(phase) if phase.validates() => {
                self.update_relation_data(model)?;
                if !self.get_routed_endpoints(model).is_empty() {
                    Ok(vec![RequirerEvent::Ready])
                } else {
                    Ok(vec![])
                }
            }
            _ => Ok(vec![]),
        }
    }
}
