use tracing::{error, info};
use url::Url;

use super::databag::DatabagModel;
use super::events::{ProviderEvent, RelationPhase};
use super::schema::{GatewayRouteProviderAppData, GatewayRouteRequirerData, RequirerApplicationData};
use super::{InvalidRelationDataError, GATEWAY_ROUTE_RELATION_NAME};
use crate::error::CharmError;
use crate::model::{Model, Relation, RelationEvent};

/// The routing side of a gateway-route relation
#[derive(Debug, Clone)]
pub struct GatewayRouteProvider {
    relation_name: String,
    raise_on_validation_error: bool,
}

impl Default for GatewayRouteProvider {
    fn default() -> Self {
        Self::new(GATEWAY_ROUTE_RELATION_NAME)
    }
}

impl GatewayRouteProvider {
    pub fn new<S: Into<String>>(relation_name: S) -> Self {
        Self {
            relation_name: relation_name.into(),
            raise_on_validation_error: false,
        }
    }

    /// Surface invalid requirer data as `InvalidRelationDataError` instead of logging it
    pub fn strict(mut self) -> Self {
        self.raise_on_validation_error = true;
        self
    }

    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    pub fn relation<M: Model + ?Sized>(&self, model: &M) -> Option<Relation> {
        model.relation(&self.relation_name)
    }

    /// React to a relation signal on this endpoint
    pub fn handle<M: Model + ?Sized>(
        &self,
        model: &M,
        event: &RelationEvent,
    ) -> Result<Vec<ProviderEvent>, CharmError> {
        if event.relation_name != self.relation_name {
            return Ok(vec![]);
        }

        match RelationPhase::after(event.kind) {
            Some(RelationPhase::Broken) => Ok(vec![ProviderEvent::DataRemoved]),
            Some(phase) if phase.validates() => match self.relation(model) {
                Some(relation) => {
                    self.get_data(&relation)?;
                    Ok(vec![ProviderEvent::DataAvailable])
                }
                None => Ok(vec![]),
            },
            _ => Ok(vec![]),
        }
    }

    /// Validated requirer data, or `None` if there is none or it is invalid in lenient mode
    pub fn get_data(
        &self,
        relation: &Relation,
    ) -> Result<Option<GatewayRouteRequirerData>, InvalidRelationDataError> {
        match RequirerApplicationData::load(&relation.remote_app_data) {
            Ok(application_data) => Ok(Some(GatewayRouteRequirerData {
                relation_id: relation.id,
                application_data,
            })),
            Err(err) => {
                error!(
                    app = relation.app.as_ref().map(String::as_str).unwrap_or(""),
                    "Invalid requirer application data"
                );
                if self.raise_on_validation_error {
                    error!(
                        relation_id = relation.id,
                        "gateway-route data validation failed: {}", err
                    );
                    return Err(InvalidRelationDataError {
                        relation_id: relation.id,
                        cause: err,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Publish the proxied endpoints to the requirer, replacing what was there
    pub fn publish_endpoints<M: Model + ?Sized>(
        &self,
        model: &M,
        endpoints: &[Url],
        relation: &Relation,
    ) -> Result<(), CharmError> {
        let data = GatewayRouteProviderAppData {
            endpoints: endpoints.to_vec(),
        };
        let mut databag = relation.local_app_data.clone();
        data.dump(&mut databag, true)?;
        info!(relation_id = relation.id, count = endpoints.len(), "Publishing endpoints");
        model.update_app_data(relation.id, databag)
    }
}
