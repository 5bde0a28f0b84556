//! Application-scoped state kept in the peer relation's application databag

use tracing::debug;

use crate::error::CharmError;
use crate::model::{Model, Relation};

pub const PEER_RELATION: &str = "livepatch";

const DSN: &str = "dsn";
const RESOURCE_TOKEN: &str = "resource_token";

/// Handle on the peer-backed state store
///
/// Reads go to the host every time, so a value written by the leader shows up on other units on
/// their next event. Only the leader may write.
pub struct State<'a, M: Model + ?Sized> {
    model: &'a M,
}

impl<'a, M: Model + ?Sized> State<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    fn relation(&self) -> Option<Relation> {
        self.model.relation(PEER_RELATION)
    }

    /// The peer relation exists, so the store can be read and written
    pub fn is_ready(&self) -> bool {
        self.relation().is_some()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.relation()
            .and_then(|r| r.local_app_data.get(key).cloned())
            .filter(|v| !v.is_empty())
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<(), CharmError> {
        let relation = self
            .relation()
            .ok_or_else(|| CharmError::StateNotReady(PEER_RELATION.into()))?;

        let mut data = relation.local_app_data.clone();
        match value {
            Some(v) => data.insert(key.into(), v.into()),
            None => data.remove(key),
        };

        debug!(key, set = value.is_some(), "Updating peer state");
        self.model.update_app_data(relation.id, data)
    }

    /// Connection string of the workload database
    pub fn dsn(&self) -> Option<String> {
        self.get(DSN)
    }

    pub fn set_dsn(&self, dsn: Option<&str>) -> Result<(), CharmError> {
        self.set(DSN, dsn)
    }

    /// Patch-sync token obtained from the contracts server
    pub fn resource_token(&self) -> Option<String> {
        self.get(RESOURCE_TOKEN)
    }

    pub fn set_resource_token(&self, token: Option<&str>) -> Result<(), CharmError> {
        self.set(RESOURCE_TOKEN, token)
    }
}
