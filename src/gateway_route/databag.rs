//! Codec between typed records and the flat string-keyed relation databag
//!
//! Every value in the databag is a JSON document. Only keys naming a declared field are read, and
//! only fields that differ from their default are written.

use failure::Fail;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

use crate::model::Databag;

/// Databag contents could not be turned into a valid record
#[derive(Debug, Fail)]
pub enum DataValidationError {
    #[fail(display = "invalid databag contents: expecting json. {:?}", _0)]
    Malformed(Databag),

    #[fail(display = "failed to validate {}.{}: {}", model, field, reason)]
    Field {
        model: &'static str,
        field: &'static str,
        reason: String,
    },

    #[fail(display = "failed to validate {}: {}", model, reason)]
    Model { model: &'static str, reason: String },
}

/// A record that travels through a relation databag
///
/// Implementors derive `Serialize`/`Deserialize` with `skip_serializing_if` on every defaulted
/// field, so that serialization already leaves defaults out.
pub trait DatabagModel: Serialize + DeserializeOwned + Sized {
    /// Name used in validation errors
    const MODEL: &'static str;

    /// Databag keys this record reads
    const FIELDS: &'static [&'static str];

    /// If set, the whole record is stored as one JSON document under this key
    const NEST_UNDER: Option<&'static str> = None;

    /// Field-level checks that go beyond the type
    fn validate(&self) -> Result<(), DataValidationError> {
        Ok(())
    }

    /// Parse and validate a record from already-decoded JSON
    fn from_value(value: Value) -> Result<Self, DataValidationError> {
        let record: Self = serde_json::from_value(value).map_err(|e| DataValidationError::Model {
            model: Self::MODEL,
            reason: e.to_string(),
        })?;
        record.validate()?;
        Ok(record)
    }

    /// Read a record out of a databag, ignoring keys it does not declare
    fn load(databag: &Databag) -> Result<Self, DataValidationError> {
        if let Some(key) = Self::NEST_UNDER {
            let raw = databag.get(key).ok_or_else(|| DataValidationError::Model {
                model: Self::MODEL,
                reason: format!("missing `{}`", key),
            })?;
            let value = serde_json::from_str(raw)
                .map_err(|_| DataValidationError::Malformed(databag.clone()))?;
            return Self::from_value(value);
        }

        let mut fields = Map::new();
        for (key, raw) in databag {
            if !Self::FIELDS.contains(&key.as_str()) {
                continue;
            }
            match serde_json::from_str(raw) {
                Ok(value) => {
                    fields.insert(key.clone(), value);
                }
                Err(_) => {
                    let err = DataValidationError::Malformed(databag.clone());
                    error!("{}", err);
                    return Err(err);
                }
            }
        }

        Self::from_value(Value::Object(fields)).map_err(|err| {
            error!(model = Self::MODEL, "{}", err);
            err
        })
    }

    /// Write this record into a databag
    ///
    /// With `clear`, every existing key is dropped first so nothing from an earlier shape of the
    /// data lingers.
    fn dump(&self, databag: &mut Databag, clear: bool) -> Result<(), DataValidationError> {
        if clear {
            databag.clear();
        }

        let value = serde_json::to_value(self).map_err(|e| DataValidationError::Model {
            model: Self::MODEL,
            reason: e.to_string(),
        })?;

        if let Some(key) = Self::NEST_UNDER {
            databag.insert(key.to_string(), value.to_string());
            return Ok(());
        }

        if let Value::Object(fields) = value {
            for (key, value) in fields {
                databag.insert(key, value.to_string());
            }
        }

        Ok(())
    }
}
