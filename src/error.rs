//! Errors for the livepatch charm

use std::io::Error as IOError;

use base64::DecodeError;
use ex::io::Error as ExIOError;
use failure::Fail;
use reqwest::Error as ReqwestError;
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;

use crate::gateway_route::{DataValidationError, InvalidRelationDataError};
use crate::pebble::ExecError;

#[derive(Debug, Fail)]
pub enum CharmError {
    #[fail(display = "I/O error: {}", _0)]
    IOError(#[fail(cause)] IOError),

    #[fail(display = "I/O error: {}", _0)]
    ExIOError(#[fail(cause)] ExIOError),

    #[fail(display = "YAML Error: {}", _0)]
    YamlError(#[fail(cause)] YamlError),

    #[fail(display = "JSON Error: {}", _0)]
    JsonError(#[fail(cause)] JsonError),

    #[fail(display = "Error while talking to network: {}", _0)]
    NetworkError(#[fail(cause)] ReqwestError),

    #[fail(display = "{}", _0)]
    DataValidation(#[fail(cause)] DataValidationError),

    #[fail(display = "{}", _0)]
    InvalidRelationData(#[fail(cause)] InvalidRelationDataError),

    #[fail(display = "Cannot write application data for relation {}: unit is not the leader", _0)]
    NotLeader(u32),

    #[fail(display = "Relation {} not found", _0)]
    RelationNotFound(u32),

    #[fail(display = "Endpoint `{}` is not declared in metadata.yaml", _0)]
    UnknownEndpoint(String),

    #[fail(display = "Container `{}` not found", _0)]
    ContainerNotFound(String),

    #[fail(display = "State is not ready: peer relation `{}` not established", _0)]
    StateNotReady(String),

    #[fail(display = "Pebble API error: {}", _0)]
    PebbleError(String),

    #[fail(display = "{}", _0)]
    Exec(#[fail(cause)] ExecError),

    #[fail(display = "{} not found", _0)]
    FileNotFound(String),

    #[fail(
        display = "Integration with both database relations is not allowed; `{}` is already activated.",
        _0
    )]
    BothDatabaseRelations(String),

    #[fail(display = "Invalid database connection string: {}", _0)]
    InvalidConnectionString(String),

    #[fail(display = "Invalid contracts CA certificate: {}", _0)]
    InvalidCertificate(#[fail(cause)] DecodeError),

    #[fail(display = "Contracts server returned no {}", _0)]
    MissingToken(&'static str),

    #[fail(display = "{}", _0)]
    ConfigMigration(String),
}

impl From<IOError> for CharmError {
    fn from(err: IOError) -> Self {
        CharmError::IOError(err)
    }
}

impl From<ExIOError> for CharmError {
    fn from(err: ExIOError) -> Self {
        CharmError::ExIOError(err)
    }
}

impl From<YamlError> for CharmError {
    fn from(err: YamlError) -> Self {
        CharmError::YamlError(err)
    }
}

impl From<JsonError> for CharmError {
    fn from(err: JsonError) -> Self {
        CharmError::JsonError(err)
    }
}

impl From<ReqwestError> for CharmError {
    fn from(err: ReqwestError) -> Self {
        CharmError::NetworkError(err)
    }
}

impl From<DataValidationError> for CharmError {
    fn from(err: DataValidationError) -> Self {
        CharmError::DataValidation(err)
    }
}

impl From<InvalidRelationDataError> for CharmError {
    fn from(err: InvalidRelationDataError) -> Self {
        CharmError::InvalidRelationData(err)
    }
}

impl From<ExecError> for CharmError {
    fn from(err: ExecError) -> Self {
        CharmError::Exec(err)
    }
}

impl From<DecodeError> for CharmError {
    fn from(err: DecodeError) -> Self {
        CharmError::InvalidCertificate(err)
    }
}

impl From<CharmError> for String {
    fn from(err: CharmError) -> Self {
        format!("{}", err)
    }
}
