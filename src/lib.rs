//! Charm logic for running a Livepatch server under Pebble
//!
//! The host runtime is reached through `model::Model` and the workload containers through
//! `pebble::Container`; `charm::LivepatchCharm` turns events into a Pebble plan and a unit status.

pub mod charm;
pub mod charm_source;
pub mod config;
pub mod config_migration;
pub mod contracts;
pub mod database;
pub mod error;
pub mod gateway_route;
pub mod model;
pub mod pebble;
pub mod state;
pub mod testing;
