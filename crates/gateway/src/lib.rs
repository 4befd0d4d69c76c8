//! HTTP surface for the relay: dispatch, response polling, artifact
//! downloads, the command catalog and the static frontend.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use {
    server::{build_app, start_gateway},
    state::{GatewayState, build_engine, relay_settings},
};
