//! Fake OpenProject API for integration testing
//!
//! An in-process HTTP server that speaks enough of the OpenProject API v3
//! (HAL+JSON) to drive a `Backend` end-to-end:
//!
//! TCP -> one HTTP/1.1 request -> API key check -> handler -> response -> close
//!
//! ## Module layout
//!
//! - `server` -- TCP listener and request dispatch
//! - `handlers/` -- one file per endpoint family (users, projects, ...)
//! - `state` -- test data model (users, projects, work packages, builder)
//! - `http` -- minimal request parsing and response writing

mod handlers;
mod http;
pub mod state;
mod server;

pub use server::FakeApiServer;
pub use state::ApiStateBuilder;
