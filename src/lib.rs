//! flowprobe: query recorded HTTP traffic and look for bot protection.
//!
//! Captures (HAR or JSON Lines) are loaded once per session by the
//! [`store::FlowStore`]; [`query::QueryService`] answers the four queries on
//! top of it, either from the CLI or through the stdio [`server`].

pub mod capture;
pub mod config;
pub mod content;
pub mod error;
pub mod json_utils;
pub mod models;
pub mod output;
pub mod protection;
pub mod query;
pub mod server;
pub mod store;

pub use error::{CaptureError, QueryError};
pub use models::{Flow, FlowKind, Headers, Request, Response};
pub use query::{QueryService, QuerySettings};
pub use store::FlowStore;
