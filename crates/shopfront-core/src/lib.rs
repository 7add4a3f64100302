//! Client core for the shopfront storefront and admin console.
//!
//! - `auth`: the persisted, observable session store and route gating
//! - `api`: the authenticated GraphQL transport with single-flight token refresh
//! - `config`: endpoint and storage configuration

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiError, GraphQLClient, GraphQLRequest, TransportConfig};
pub use auth::{Session, SessionStore, User};
pub use config::Config;
