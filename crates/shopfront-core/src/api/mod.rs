//! GraphQL API client module for the shopfront backend.
//!
//! This module provides the `GraphQLClient`, the authenticated transport every
//! storefront and admin operation goes through, plus the account operations
//! (login, registration, current user, logout) that feed the session store.
//!
//! The API uses short-lived bearer access tokens. Expired tokens are replaced
//! through a single coordinated `refreshToken` exchange per failure episode.

pub mod client;
pub mod error;
pub mod graphql;
pub mod operations;
pub mod refresh;

pub use client::{GraphQLClient, TransportConfig, DEFAULT_API_URL};
pub use error::ApiError;
pub use graphql::{ErrorCode, GraphQLError, GraphQLErrorLocation, GraphQLRequest, TokenPair};
pub use operations::RegisterInput;
pub use refresh::RefreshError;
