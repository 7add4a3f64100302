//! Authentication state for the storefront and admin console.
//!
//! This module provides:
//! - `SessionStore`: Persisted identity + token pair, observable through a watch channel
//! - `KeyValueStore`: Durable backends (`FileStore`, `KeyringStore`, `MemoryStore`)
//! - `route_decision`: Hydration-aware navigation gating
//!
//! The store is loaded once at startup (`hydrate`). Until that completes the
//! authentication state is unknown and nothing auth-dependent should run.

pub mod credentials;
pub mod guard;
pub mod session;
pub mod storage;
pub mod user;

pub use credentials::KeyringStore;
pub use guard::{route_decision, Access, RouteDecision};
pub use session::{Session, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use user::{Role, User};
