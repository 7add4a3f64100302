use std::sync::{Arc, Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::storage::{KeyValueStore, MemoryStore, StorageError};
use super::user::User;

/// Storage key holding the raw access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key holding the raw refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Storage key holding the serialized session object
pub const SESSION_KEY: &str = "auth-storage";

/// Current authentication state.
///
/// `is_authenticated` is derived from the fields, so a reader can never see
/// it true while a credential is missing.
#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<User>,
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    has_hydrated: bool,
}

impl Session {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref()
    }

    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// False until persisted state has been loaded. Until then the
    /// authentication state is unknown, not logged out.
    pub fn has_hydrated(&self) -> bool {
        self.has_hydrated
    }

    fn is_empty(&self) -> bool {
        self.user.is_none() && self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// On-disk shape of the session object.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    is_authenticated: bool,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            user: session.user.clone(),
            access_token: session.access_token.as_ref().map(|t| t.expose_secret().to_string()),
            refresh_token: session.refresh_token.as_ref().map(|t| t.expose_secret().to_string()),
            is_authenticated: session.is_authenticated(),
        }
    }
}

/// Single source of truth for identity and credentials.
///
/// Every mutation replaces the whole [`Session`] in one step and writes
/// through to storage before returning. Subscribers see each committed state.
pub struct SessionStore {
    state: watch::Sender<Session>,
    storage: Arc<dyn KeyValueStore>,
    /// Serializes commit + write-through so storage order matches commit order
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            state,
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by process memory only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    // ===== Reads =====

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Watch every committed session state, starting from the current one.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn access_token(&self) -> Option<SecretString> {
        self.state.borrow().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<SecretString> {
        self.state.borrow().refresh_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn has_hydrated(&self) -> bool {
        self.state.borrow().has_hydrated
    }

    /// Resolves once the persisted state has been loaded.
    pub async fn wait_hydrated(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|s| s.has_hydrated).await;
    }

    // ===== Mutations =====

    pub fn set_auth(&self, user: User, access_token: SecretString, refresh_token: SecretString) {
        debug!(user_id = %user.id, role = ?user.role, "Session authenticated");
        self.commit(|s| {
            s.user = Some(user);
            s.access_token = Some(access_token);
            s.refresh_token = Some(refresh_token);
        });
    }

    /// Replace the credential pair after a refresh exchange. `user` is untouched.
    pub fn set_tokens(&self, access_token: SecretString, refresh_token: SecretString) {
        debug!("Session tokens replaced");
        self.commit(|s| {
            s.access_token = Some(access_token);
            s.refresh_token = Some(refresh_token);
        });
    }

    /// Clear identity and credentials, in memory and in storage. Idempotent.
    pub fn logout(&self) {
        info!("Session cleared");
        self.commit(|s| {
            s.user = None;
            s.access_token = None;
            s.refresh_token = None;
        });
    }

    /// Install the pair minted from `spent`, unless the session moved on while
    /// the exchange ran (logout, or a new login with a different refresh
    /// token). Returns whether the pair was installed.
    pub fn rotate_tokens(&self, spent: &SecretString, access_token: SecretString, refresh_token: SecretString) -> bool {
        let rotated = self.commit_if(|s| {
            if !holds_refresh_token(s, spent) {
                return false;
            }
            s.access_token = Some(access_token);
            s.refresh_token = Some(refresh_token);
            true
        });
        if rotated {
            debug!("Session tokens rotated");
        } else {
            debug!("Session changed during refresh, discarding new tokens");
        }
        rotated
    }

    /// `logout`, but only while `spent` is still the stored refresh token.
    pub fn logout_if_current(&self, spent: &SecretString) -> bool {
        let cleared = self.commit_if(|s| {
            if !holds_refresh_token(s, spent) {
                return false;
            }
            s.user = None;
            s.access_token = None;
            s.refresh_token = None;
            true
        });
        if cleared {
            info!("Session cleared");
        }
        cleared
    }

    /// Flip `has_hydrated`. Only the first call has an effect.
    pub fn mark_hydrated(&self) {
        let changed = self.state.send_if_modified(|s| {
            if s.has_hydrated {
                false
            } else {
                s.has_hydrated = true;
                true
            }
        });
        if changed {
            debug!(authenticated = self.is_authenticated(), "Session hydrated");
        }
    }

    /// Load persisted state once at startup, then mark the store hydrated.
    ///
    /// Missing or unreadable storage yields an empty session; the store is
    /// marked hydrated in every case. Returns whether a full session was
    /// restored.
    pub fn hydrate(&self) -> bool {
        if self.has_hydrated() {
            debug!("Session already hydrated, skipping load");
            return self.is_authenticated();
        }

        let persisted = self.read_persisted_session();
        let access_token = self
            .read_key(ACCESS_TOKEN_KEY)
            .or(persisted.access_token)
            .map(SecretString::from);
        let refresh_token = self
            .read_key(REFRESH_TOKEN_KEY)
            .or(persisted.refresh_token)
            .map(SecretString::from);

        {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.state.send_modify(|s| {
                s.user = persisted.user;
                s.access_token = access_token;
                s.refresh_token = refresh_token;
            });
        }

        self.mark_hydrated();
        self.is_authenticated()
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read persisted session value");
                None
            }
        }
    }

    fn read_persisted_session(&self) -> PersistedSession {
        let Some(contents) = self.read_key(SESSION_KEY) else {
            return PersistedSession::default();
        };
        match serde_json::from_str(&contents) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Failed to parse persisted session, starting empty");
                PersistedSession::default()
            }
        }
    }

    /// Apply a mutation and write the result through to storage.
    fn commit(&self, mutate: impl FnOnce(&mut Session)) {
        self.commit_if(|s| {
            mutate(s);
            true
        });
    }

    /// Like `commit`, but `mutate` may decline by returning false, in which
    /// case nothing is published or persisted. The check and the write happen
    /// under the same lock.
    fn commit_if(&self, mutate: impl FnOnce(&mut Session) -> bool) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.state.send_if_modified(mutate) {
            return false;
        }
        let session = self.snapshot();
        if let Err(e) = self.persist(&session) {
            warn!(error = %e, "Failed to persist session");
        }
        true
    }

    fn persist(&self, session: &Session) -> Result<(), StorageError> {
        if session.is_empty() {
            // Every key is attempted even if an earlier removal fails
            let removed = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEY].map(|key| self.storage.remove(key));
            return removed.into_iter().collect();
        }

        match session.access_token {
            Some(ref token) => self.storage.set(ACCESS_TOKEN_KEY, token.expose_secret())?,
            None => self.storage.remove(ACCESS_TOKEN_KEY)?,
        }
        match session.refresh_token {
            Some(ref token) => self.storage.set(REFRESH_TOKEN_KEY, token.expose_secret())?,
            None => self.storage.remove(REFRESH_TOKEN_KEY)?,
        }
        let contents = serde_json::to_string(&PersistedSession::from(session))?;
        self.storage.set(SESSION_KEY, &contents)
    }
}

fn holds_refresh_token(session: &Session, token: &SecretString) -> bool {
    session
        .refresh_token
        .as_ref()
        .is_some_and(|current| current.expose_secret() == token.expose_secret())
}
