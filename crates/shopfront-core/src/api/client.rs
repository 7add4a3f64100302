//! Authenticated GraphQL transport.
//!
//! Every operation passes through the same pipeline: wait for the session
//! store to hydrate, attach the current access token, dispatch, classify the
//! outcome. An `UNAUTHENTICATED` rejection suspends the request behind a
//! single coordinated refresh exchange and retries it once with the new token.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::graphql::{GraphQLRequest, GraphQLResponse, TokenPair, TokenPairResponse};
use super::refresh::{Recovery, RefreshCoordinator, RefreshError};
use super::ApiError;
use crate::auth::SessionStore;

// ============================================================================
// Constants
// ============================================================================

/// Local development endpoint used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:4000/graphql";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on one refresh attempt. Waiters queue behind it, so it must
/// be short enough that a stuck exchange does not freeze the whole client.
const REFRESH_TIMEOUT_SECS: u64 = 10;

/// Extra attempts after a transient refresh failure (network, 5xx, timeout).
const MAX_REFRESH_RETRIES: u32 = 2;

/// Initial backoff delay in milliseconds between refresh attempts.
const INITIAL_REFRESH_BACKOFF_MS: u64 = 250;

/// Mints a new pair; the refresh token travels as the bearer credential.
pub const REFRESH_TOKEN_MUTATION: &str =
    "mutation RefreshToken { refreshToken { accessToken refreshToken } }";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenData {
    refresh_token: TokenPairResponse,
}

/// Transport tuning. `Default` targets the local development server.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub request_timeout: Duration,
    pub refresh_timeout: Duration,
    pub max_refresh_retries: u32,
    pub refresh_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            refresh_timeout: Duration::from_secs(REFRESH_TIMEOUT_SECS),
            max_refresh_retries: MAX_REFRESH_RETRIES,
            refresh_backoff: Duration::from_millis(INITIAL_REFRESH_BACKOFF_MS),
        }
    }
}

impl TransportConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

/// GraphQL client bound to one endpoint and one session store.
/// Clone is cheap - all clones share the connection pool and refresh state.
#[derive(Clone)]
pub struct GraphQLClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Client,
    config: TransportConfig,
    session: Arc<SessionStore>,
    refresh: RefreshCoordinator,
}

impl GraphQLClient {
    pub fn new(config: TransportConfig, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                session,
                refresh: RefreshCoordinator::new(),
            }),
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.config.endpoint
    }

    /// Refresh exchanges issued by this client so far
    pub fn refresh_exchanges(&self) -> u64 {
        self.inner.refresh.exchanges()
    }

    /// Whether a refresh exchange is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.is_refreshing()
    }

    /// Run an operation with the session's credential, refreshing it once if
    /// the server reports it as expired.
    ///
    /// Errors other than an authentication rejection are returned untouched
    /// and never retried. A request rejected again after its retry fails.
    #[instrument(skip_all, fields(operation = request.operation_name.as_deref().unwrap_or("anonymous")))]
    pub async fn execute<T: DeserializeOwned>(&self, request: &GraphQLRequest) -> Result<T, ApiError> {
        self.wait_hydrated().await?;

        let sent = self.inner.session.access_token();
        match self.inner.dispatch(request, sent.as_ref()).await {
            Err(err) if err.is_unauthenticated() => {
                debug!("Credential rejected, entering refresh");
                let token = self.recover(sent, err).await?;
                self.inner.dispatch(request, Some(&token)).await
            }
            result => result,
        }
    }

    /// Run an operation without any credential and without refresh handling.
    /// Used for login and registration.
    #[instrument(skip_all, fields(operation = request.operation_name.as_deref().unwrap_or("anonymous")))]
    pub async fn execute_unauthenticated<T: DeserializeOwned>(
        &self,
        request: &GraphQLRequest,
    ) -> Result<T, ApiError> {
        self.inner.dispatch(request, None).await
    }

    /// Auth-dependent requests wait until persisted state is known.
    async fn wait_hydrated(&self) -> Result<(), ApiError> {
        if self.inner.session.has_hydrated() {
            return Ok(());
        }
        debug!("Waiting for session hydration");
        tokio::time::timeout(self.inner.config.request_timeout, self.inner.session.wait_hydrated())
            .await
            .map_err(|_| ApiError::HydrationTimeout)
    }

    /// Obtain a usable token for a request rejected while holding `sent`,
    /// or hand back `original` when the session cannot be recovered.
    async fn recover(&self, sent: Option<SecretString>, original: ApiError) -> Result<SecretString, ApiError> {
        let outcome = match self.inner.refresh.plan(&self.inner.session, sent.as_ref()) {
            Recovery::Retry(token) => return Ok(token),
            Recovery::Unrecoverable => {
                warn!("Credential rejected and no refresh token available, ending session");
                self.inner.session.logout();
                return Err(original);
            }
            Recovery::Wait(outcome) => outcome,
            Recovery::Start { refresh_token, outcome } => {
                // Runs detached so that dropping this request never strands the waiters
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.run_refresh(refresh_token).await });
                outcome
            }
        };

        match outcome.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(_)) | Err(_) => Err(original),
        }
    }
}

impl ClientInner {
    async fn dispatch<T: DeserializeOwned>(
        &self,
        request: &GraphQLRequest,
        token: Option<&SecretString>,
    ) -> Result<T, ApiError> {
        let mut builder = self.http.post(&self.config.endpoint).json(request);
        if let Some(token) = token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        parse_response(status, &body)
    }

    /// Run one refresh episode to completion and release its waiters.
    async fn run_refresh(&self, refresh_token: SecretString) {
        let outcome = self.exchange_with_retries(&refresh_token).await;

        // Only the session that owned `refresh_token` is touched; a logout or
        // new login during the exchange wins.
        let outcome = match outcome {
            Ok(pair) => {
                let access_token = pair.access_token.clone();
                if self.session.rotate_tokens(&refresh_token, pair.access_token, pair.refresh_token) {
                    info!("Access token refreshed");
                    Ok(access_token)
                } else {
                    warn!("Session changed during token refresh, discarding new tokens");
                    Err(RefreshError::Superseded)
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.session.logout_if_current(&refresh_token);
                Err(e)
            }
        };

        let released = self.refresh.settle(outcome);
        debug!(waiters = released, "Refresh settled");
    }

    async fn exchange_with_retries(&self, refresh_token: &SecretString) -> Result<TokenPair, RefreshError> {
        let mut retries = 0;
        let mut backoff = self.config.refresh_backoff;

        loop {
            let attempt = tokio::time::timeout(self.config.refresh_timeout, self.exchange(refresh_token)).await;
            let result = attempt.unwrap_or(Err(RefreshError::TimedOut(self.config.refresh_timeout)));

            match result {
                Err(e) if e.is_transient() && retries < self.config.max_refresh_retries => {
                    retries += 1;
                    warn!(
                        error = %e,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Refresh exchange failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2; // Exponential backoff
                }
                other => return other,
            }
        }
    }

    /// The exchange itself. Goes straight to the wire so that its own
    /// rejection can never re-enter the refresh protocol.
    #[instrument(skip_all)]
    async fn exchange(&self, refresh_token: &SecretString) -> Result<TokenPair, RefreshError> {
        let request = GraphQLRequest::new(REFRESH_TOKEN_MUTATION).with_operation_name("RefreshToken");
        let data: RefreshTokenData = self.dispatch(&request, Some(refresh_token)).await?;
        Ok(data.refresh_token.into())
    }
}

/// Turn a raw HTTP response into operation data or a classified error.
///
/// GraphQL errors win over the HTTP status: servers commonly report
/// `UNAUTHENTICATED` on a 200 and sometimes on a 401 with a JSON body.
fn parse_response<T: DeserializeOwned>(status: reqwest::StatusCode, body: &str) -> Result<T, ApiError> {
    let envelope: GraphQLResponse = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => return Err(ApiError::from_status(status, body)),
        Err(e) => return Err(ApiError::InvalidResponse(format!("Failed to parse response: {}", e))),
    };

    if !envelope.errors.is_empty() {
        return Err(ApiError::GraphQL(envelope.errors));
    }
    if !status.is_success() {
        return Err(ApiError::from_status(status, body));
    }

    match envelope.data {
        Some(serde_json::Value::Null) | None => Err(ApiError::NoData),
        Some(data) => serde_json::from_value(data)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected data shape: {}", e))),
    }
}
