//! Account operations that feed the session store.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::graphql::{GraphQLRequest, TokenPair, TokenPairResponse};
use super::{ApiError, GraphQLClient};
use crate::auth::User;

/// Fields requested whenever the API returns a `User`
const USER_FIELDS: &str = "id email name role isActive emailVerified createdAt updatedAt";

fn login_mutation() -> String {
    format!(
        "mutation Login($input: LoginInput!) {{ login(input: $input) {{ user {{ {USER_FIELDS} }} accessToken refreshToken }} }}"
    )
}

fn register_mutation() -> String {
    format!(
        "mutation Register($input: RegisterInput!) {{ register(input: $input) {{ user {{ {USER_FIELDS} }} accessToken refreshToken }} }}"
    )
}

fn me_query() -> String {
    format!("query Me {{ me {{ {USER_FIELDS} }} }}")
}

const LOGOUT_MUTATION: &str = "mutation Logout { logout }";

/// New account details.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub name: String,
    pub password: SecretString,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    user: User,
    #[serde(flatten)]
    tokens: TokenPairResponse,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    login: AuthPayload,
}

#[derive(Debug, Deserialize)]
struct RegisterData {
    register: AuthPayload,
}

#[derive(Debug, Deserialize)]
struct MeData {
    me: User,
}

impl GraphQLClient {
    /// Sign in and populate the session store.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<User, ApiError> {
        let request = GraphQLRequest::new(login_mutation())
            .with_operation_name("Login")
            .with_variables(serde_json::json!({
                "input": { "email": email, "password": password.expose_secret() }
            }));

        let data: LoginData = self.execute_unauthenticated(&request).await?;
        info!(user_id = %data.login.user.id, "Logged in");
        Ok(self.install(data.login))
    }

    /// Create an account and populate the session store.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: &RegisterInput) -> Result<User, ApiError> {
        let request = GraphQLRequest::new(register_mutation())
            .with_operation_name("Register")
            .with_variables(serde_json::json!({
                "input": {
                    "email": input.email,
                    "name": input.name,
                    "password": input.password.expose_secret()
                }
            }));

        let data: RegisterData = self.execute_unauthenticated(&request).await?;
        info!(user_id = %data.register.user.id, "Registered");
        Ok(self.install(data.register))
    }

    /// Fetch the account behind the current credential.
    pub async fn me(&self) -> Result<User, ApiError> {
        let request = GraphQLRequest::new(me_query()).with_operation_name("Me");
        let data: MeData = self.execute(&request).await?;
        Ok(data.me)
    }

    /// End the session. The server is told when possible; the local session
    /// is cleared whatever the server says.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if self.session().access_token().is_some() {
            let request = GraphQLRequest::new(LOGOUT_MUTATION).with_operation_name("Logout");
            match self.execute::<serde_json::Value>(&request).await {
                Ok(_) => debug!("Server session ended"),
                Err(e) => warn!(error = %e, "Server logout failed, clearing local session anyway"),
            }
        }
        self.session().logout();
    }

    fn install(&self, payload: AuthPayload) -> User {
        let tokens = TokenPair::from(payload.tokens);
        self.session()
            .set_auth(payload.user.clone(), tokens.access_token, tokens.refresh_token);
        payload.user
    }
}
