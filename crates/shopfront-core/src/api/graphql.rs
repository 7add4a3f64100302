//! GraphQL wire types and server error classification.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Outbound operation document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    pub variables: serde_json::Value,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Response envelope. `data` stays untyped until errors have been checked so
/// that a partial or null payload never hides an error classification.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

/// Machine-readable `extensions.code` of a GraphQL error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// Missing, expired or invalid credential. The only code that triggers refresh.
    Unauthenticated,
    Forbidden,
    BadUserInput,
    NotFound,
    InternalServerError,
    Other(String),
}

impl ErrorCode {
    pub fn parse(code: &str) -> Self {
        match code {
            "UNAUTHENTICATED" => ErrorCode::Unauthenticated,
            "FORBIDDEN" => ErrorCode::Forbidden,
            "BAD_USER_INPUT" => ErrorCode::BadUserInput,
            "NOT_FOUND" => ErrorCode::NotFound,
            "INTERNAL_SERVER_ERROR" => ErrorCode::InternalServerError,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

/// A GraphQL error returned by the API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default)]
    pub locations: Vec<GraphQLErrorLocation>,
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
    #[serde(default)]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Location in a GraphQL document where an error occurred.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

impl GraphQLError {
    pub fn code(&self) -> Option<ErrorCode> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(|code| code.as_str())
            .map(ErrorCode::parse)
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.code() == Some(ErrorCode::Unauthenticated)
    }
}

pub(crate) fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fresh credential pair minted by login, registration or refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenPairResponse {
    access_token: String,
    refresh_token: String,
}

impl From<TokenPairResponse> for TokenPair {
    fn from(pair: TokenPairResponse) -> Self {
        Self {
            access_token: SecretString::from(pair.access_token),
            refresh_token: SecretString::from(pair.refresh_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GraphQLRequest::new("query Products { products { id } }")
            .with_operation_name("Products")
            .with_variables(serde_json::json!({ "first": 10 }));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["operationName"], "Products");
        assert_eq!(json["variables"]["first"], 10);

        let anonymous = serde_json::to_value(GraphQLRequest::new("{ me { id } }")).unwrap();
        assert!(anonymous.get("operationName").is_none());
        assert_eq!(anonymous["variables"], serde_json::json!({}));
    }

    #[test]
    fn test_parse_error_codes() {
        let json = r#"{"data":null,"errors":[
            {"message":"Token expired","locations":[{"line":1,"column":3}],"path":["me"],"extensions":{"code":"UNAUTHENTICATED"}},
            {"message":"Admins only","extensions":{"code":"FORBIDDEN"}},
            {"message":"Boom"}
        ]}"#;

        let response: GraphQLResponse = serde_json::from_str(json).expect("Failed to parse errors test JSON");
        assert!(response.data.is_none());
        assert_eq!(response.errors.len(), 3);

        assert!(response.errors[0].is_unauthenticated());
        assert_eq!(response.errors[0].locations[0].column, 3);
        assert_eq!(response.errors[1].code(), Some(ErrorCode::Forbidden));
        assert!(!response.errors[1].is_unauthenticated());
        assert_eq!(response.errors[2].code(), None);
    }

    #[test]
    fn test_unknown_code_is_other() {
        assert_eq!(
            ErrorCode::parse("PERSISTED_QUERY_NOT_FOUND"),
            ErrorCode::Other("PERSISTED_QUERY_NOT_FOUND".to_string())
        );
        assert_eq!(ErrorCode::parse("BAD_USER_INPUT"), ErrorCode::BadUserInput);
    }

    #[test]
    fn test_token_pair_from_response() {
        let response: TokenPairResponse =
            serde_json::from_str(r#"{"accessToken":"a2","refreshToken":"r2"}"#).unwrap();
        let pair = TokenPair::from(response);
        assert!(!format!("{:?}", pair).contains("a2"));
    }
}
