use thiserror::Error;

use super::graphql::{format_graphql_errors, GraphQLError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    #[error("Response contained no data")]
    NoData,

    #[error("Session storage was not loaded in time")]
    HydrationTimeout,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut = (0..=MAX_ERROR_BODY_LENGTH)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// The server rejected the credential itself, as opposed to the request.
    /// This is the only failure that enters the refresh protocol.
    pub fn is_unauthenticated(&self) -> bool {
        match self {
            ApiError::Unauthorized => true,
            ApiError::GraphQL(errors) => errors.iter().any(GraphQLError::is_unauthenticated),
            _ => false,
        }
    }

    /// GraphQL errors returned by the server, if any.
    pub fn graphql_errors(&self) -> &[GraphQLError] {
        match self {
            ApiError::GraphQL(errors) => errors,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn graphql_error(code: &str) -> GraphQLError {
        serde_json::from_value(serde_json::json!({
            "message": format!("{} error", code),
            "extensions": { "code": code }
        }))
        .unwrap()
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, "no"), ApiError::AccessDenied(_)));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, "x"), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_REQUEST, "x"), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.ends_with("(truncated, 510 total bytes)"));

        // Never splits a multi-byte character
        let wide = "é".repeat(MAX_ERROR_BODY_LENGTH);
        assert!(ApiError::truncate_body(&wide).contains("truncated"));
    }

    #[test]
    fn test_is_unauthenticated() {
        assert!(ApiError::Unauthorized.is_unauthenticated());
        assert!(ApiError::GraphQL(vec![graphql_error("UNAUTHENTICATED")]).is_unauthenticated());
        assert!(!ApiError::GraphQL(vec![graphql_error("FORBIDDEN")]).is_unauthenticated());
        assert!(!ApiError::GraphQL(vec![graphql_error("BAD_USER_INPUT")]).is_unauthenticated());
        assert!(!ApiError::AccessDenied("nope".to_string()).is_unauthenticated());
        assert!(!ApiError::ServerError("down".to_string()).is_unauthenticated());
    }

    #[test]
    fn test_graphql_error_formatting() {
        let err = ApiError::GraphQL(vec![graphql_error("FORBIDDEN"), graphql_error("NOT_FOUND")]);
        assert_eq!(err.to_string(), "GraphQL errors: FORBIDDEN error; NOT_FOUND error");
        assert_eq!(err.graphql_errors().len(), 2);
    }
}
