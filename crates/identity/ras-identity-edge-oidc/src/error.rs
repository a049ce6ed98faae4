//! Edge OIDC error types.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

pub type EdgeOidcResult<T> = Result<T, EdgeOidcError>;

/// Infrastructure failures: configuration, transport and serialization.
#[derive(Debug, Error)]
pub enum EdgeOidcError {
    #[error("Missing configuration variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Value cannot be sent as a header: {0}")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderValue),
}

impl EdgeOidcError {
    fn status(&self) -> StatusCode {
        match self {
            EdgeOidcError::HttpError(_) | EdgeOidcError::InvalidHeader(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            EdgeOidcError::HttpError(_) | EdgeOidcError::InvalidHeader(_) => "upstream_failure",
            EdgeOidcError::SerializationError(_) => "internal",
            _ => "configuration",
        }
    }
}

impl IntoResponse for EdgeOidcError {
    fn into_response(self) -> Response {
        let body = FailureBody::new(self.kind(), self.to_string());
        json_response(self.status(), &body)
    }
}

/// JSON body returned on diagnostic and failure paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureBody {
    pub error: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
}

impl FailureBody {
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            description: description.into(),
            details: None,
            url: None,
            path: None,
            params: None,
        }
    }
}

/// Wire label of the mint failure kind. Clients match on this exact string.
pub const MINT_FAILURE_LABEL: &str = "akamaitoken_faiure";

/// Terminal outcomes of the login/callback state machine that are not a
/// successful redirect. None of them carries cookies.
#[derive(Debug)]
pub enum FlowFailure {
    /// No authorization code, or the exchange was deliberately blocked.
    Precondition { description: String },
    /// The token endpoint answered with something that is not JSON, or could
    /// not be reached at all.
    CallbackFailure {
        status: StatusCode,
        details: String,
        path: String,
        params: String,
    },
    /// The token endpoint answered with JSON that is surfaced unchanged.
    ProviderPassthrough {
        status: StatusCode,
        body: serde_json::Value,
    },
    /// The id token nonce does not match the nonce cookie.
    NonceMismatch,
    /// The token mint service refused to issue a token.
    MintFailure {
        status: StatusCode,
        details: String,
        url: String,
    },
    /// Required deployment configuration is missing or invalid.
    Configuration(EdgeOidcError),
}

impl FlowFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            FlowFailure::Precondition { .. } => StatusCode::BAD_REQUEST,
            FlowFailure::CallbackFailure { status, .. } => *status,
            FlowFailure::ProviderPassthrough { status, .. } => *status,
            FlowFailure::NonceMismatch => StatusCode::FORBIDDEN,
            FlowFailure::MintFailure { status, .. } => *status,
            FlowFailure::Configuration(err) => err.status(),
        }
    }
}

impl From<EdgeOidcError> for FlowFailure {
    fn from(err: EdgeOidcError) -> Self {
        FlowFailure::Configuration(err)
    }
}

impl IntoResponse for FlowFailure {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            FlowFailure::Precondition { description } => {
                json_response(status, &FailureBody::new("precondition", description))
            }
            FlowFailure::CallbackFailure {
                details,
                path,
                params,
                ..
            } => {
                let mut body =
                    FailureBody::new("callback_failure", "callback received indicates error");
                body.details = Some(details);
                body.path = Some(path);
                body.params = Some(params);
                json_response(status, &body)
            }
            FlowFailure::ProviderPassthrough { body, .. } => json_response(status, &body),
            FlowFailure::NonceMismatch => (status, "Nonce failed").into_response(),
            FlowFailure::MintFailure { details, url, .. } => {
                let mut body =
                    FailureBody::new(MINT_FAILURE_LABEL, "token generation indicates error");
                body.details = Some(details);
                body.url = Some(url);
                json_response(status, &body)
            }
            FlowFailure::Configuration(err) => err.into_response(),
        }
    }
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => (status, [(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_body_omits_unset_fields() {
        let body = FailureBody::new("precondition", "no code");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "precondition", "description": "no code"})
        );
    }

    #[test]
    fn failure_statuses() {
        assert_eq!(
            FlowFailure::Precondition {
                description: String::new()
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(FlowFailure::NonceMismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            FlowFailure::from(EdgeOidcError::MissingVariable("PMUSER_X_SECRET".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            FlowFailure::MintFailure {
                status: StatusCode::SERVICE_UNAVAILABLE,
                details: String::new(),
                url: String::new(),
            }
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
