//! Axum integration: a router that serves `…/login` and `…/callback` under
//! any base path.

use crate::callback::{self, CallbackRequest};
use crate::client::TokenServiceClient;
use crate::config::{AuthContext, EdgeOidcConfig, VariableSource};
use crate::cookies::{self, NONCE_COOKIE, RETURN_URL_COOKIE};
use crate::error::{EdgeOidcResult, FlowFailure};
use crate::login;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn};
use url::form_urlencoded;

/// Shared, immutable router state.
#[derive(Clone)]
pub struct EdgeOidcState {
    config: Arc<EdgeOidcConfig>,
    client: TokenServiceClient,
    variables: Arc<dyn VariableSource>,
}

impl EdgeOidcState {
    pub fn new(config: EdgeOidcConfig, variables: Arc<dyn VariableSource>) -> EdgeOidcResult<Self> {
        config.endpoints.validate()?;
        let client = TokenServiceClient::new(config.http_timeout_seconds)?;

        Ok(Self {
            config: Arc::new(config),
            client,
            variables,
        })
    }

    pub fn config(&self) -> &EdgeOidcConfig {
        &self.config
    }
}

/// The two routes, matched on the last path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Callback,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with("/login") {
            Some(Route::Login)
        } else if path.ends_with("/callback") {
            Some(Route::Callback)
        } else {
            None
        }
    }
}

/// Build the router. Every method and path is handled by one fallback that
/// dispatches on the path suffix.
pub fn router(state: EdgeOidcState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(
    State(state): State<EdgeOidcState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let path = uri.path();
    let Some(route) = Route::from_path(path) else {
        debug!(%uri, "No route");
        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("No route for {uri}"),
        )
            .into_response();
    };

    let host = request_host(&headers, &uri);
    let ctx = match AuthContext::resolve(path, &host, &state.config, state.variables.as_ref()) {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(error = %err, "Cannot resolve authentication context");
            return FlowFailure::from(err).into_response();
        }
    };

    let raw_query = uri.query().unwrap_or_default();
    match route {
        Route::Login => {
            let return_url = query_param(raw_query, "url");
            match login::begin_login(&ctx, return_url.as_deref()) {
                Ok(redirect) => redirect.into_response(),
                Err(failure) => failure.into_response(),
            }
        }
        Route::Callback => {
            let request = CallbackRequest {
                code: query_param(raw_query, "code"),
                return_url: cookies::cookie_value(&headers, RETURN_URL_COOKIE),
                nonce: cookies::cookie_value(&headers, NONCE_COOKIE),
                raw_query: raw_query.to_string(),
            };
            match callback::process_callback(&ctx, &state.client, &request).await {
                Ok(success) => success.into_response(),
                Err(failure) => failure.into_response(),
            }
        }
    }
}

fn request_host(headers: &HeaderMap, uri: &Uri) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
        .to_string()
}

fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
