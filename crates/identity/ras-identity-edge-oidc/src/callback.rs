//! Callback processing: exchange the code, check the nonce, mint the edge
//! token and hand the browser back to where it started.

use crate::client::{self, ServiceResponse, TokenRequest, TokenServiceClient};
use crate::config::AuthContext;
use crate::cookies::{self, ACCESS_TOKEN_COOKIE, EDGE_TOKEN_COOKIE};
use crate::error::{EdgeOidcError, FlowFailure, json_response};
use crate::jwt::{self, DecodedJwt};
use crate::types::TokenExchangeResult;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::Cookie;
use serde_json::Value;
use tracing::{debug, info, warn};

const DEFAULT_RETURN_URL: &str = "/";

/// Where the browser goes once the callback succeeds, decoded from the
/// `oidcurl` cookie. Three reserved values switch on debugging behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    Normal(String),
    /// `debug_block`: stop before calling the token endpoint.
    BlockBeforeExchange,
    /// `debug_break`: call the token endpoint but treat any answer as a failure.
    SuppressUseAfterExchange,
    /// `debug_info`: answer with the token exchange result instead of a redirect.
    ReturnDebugInfo,
}

impl RedirectTarget {
    pub fn from_cookie(value: Option<&str>) -> Self {
        match value {
            None | Some("") => RedirectTarget::Normal(DEFAULT_RETURN_URL.to_string()),
            Some("debug_block") => RedirectTarget::BlockBeforeExchange,
            Some("debug_break") => RedirectTarget::SuppressUseAfterExchange,
            Some("debug_info") => RedirectTarget::ReturnDebugInfo,
            Some(url) => RedirectTarget::Normal(url.to_string()),
        }
    }

    /// The cookie value this target was decoded from.
    pub fn as_str(&self) -> &str {
        match self {
            RedirectTarget::Normal(url) => url,
            RedirectTarget::BlockBeforeExchange => "debug_block",
            RedirectTarget::SuppressUseAfterExchange => "debug_break",
            RedirectTarget::ReturnDebugInfo => "debug_info",
        }
    }
}

/// The parts of an inbound callback request the processor looks at.
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    pub code: Option<String>,
    /// Raw `oidcurl` cookie
    pub return_url: Option<String>,
    /// Raw `nonce` cookie
    pub nonce: Option<String>,
    /// Query string as received, only echoed in diagnostics
    pub raw_query: String,
}

#[derive(Debug)]
pub enum CallbackSuccess {
    Redirect {
        location: String,
        cookies: Vec<Cookie<'static>>,
        headers: HeaderMap,
    },
    DebugInfo {
        status: StatusCode,
        cookies: Vec<Cookie<'static>>,
        headers: HeaderMap,
        body: TokenExchangeResult,
    },
}

impl CallbackSuccess {
    pub fn cookies(&self) -> &[Cookie<'static>] {
        match self {
            CallbackSuccess::Redirect { cookies, .. } => cookies,
            CallbackSuccess::DebugInfo { cookies, .. } => cookies,
        }
    }
}

impl IntoResponse for CallbackSuccess {
    fn into_response(self) -> Response {
        match self {
            CallbackSuccess::Redirect { headers, .. } => (StatusCode::FOUND, headers).into_response(),
            CallbackSuccess::DebugInfo {
                status,
                headers,
                body,
                ..
            } => (headers, json_response(status, &body)).into_response(),
        }
    }
}

/// Run the callback half of the flow.
///
/// At most one token endpoint POST and one mint GET are made, in that order,
/// and the mint call only happens once the nonce has been checked. Failures
/// never carry cookies. A return URL that cannot be sent as a `Location`
/// header fails the precondition gate before anything is fetched.
pub async fn process_callback(
    ctx: &AuthContext,
    client: &TokenServiceClient,
    request: &CallbackRequest,
) -> Result<CallbackSuccess, FlowFailure> {
    let target = RedirectTarget::from_cookie(request.return_url.as_deref());

    let location = match &target {
        RedirectTarget::Normal(url) => HeaderValue::try_from(url.as_str()).ok(),
        _ => None,
    };
    let usable_target = match &target {
        RedirectTarget::Normal(_) => location.is_some(),
        RedirectTarget::BlockBeforeExchange => false,
        _ => true,
    };

    let code = match request.code.as_deref() {
        Some(code) if !code.is_empty() && usable_target => code,
        _ => {
            warn!(redirect = target.as_str(), "Callback precondition failed");
            return Err(FlowFailure::Precondition {
                description: format!(
                    "callback request not initiated, redirect-url:{}, query:{}",
                    target.as_str().escape_debug(),
                    request.raw_query
                ),
            });
        }
    };

    let token_request = TokenRequest::new(ctx, code);
    let exchange = client
        .exchange_code(ctx, &token_request)
        .await
        .map_err(|err| {
            warn!(error = %err, "Token endpoint unreachable");
            FlowFailure::CallbackFailure {
                status: StatusCode::BAD_GATEWAY,
                details: err.to_string(),
                path: ctx.endpoints.token_endpoint.clone(),
                params: token_request.params.clone(),
            }
        })?;

    if !exchange.is_success() || target == RedirectTarget::SuppressUseAfterExchange {
        return Err(exchange_failure(ctx, &token_request, &target, exchange));
    }

    let mut tokens = TokenExchangeResult::parse(&exchange.body).ok_or_else(|| {
        warn!("Token endpoint returned a body that is not a JSON object");
        FlowFailure::CallbackFailure {
            status: StatusCode::BAD_GATEWAY,
            details: exchange.body.clone(),
            path: ctx.endpoints.token_endpoint.clone(),
            params: token_request.params.clone(),
        }
    })?;

    let id_decode = tokens
        .id_token()
        .map(jwt::decompose)
        .unwrap_or_else(DecodedJwt::missing);
    tokens.set_id_decode(&id_decode);

    if !nonce_matches(request.nonce.as_deref(), id_decode.nonce()) {
        warn!("Nonce check failed");
        return Err(FlowFailure::NonceMismatch);
    }
    debug!("Nonce check passed");

    let mut session_cookies = vec![cookies::flow_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token().unwrap_or_default(),
        "/",
    )];

    let edge_token = mint_edge_token(ctx, client, &tokens).await?;
    session_cookies.push(cookies::flow_cookie(EDGE_TOKEN_COOKIE, edge_token, "/"));

    let mut headers = cookies::set_cookie_headers(&session_cookies).map_err(|err| {
        warn!("Session token is not a valid cookie value");
        FlowFailure::from(EdgeOidcError::from(err))
    })?;

    match (target, location) {
        (RedirectTarget::ReturnDebugInfo, _) => {
            let access_decode = tokens
                .access_token()
                .map(jwt::decompose)
                .unwrap_or_else(DecodedJwt::missing);
            tokens.set_access_decode(&access_decode);

            info!("Returning token exchange result for debugging");
            Ok(CallbackSuccess::DebugInfo {
                status: exchange.status,
                cookies: session_cookies,
                headers,
                body: tokens,
            })
        }
        (target, Some(location_header)) => {
            headers.insert(header::LOCATION, location_header);
            let location = target.as_str().to_string();
            info!(location = %location, "Login complete");
            Ok(CallbackSuccess::Redirect {
                location,
                cookies: session_cookies,
                headers,
            })
        }
        (target, None) => Err(FlowFailure::Precondition {
            description: format!(
                "callback request not initiated, redirect-url:{}, query:{}",
                target.as_str().escape_debug(),
                request.raw_query
            ),
        }),
    }
}

fn nonce_matches(cookie: Option<&str>, claim: Option<&str>) -> bool {
    matches!((cookie, claim), (Some(cookie), Some(claim)) if !cookie.is_empty() && cookie == claim)
}

/// A non-2xx (or deliberately ignored) token endpoint answer. JSON bodies
/// pass through unchanged, anything else becomes a `callback_failure`.
fn exchange_failure(
    ctx: &AuthContext,
    token_request: &TokenRequest,
    target: &RedirectTarget,
    exchange: ServiceResponse,
) -> FlowFailure {
    warn!(status = %exchange.status, redirect = target.as_str(), "Token exchange not used");

    match serde_json::from_str::<Value>(&exchange.body) {
        Ok(mut body) => {
            if let Value::Object(fields) = &mut body {
                fields.insert("url".to_string(), Value::String(target.as_str().to_string()));
            }
            FlowFailure::ProviderPassthrough {
                status: exchange.status,
                body,
            }
        }
        Err(_) => FlowFailure::CallbackFailure {
            status: exchange.status,
            details: exchange.body,
            path: ctx.endpoints.token_endpoint.clone(),
            params: token_request.params.clone(),
        },
    }
}

async fn mint_edge_token(
    ctx: &AuthContext,
    client: &TokenServiceClient,
    tokens: &TokenExchangeResult,
) -> Result<String, FlowFailure> {
    let seconds = tokens.expires_in().unwrap_or_default();
    let url = client::mint_url(ctx, &seconds)?;
    let url_text = url.to_string();

    let minted = client.mint_token(ctx, url).await.map_err(|err| {
        warn!(error = %err, "Token mint service unreachable");
        FlowFailure::MintFailure {
            status: StatusCode::BAD_GATEWAY,
            details: err.to_string(),
            url: url_text.clone(),
        }
    })?;

    if !minted.is_success() {
        warn!(status = %minted.status, "Token mint service refused");
        return Err(FlowFailure::MintFailure {
            status: minted.status,
            details: minted.body,
            url: url_text,
        });
    }

    Ok(minted.body)
}
