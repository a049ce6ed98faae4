//! Login initiation: set the flow cookies and send the browser to the
//! identity provider.

use crate::config::AuthContext;
use crate::cookies::{self, NONCE_COOKIE, NONCE_LENGTH, RETURN_URL_COOKIE};
use crate::error::{EdgeOidcResult, FlowFailure};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::Cookie;
use tracing::{info, warn};
use url::Url;

/// A 302 to the authorize endpoint plus the cookies that must travel with it.
#[derive(Debug)]
pub struct LoginRedirect {
    pub location: String,
    pub nonce: String,
    pub cookies: Vec<Cookie<'static>>,
    headers: HeaderMap,
}

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, self.headers).into_response()
    }
}

/// Start the flow. `return_url` is the raw `url` query parameter.
///
/// A return URL that cannot be written into a `Set-Cookie` header as is
/// (control characters, non-visible bytes) fails as a precondition.
pub fn begin_login(
    ctx: &AuthContext,
    return_url: Option<&str>,
) -> Result<LoginRedirect, FlowFailure> {
    let nonce = cookies::generate_nonce(NONCE_LENGTH);
    let location = authorize_url(ctx, &nonce)?;

    let mut jar = Vec::with_capacity(2);
    if let Some(url) = return_url.filter(|url| !url.is_empty()) {
        jar.push(cookies::flow_cookie(
            RETURN_URL_COOKIE,
            url,
            ctx.base_dir.clone(),
        ));
    }
    jar.push(cookies::flow_cookie(
        NONCE_COOKIE,
        nonce.clone(),
        ctx.base_dir.clone(),
    ));

    let mut headers = cookies::set_cookie_headers(&jar).map_err(|_| {
        warn!("Return url is not a valid cookie value");
        FlowFailure::Precondition {
            description: format!(
                "login request not initiated, redirect-url:{}",
                return_url.unwrap_or_default().escape_debug()
            ),
        }
    })?;
    let location = String::from(location);
    let location_header = HeaderValue::try_from(location.as_str())
        .map_err(|err| FlowFailure::Configuration(err.into()))?;
    headers.insert(header::LOCATION, location_header);

    info!(base_dir = %ctx.base_dir, "Redirecting to identity provider");

    Ok(LoginRedirect {
        location,
        nonce,
        cookies: jar,
        headers,
    })
}

fn authorize_url(ctx: &AuthContext, nonce: &str) -> EdgeOidcResult<Url> {
    let mut url = Url::parse(&ctx.endpoints.authorize_endpoint)?;
    url.query_pairs_mut()
        .append_pair("client_id", &ctx.client_id)
        .append_pair("nonce", nonce)
        .append_pair("redirect_uri", &ctx.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", "openid");
    Ok(url)
}
