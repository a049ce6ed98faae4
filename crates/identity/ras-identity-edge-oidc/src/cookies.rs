//! Flow cookies and nonce generation.
//!
//! All state that crosses requests lives in these four cookies. They are
//! `Secure` and carry no expiry, so they last for the browser session.
//!
//! Values are written and read as is, without percent-encoding. The minted
//! edge token is validated byte for byte by whatever sits in front of the
//! protected resource.

use axum::http::header::{self, InvalidHeaderValue};
use axum::http::{HeaderMap, HeaderValue};
use axum_extra::extract::cookie::Cookie;
use rand::{Rng, thread_rng};

/// Post-login destination, doubling as the debug-mode switch.
pub const RETURN_URL_COOKIE: &str = "oidcurl";
/// Anti-replay value echoed back inside the id token.
pub const NONCE_COOKIE: &str = "nonce";
/// Raw identity provider access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
/// Token issued by the downstream mint service.
pub const EDGE_TOKEN_COOKIE: &str = "__token__";

pub const NONCE_LENGTH: usize = 16;

/// Build a secure, session-lifetime cookie scoped to `path`.
pub fn flow_cookie(
    name: &'static str,
    value: impl Into<String>,
    path: impl Into<String>,
) -> Cookie<'static> {
    Cookie::build((name, value.into()))
        .path(path.into())
        .secure(true)
        .build()
}

/// `Set-Cookie` headers for `cookies`, values unencoded.
pub fn set_cookie_headers(cookies: &[Cookie<'_>]) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        headers.append(header::SET_COOKIE, HeaderValue::try_from(cookie.to_string())?);
    }
    Ok(headers)
}

/// Raw value of the first request cookie called `name`.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// Random lowercase alphanumeric string.
pub fn generate_nonce(len: usize) -> String {
    let mut rng = thread_rng();
    (0..len)
        .filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36))
        .collect()
}
