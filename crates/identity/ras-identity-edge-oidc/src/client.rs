//! Outbound calls to the identity provider's token endpoint and the token
//! mint service.

use crate::config::AuthContext;
use crate::error::EdgeOidcResult;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::debug;
use url::Url;
use url::form_urlencoded::{self, Serializer};

/// Header carrying the shared secret on mint requests.
pub const MINT_SECRET_HEADER: &str = "token-key";

/// Status and raw text body of an upstream response.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ServiceResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// The form body of a code exchange, split so that the non-secret half can be
/// echoed in diagnostics.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    /// `grant_type`, `redirect_uri` and `code`
    pub params: String,
    /// `client_id` and `client_secret`
    credentials: String,
}

impl TokenRequest {
    pub fn new(ctx: &AuthContext, code: &str) -> Self {
        let params = Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("redirect_uri", &ctx.redirect_uri)
            .append_pair("code", code)
            .finish();
        let credentials = Serializer::new(String::new())
            .append_pair("client_id", &ctx.client_id)
            .append_pair("client_secret", &ctx.client_secret)
            .finish();
        Self {
            params,
            credentials,
        }
    }

    pub fn body(&self) -> String {
        format!("{}&{}", self.params, self.credentials)
    }
}

/// Mint endpoint URL for a token valid for `seconds`.
///
/// The ACL is sent as the literal `acl=/*`, which is how the mint service
/// documents it, and appended to any query the endpoint already carries.
pub fn mint_url(ctx: &AuthContext, seconds: &str) -> EdgeOidcResult<Url> {
    let mut url = Url::parse(&ctx.endpoints.mint_endpoint)?;
    let seconds: String = form_urlencoded::byte_serialize(seconds.as_bytes()).collect();
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => {
            format!("{existing}&acl=/*&seconds={seconds}")
        }
        _ => format!("acl=/*&seconds={seconds}"),
    };
    url.set_query(Some(&query));
    Ok(url)
}

/// HTTP client for the two upstream services. Cheap to clone.
#[derive(Clone)]
pub struct TokenServiceClient {
    http_client: Client,
}

impl TokenServiceClient {
    pub fn new(http_timeout_seconds: Option<u64>) -> EdgeOidcResult<Self> {
        let mut builder = Client::builder();
        if let Some(seconds) = http_timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }

        Ok(Self {
            http_client: builder.build()?,
        })
    }

    /// POST the authorization code to the token endpoint.
    pub async fn exchange_code(
        &self,
        ctx: &AuthContext,
        request: &TokenRequest,
    ) -> EdgeOidcResult<ServiceResponse> {
        let response = self
            .http_client
            .post(&ctx.endpoints.token_endpoint)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(request.body())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, "Token endpoint responded");

        Ok(ServiceResponse { status, body })
    }

    /// GET a token from the mint service.
    pub async fn mint_token(&self, ctx: &AuthContext, url: Url) -> EdgeOidcResult<ServiceResponse> {
        let response = self
            .http_client
            .get(url)
            .header(MINT_SECRET_HEADER, &ctx.mint_secret)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, "Token mint service responded");

        Ok(ServiceResponse { status, body })
    }
}
