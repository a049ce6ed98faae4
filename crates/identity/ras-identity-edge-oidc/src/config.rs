//! Edge OIDC configuration and the per-request authentication context.

use crate::error::{EdgeOidcError, EdgeOidcResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

pub const DEFAULT_VARIABLE_PREFIX: &str = "PMUSER";

/// The three fixed endpoints the flow talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    /// Browser redirect target, never called server side
    pub authorize_endpoint: String,
    /// Authorization code exchange, form POST
    pub token_endpoint: String,
    /// Downstream token mint service, GET with a shared secret header
    pub mint_endpoint: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            authorize_endpoint: "https://example.onelogin.com/oidc/2/auth".to_string(),
            token_endpoint: "https://oidcsupport.example.com/onelogin/oidc/2/token".to_string(),
            mint_endpoint: "https://oidcsupport.example.com/service/generatetoken".to_string(),
        }
    }
}

impl ProviderEndpoints {
    /// Check that every endpoint is an absolute URL.
    pub fn validate(&self) -> EdgeOidcResult<()> {
        for (name, value) in [
            ("authorize_endpoint", &self.authorize_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("mint_endpoint", &self.mint_endpoint),
        ] {
            Url::parse(value)
                .map_err(|e| EdgeOidcError::ConfigError(format!("{name} '{value}': {e}")))?;
        }
        Ok(())
    }
}

/// Edge OIDC configuration
#[derive(Debug, Clone)]
pub struct EdgeOidcConfig {
    pub endpoints: ProviderEndpoints,
    /// Prefix of the per-deployment variable names, `<prefix>_<KEY>_CLIENTID` etc.
    pub variable_prefix: String,
    /// Outbound request timeout. `None` leaves the client default in place.
    pub http_timeout_seconds: Option<u64>,
}

impl Default for EdgeOidcConfig {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::default(),
            variable_prefix: DEFAULT_VARIABLE_PREFIX.to_string(),
            http_timeout_seconds: None,
        }
    }
}

impl EdgeOidcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_variable_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.variable_prefix = prefix.into();
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = Some(seconds);
        self
    }
}

/// Source of deployment variables (client credentials and shared secrets).
pub trait VariableSource: Send + Sync {
    fn variable(&self, name: &str) -> Option<String>;
}

/// Reads variables from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvVariableSource;

impl VariableSource for EnvVariableSource {
    fn variable(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl VariableSource for HashMap<String, String> {
    fn variable(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Everything one login or callback request needs, derived from the request
/// path and host plus the deployment variables. Built once per request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Request path up to and including its last `/`
    pub base_dir: String,
    /// Uppercase key derived from `base_dir`, used in variable names
    pub variable_key: String,
    /// Absolute callback URL registered with the identity provider
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
    /// Shared secret presented to the mint service
    pub mint_secret: String,
    pub endpoints: ProviderEndpoints,
}

impl AuthContext {
    /// Resolve the context for a request, failing if any variable is missing.
    pub fn resolve(
        path: &str,
        host: &str,
        config: &EdgeOidcConfig,
        variables: &dyn VariableSource,
    ) -> EdgeOidcResult<Self> {
        let base_dir = base_dir(path).to_string();
        let variable_key = variable_key(&base_dir);
        let lookup = |suffix: &str| -> EdgeOidcResult<String> {
            let name = format!("{}_{}_{}", config.variable_prefix, variable_key, suffix);
            match variables.variable(&name) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(EdgeOidcError::MissingVariable(name)),
            }
        };

        let client_id = lookup("CLIENTID")?;
        let client_secret = lookup("SECRET")?;
        let mint_secret = lookup("AKSECRET")?;

        Ok(Self {
            redirect_uri: format!("https://{host}{base_dir}callback"),
            base_dir,
            variable_key,
            client_id,
            client_secret,
            mint_secret,
            endpoints: config.endpoints.clone(),
        })
    }
}

/// Everything up to and including the last `/` of the path.
pub fn base_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

/// `/app/secure/` becomes `APP_SECURE`, `/` becomes the empty string.
pub fn variable_key(base_dir: &str) -> String {
    let trimmed = base_dir.strip_prefix('/').unwrap_or(base_dir);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    trimmed.replace('/', "_").to_uppercase()
}
