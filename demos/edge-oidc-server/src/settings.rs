//! Settings for the edge OIDC server.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - a TOML file (`EDGE_OIDC_CONFIG_FILE`, default `edge-oidc.toml`), if present
//! - environment variables with the `EDGE_OIDC` prefix, e.g. `EDGE_OIDC__SERVER__PORT`
//!
//! Client credentials are not settings. They are read per request from the
//! process environment under the path-derived names.

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use ras_identity_edge_oidc::{DEFAULT_VARIABLE_PREFIX, EdgeOidcConfig, ProviderEndpoints};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub oidc: OidcSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to (default: 127.0.0.1)
    pub host: IpAddr,
    /// Port to bind to (default: 3000)
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcSettings {
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub mint_endpoint: String,
    /// Prefix of the credential variable names
    pub variable_prefix: String,
    /// Timeout for calls to the token and mint endpoints
    pub http_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
        }
    }
}

impl Default for OidcSettings {
    fn default() -> Self {
        let endpoints = ProviderEndpoints::default();
        Self {
            authorize_endpoint: endpoints.authorize_endpoint,
            token_endpoint: endpoints.token_endpoint,
            mint_endpoint: endpoints.mint_endpoint,
            variable_prefix: DEFAULT_VARIABLE_PREFIX.to_string(),
            http_timeout_seconds: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the configured file and the environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EDGE_OIDC_CONFIG_FILE")
            .unwrap_or_else(|_| "edge-oidc.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if config_path.exists() {
            info!("Loading configuration from {}", config_path.display());
            builder = builder.add_source(File::from(config_path));
        } else {
            debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("EDGE_OIDC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.oidc.variable_prefix.trim().is_empty() {
            anyhow::bail!("Variable prefix cannot be empty");
        }

        if self.oidc.http_timeout_seconds == Some(0) {
            anyhow::bail!("HTTP timeout must be greater than 0");
        }

        self.endpoints()
            .validate()
            .context("Invalid identity provider endpoint")?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.logging.level.to_lowercase();
        if !self.is_filter_directive() && !valid_levels.contains(&level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        Ok(())
    }

    pub fn endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            authorize_endpoint: self.oidc.authorize_endpoint.clone(),
            token_endpoint: self.oidc.token_endpoint.clone(),
            mint_endpoint: self.oidc.mint_endpoint.clone(),
        }
    }

    pub fn edge_oidc_config(&self) -> EdgeOidcConfig {
        let config = EdgeOidcConfig::new()
            .with_endpoints(self.endpoints())
            .with_variable_prefix(self.oidc.variable_prefix.clone());
        match self.oidc.http_timeout_seconds {
            Some(seconds) => config.with_http_timeout(seconds),
            None => config,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.server.host, self.server.port))
    }

    /// Filter string for the tracing subscriber.
    pub fn log_filter(&self) -> String {
        if self.is_filter_directive() {
            self.logging.level.clone()
        } else {
            format!(
                "edge_oidc_server={0},ras_identity_edge_oidc={0},warn",
                self.logging.level
            )
        }
    }

    fn is_filter_directive(&self) -> bool {
        self.logging.level.contains('=') || self.logging.level.contains(',')
    }
}
