//! Stateless OpenID Connect login gateway for edge deployments.
//!
//! This crate runs the server side of the Authorization Code flow without any
//! server-side session store. Flow state travels in browser cookies: `…/login`
//! sets a nonce and redirects to the identity provider, `…/callback` exchanges
//! the code, checks the nonce against the id token, mints an edge token from a
//! downstream service and redirects back to the original destination.
//!
//! Per-deployment credentials are looked up by a key derived from the request
//! path, so one router can front several independently configured base paths.

pub mod base64url;
mod callback;
mod client;
mod config;
mod cookies;
mod error;
pub mod jwt;
mod login;
mod router;
mod types;

#[cfg(test)]
mod tests;

pub use callback::{CallbackRequest, CallbackSuccess, RedirectTarget, process_callback};
pub use client::{MINT_SECRET_HEADER, ServiceResponse, TokenRequest, TokenServiceClient};
pub use config::{
    AuthContext, DEFAULT_VARIABLE_PREFIX, EdgeOidcConfig, EnvVariableSource, ProviderEndpoints,
    VariableSource,
};
pub use cookies::{
    ACCESS_TOKEN_COOKIE, EDGE_TOKEN_COOKIE, NONCE_COOKIE, NONCE_LENGTH, RETURN_URL_COOKIE,
};
pub use error::{EdgeOidcError, EdgeOidcResult, FailureBody, FlowFailure, MINT_FAILURE_LABEL};
pub use jwt::{DecodedJwt, decompose};
pub use login::{LoginRedirect, begin_login};
pub use router::{EdgeOidcState, Route, router};
pub use types::TokenExchangeResult;
