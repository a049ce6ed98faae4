//! Compact JWT decomposition without signature verification.
//!
//! # Trust model
//!
//! Tokens handed to [`decompose`] are **not** verified. This is only sound
//! because the callback fetches them itself, server to server, straight from
//! the identity provider's token endpoint; they are never accepted from the
//! browser. Any caller that receives a token through an indirect channel must
//! verify the signature before trusting a claim.

use crate::base64url::{self, Base64UrlError};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JwtDecodeError {
    #[error("expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("{segment}: {source}")]
    Encoding {
        segment: &'static str,
        source: Base64UrlError,
    },

    #[error("{segment}: {source}")]
    Json {
        segment: &'static str,
        source: serde_json::Error,
    },

    #[error("{0}: not a JSON object")]
    NotAnObject(&'static str),

    #[error("token is missing")]
    Missing,
}

/// Result of decomposing a compact JWT.
///
/// Serializes as `{"header":…,"payload":…,"signature":…}` or `{"error":…}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedJwt {
    Decoded {
        header: Map<String, Value>,
        payload: Map<String, Value>,
        signature: String,
    },
    Invalid {
        error: String,
    },
}

impl DecodedJwt {
    pub fn is_valid(&self) -> bool {
        matches!(self, DecodedJwt::Decoded { .. })
    }

    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match self {
            DecodedJwt::Decoded { payload, .. } => Some(payload),
            DecodedJwt::Invalid { .. } => None,
        }
    }

    /// The `nonce` claim, when present as a string.
    pub fn nonce(&self) -> Option<&str> {
        self.payload()?.get("nonce")?.as_str()
    }

    pub(crate) fn missing() -> Self {
        DecodedJwt::Invalid {
            error: JwtDecodeError::Missing.to_string(),
        }
    }
}

/// Split `header.payload.signature`, decode and parse the first two segments.
///
/// Never fails: malformed input is reported as [`DecodedJwt::Invalid`]. The
/// signature is kept as an opaque string and is not checked.
pub fn decompose(token: &str) -> DecodedJwt {
    match try_decompose(token) {
        Ok(decoded) => decoded,
        Err(err) => DecodedJwt::Invalid {
            error: err.to_string(),
        },
    }
}

fn try_decompose(token: &str) -> Result<DecodedJwt, JwtDecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = segments.as_slice() else {
        return Err(JwtDecodeError::SegmentCount(segments.len()));
    };

    Ok(DecodedJwt::Decoded {
        header: decode_segment("header", header)?,
        payload: decode_segment("payload", payload)?,
        signature: signature.to_string(),
    })
}

fn decode_segment(
    segment: &'static str,
    encoded: &str,
) -> Result<Map<String, Value>, JwtDecodeError> {
    let text = base64url::decode_to_string(encoded)
        .map_err(|source| JwtDecodeError::Encoding { segment, source })?;

    match serde_json::from_str(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(JwtDecodeError::NotAnObject(segment)),
        Err(source) => Err(JwtDecodeError::Json { segment, source }),
    }
}
