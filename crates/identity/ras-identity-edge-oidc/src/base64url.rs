//! Base64url decoding for JWT segments.
//!
//! JWT segments are unpadded base64url, but some providers pad them anyway, so
//! decoding accepts both forms.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use thiserror::Error;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum Base64UrlError {
    #[error("invalid base64url: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("decoded segment is not UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Decode a base64url string, padded or not, to raw bytes.
pub fn decode(input: &str) -> Result<Vec<u8>, Base64UrlError> {
    Ok(URL_SAFE_LENIENT.decode(input)?)
}

/// Decode a base64url string to UTF-8 text.
pub fn decode_to_string(input: &str) -> Result<String, Base64UrlError> {
    Ok(String::from_utf8(decode(input)?)?)
}

/// Encode bytes as unpadded base64url.
pub fn encode(input: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(input)
}
