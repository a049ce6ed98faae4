use crate::jwt::DecodedJwt;
use serde::Serialize;
use serde_json::{Map, Value};

/// Token endpoint response, kept verbatim and augmented with the decoded
/// tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TokenExchangeResult {
    fields: Map<String, Value>,
}

impl TokenExchangeResult {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parse a token endpoint body. Returns `None` unless it is a JSON object.
    pub fn parse(body: &str) -> Option<Self> {
        match serde_json::from_str(body) {
            Ok(Value::Object(fields)) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn id_token(&self) -> Option<&str> {
        self.fields.get("id_token")?.as_str()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.fields.get("access_token")?.as_str()
    }

    /// `expires_in` as the text of its JSON value.
    pub fn expires_in(&self) -> Option<String> {
        match self.fields.get("expires_in")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn set_id_decode(&mut self, decoded: &DecodedJwt) {
        self.insert_decoded("id_decode", decoded);
    }

    pub fn set_access_decode(&mut self, decoded: &DecodedJwt) {
        self.insert_decoded("access_decode", decoded);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn insert_decoded(&mut self, key: &str, decoded: &DecodedJwt) {
        let value = serde_json::to_value(decoded).unwrap_or_else(|err| {
            serde_json::json!({ "error": err.to_string() })
        });
        self.fields.insert(key.to_string(), value);
    }
}
