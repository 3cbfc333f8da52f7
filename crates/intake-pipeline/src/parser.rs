//! Input parsing for credential batches.
//!
//! Two wire shapes are accepted and told apart by structure alone: a flat
//! array (or single object) of credential fields, or an export envelope whose
//! `accounts` entries nest the credential one level deeper. The shape is
//! resolved once here; everything downstream sees `CredentialInput` only.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::input::{CredentialInput, SecretToken};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `InputShape` values.
pub enum InputShape {
    Flat,
    Envelope,
}

impl InputShape {
    pub fn as_str(self) -> &'static str {
        match self {
            InputShape::Flat => "flat",
            InputShape::Envelope => "envelope",
        }
    }
}

#[derive(Debug, Clone)]
/// Public struct `ParsedBatch` produced by `parse_credential_input`.
pub struct ParsedBatch {
    pub shape: InputShape,
    pub inputs: Vec<CredentialInput>,
    /// Entries present in the input, valid or not.
    pub found: usize,
    /// Entries dropped because they exposed no usable token.
    pub dropped: usize,
}

#[derive(Debug, Error)]
/// Enumerates supported `ParseError` values.
pub enum ParseError {
    #[error("input is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unrecognized input shape: {0}")]
    UnrecognizedShape(String),
    #[error("no valid credentials found: {found} entries, {valid} valid")]
    NoValidEntries { found: usize, valid: usize },
}

/// Parses raw batch text into normalized credential inputs.
pub fn parse_credential_input(raw: &str) -> Result<ParsedBatch, ParseError> {
    let value = serde_json::from_str::<Value>(raw)?;
    let (shape, entries) = resolve_shape(value)?;
    let found = entries.len();
    let inputs = entries
        .into_iter()
        .filter_map(|entry| match shape {
            InputShape::Flat => normalize_flat_entry(entry),
            InputShape::Envelope => normalize_envelope_entry(entry),
        })
        .collect::<Vec<_>>();

    if inputs.is_empty() {
        return Err(ParseError::NoValidEntries { found, valid: 0 });
    }

    let dropped = found - inputs.len();
    if dropped > 0 {
        tracing::warn!(
            shape = shape.as_str(),
            found,
            dropped,
            "dropped input entries without a usable token"
        );
    }
    tracing::debug!(
        shape = shape.as_str(),
        found,
        valid = inputs.len(),
        "parsed credential input"
    );

    Ok(ParsedBatch {
        shape,
        inputs,
        found,
        dropped,
    })
}

fn resolve_shape(value: Value) -> Result<(InputShape, Vec<Value>), ParseError> {
    match value {
        Value::Array(entries) => Ok((InputShape::Flat, entries)),
        Value::Object(mut map) => match map.remove("accounts") {
            Some(Value::Array(accounts)) => Ok((InputShape::Envelope, accounts)),
            Some(other) => Err(ParseError::UnrecognizedShape(format!(
                "`accounts` must be an array, found {}",
                json_kind(&other)
            ))),
            None => Ok((InputShape::Flat, vec![Value::Object(map)])),
        },
        other => Err(ParseError::UnrecognizedShape(format!(
            "expected an object or array at the top level, found {}",
            json_kind(&other)
        ))),
    }
}

fn normalize_flat_entry(entry: Value) -> Option<CredentialInput> {
    let Value::Object(entry) = entry else {
        return None;
    };
    let token = token_field(&entry)?;
    Some(CredentialInput {
        token: SecretToken::new(token),
        client_id: string_field(&entry, "clientId"),
        client_secret: string_field(&entry, "clientSecret").map(SecretToken::new),
        region: string_field(&entry, "region"),
        auth_region: string_field(&entry, "authRegion"),
        api_region: string_field(&entry, "apiRegion"),
        priority: priority_field(&entry),
        machine_id: string_field(&entry, "machineId"),
        email: string_field(&entry, "email"),
        external_status: None,
    })
}

fn normalize_envelope_entry(entry: Value) -> Option<CredentialInput> {
    let Value::Object(account) = entry else {
        return None;
    };
    let Some(Value::Object(credentials)) = account.get("credentials") else {
        return None;
    };
    let token = token_field(credentials)?;
    Some(CredentialInput {
        token: SecretToken::new(token),
        client_id: string_field(credentials, "clientId"),
        client_secret: string_field(credentials, "clientSecret").map(SecretToken::new),
        region: string_field(credentials, "region"),
        auth_region: None,
        api_region: None,
        priority: None,
        machine_id: string_field(&account, "machineId"),
        email: string_field(&account, "email"),
        external_status: string_field(&account, "status"),
    })
}

/// The secret token; `refreshToken` is accepted as an alias.
fn token_field(entry: &Map<String, Value>) -> Option<String> {
    ["token", "refreshToken"]
        .into_iter()
        .find_map(|key| entry.get(key).and_then(Value::as_str))
        .and_then(non_empty)
}

/// Optional string field. A value of the wrong type is ignored, never fatal
/// to the entry.
fn string_field(entry: &Map<String, Value>, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::Null => None,
        Value::String(value) => non_empty(value),
        other => {
            tracing::debug!(
                field = key,
                found = json_kind(other),
                "ignoring malformed optional field"
            );
            None
        }
    }
}

fn priority_field(entry: &Map<String, Value>) -> Option<u32> {
    let value = entry.get("priority")?;
    if value.is_null() {
        return None;
    }
    let priority = value.as_u64().and_then(|value| u32::try_from(value).ok());
    if priority.is_none() {
        tracing::debug!(found = json_kind(value), "ignoring malformed priority");
    }
    priority
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
