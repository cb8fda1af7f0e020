//! Bearer credential codec.
//!
//! API keys are self-describing `kind.id.secret` strings so the resolver can
//! dispatch on kind without a lookup. Anything without a `.` is an opaque
//! OAuth access token. Decoding never touches storage.

use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::models::EntityKind;

use super::secret::Secret;

const BEARER_SCHEME: &str = "bearer";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("authorization scheme must be Bearer")]
    UnsupportedScheme,
    #[error("credential is empty")]
    Empty,
    #[error("credential is not a valid API key")]
    Malformed,
    #[error("API keys cannot belong to kind `{0}`")]
    UnknownKind(String),
}

/// Decoded API key bearer.
#[derive(Debug, Clone)]
pub struct ApiKeyToken {
    pub kind: EntityKind,
    pub key_id: String,
    pub secret: Secret,
}

impl ApiKeyToken {
    pub fn new(kind: EntityKind, key_id: String, secret: Secret) -> Self {
        Self {
            kind,
            key_id,
            secret,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}.{}.{}", self.kind, self.key_id, self.secret.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Credential {
    ApiKey(ApiKeyToken),
    AccessToken(Secret),
}

/// Kinds that can own API keys.
pub fn supports_api_keys(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::User | EntityKind::Application | EntityKind::Gateway | EntityKind::Organization
    )
}

/// Splits an `Authorization` header value into its bearer credential.
pub fn parse_authorization(value: &str) -> Result<Credential, CredentialError> {
    let (scheme, credential) = value
        .trim_start()
        .split_once(' ')
        .ok_or(CredentialError::UnsupportedScheme)?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(CredentialError::UnsupportedScheme);
    }
    decode(credential.trim())
}

pub fn decode(credential: &str) -> Result<Credential, CredentialError> {
    if credential.is_empty() {
        return Err(CredentialError::Empty);
    }
    if !credential.contains('.') {
        return Ok(Credential::AccessToken(Secret::new(credential.to_string())));
    }

    let mut parts = credential.splitn(3, '.');
    let (Some(kind), Some(key_id), Some(secret)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(CredentialError::Malformed);
    };
    if !is_encoded_material(key_id) || !is_encoded_material(secret) {
        return Err(CredentialError::Malformed);
    }

    let kind: EntityKind = kind
        .parse()
        .map_err(|_| CredentialError::UnknownKind(kind.to_string()))?;
    if !supports_api_keys(kind) {
        return Err(CredentialError::UnknownKind(kind.to_string()));
    }

    Ok(Credential::ApiKey(ApiKeyToken::new(
        kind,
        key_id.to_string(),
        Secret::new(secret.to_string()),
    )))
}

fn is_encoded_material(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Constant-time string equality.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
