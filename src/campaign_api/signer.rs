//! Exchange assertion construction and RS256 signing.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Errors raised while building or signing the exchange assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The private key file does not exist
    KeyNotFound(String),
    /// The private key resolved to empty content
    KeyUndefined,
    /// The key could not be parsed or the signature could not be produced
    Signature(String),
}

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningError::KeyNotFound(path) => write!(f, "Private key not found: {}", path),
            SigningError::KeyUndefined => write!(f, "Private key undefined"),
            SigningError::Signature(msg) => write!(f, "Unable to sign assertion: {}", msg),
        }
    }
}

impl std::error::Error for SigningError {}

/// Claims of the exchange assertion
///
/// The access endpoint identifier becomes a claim name of its own, set to
/// `true`, alongside the registered claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer - the organization id
    pub iss: String,
    /// Subject - the technical account id
    pub sub: String,
    /// Audience - the authorization server
    pub aud: String,
    /// Access endpoint flags
    #[serde(flatten)]
    pub scopes: BTreeMap<String, bool>,
}

/// Inputs of one assertion
#[derive(Debug, Clone)]
pub struct TokenAssertion {
    pub issuer: String,
    pub subject: String,
    pub audience: String,
    pub access_endpoint: String,
    /// Requested lifetime in seconds
    pub expiration: i64,
    /// Clock value the expiry is computed from
    pub issued_at: i64,
}

impl TokenAssertion {
    pub fn claims(&self) -> AssertionClaims {
        let mut scopes = BTreeMap::new();
        scopes.insert(self.access_endpoint.clone(), true);

        AssertionClaims {
            exp: self.issued_at + self.expiration,
            iss: self.issuer.clone(),
            sub: self.subject.clone(),
            aud: self.audience.clone(),
            scopes,
        }
    }
}

/// Resolve a private key reference to PEM content
///
/// The reference is either inline PEM or a path to a PEM file.
pub fn load_private_key(reference: &str) -> Result<String, SigningError> {
    if reference.contains("-----BEGIN") {
        return Ok(reference.to_string());
    }

    let path = Path::new(reference);
    if !path.is_file() {
        tracing::error!("Private key not found at {:?}", path);
        return Err(SigningError::KeyNotFound(reference.to_string()));
    }

    let pem = std::fs::read_to_string(path)
        .map_err(|e| SigningError::Signature(format!("Failed to read private key: {}", e)))?;

    if pem.trim().is_empty() {
        return Err(SigningError::KeyUndefined);
    }

    Ok(pem)
}

/// Sign an assertion with an RSA private key
///
/// Produces `header.claims.signature`, each segment base64url encoded without
/// padding. The header is `{"typ":"JWT","alg":"RS256"}`.
pub fn sign(private_key_pem: &str, assertion: &TokenAssertion) -> Result<String, SigningError> {
    if private_key_pem.trim().is_empty() {
        return Err(SigningError::KeyUndefined);
    }

    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| SigningError::Signature(format!("Invalid RSA private key: {}", e)))?;

    let header = Header::new(Algorithm::RS256);
    let claims = assertion.claims();

    encode(&header, &claims, &key).map_err(|e| {
        tracing::error!("Failed to sign exchange assertion: {}", e);
        SigningError::Signature(e.to_string())
    })
}

/// Load the key referenced by `key_reference` and sign the assertion
pub fn sign_with_reference(
    key_reference: &str,
    assertion: &TokenAssertion,
) -> Result<String, SigningError> {
    if key_reference.trim().is_empty() {
        return Err(SigningError::KeyUndefined);
    }

    let pem = load_private_key(key_reference)?;
    sign(&pem, assertion)
}
