//! ID token signing keys.
//!
//! The [`KeyManager`] owns a set of RSA signing keys indexed by key id (`kid`).
//! Exactly one key is active and signs new ID tokens; every key in the set is
//! published through the JWKS endpoint so tokens signed by a retired key still
//! verify until that key is dropped from the set.
//!
//! The set is immutable once built. Rotation means building a new manager and
//! swapping it into the shared state.

use std::collections::BTreeMap;
use std::path::Path;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Signing algorithm advertised in discovery and used for every ID token.
pub const SIGNING_ALGORITHM: &str = "RS256";

const RSA_KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Key generation failed: {0}")]
    Generation(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Failed to read key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode token: {0}")]
    Encoding(String),
    #[error("Failed to decode token: {0}")]
    Decoding(String),
    #[error("Unknown key id: {0}")]
    UnknownKey(String),
}

/// Claims carried by an ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// JSON Web Key (RFC 7517) for an RSA signing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    /// Modulus, base64url without padding
    pub n: String,
    /// Public exponent, base64url without padding
    pub e: String,
}

/// JSON Web Key Set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// One RSA keypair plus its identifier.
pub struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    n: Vec<u8>,
    e: Vec<u8>,
}

impl SigningKey {
    /// Generate a fresh 2048-bit RSA key with a random `kid`.
    pub fn generate() -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        Self::from_private_key(uuid::Uuid::new_v4().to_string(), &private_key)
    }

    /// Load a PKCS#8 PEM encoded RSA private key.
    pub fn from_pkcs8_pem(kid: impl Into<String>, pem: &str) -> Result<Self, KeyError> {
        let private_key =
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        Self::from_private_key(kid.into(), &private_key)
    }

    /// Load a key file; the file stem becomes the `kid`.
    pub fn from_pem_file(path: &Path) -> Result<Self, KeyError> {
        let pem = std::fs::read_to_string(path)?;
        let kid = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| KeyError::InvalidKey(format!("no file stem in {}", path.display())))?;
        Self::from_pkcs8_pem(kid, &pem)
    }

    fn from_private_key(kid: String, private_key: &RsaPrivateKey) -> Result<Self, KeyError> {
        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        // jsonwebtoken only accepts PEM/DER input for RSA private keys
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let decoding_key =
            DecodingKey::from_rsa_components(&URL_SAFE_NO_PAD.encode(&n), &URL_SAFE_NO_PAD.encode(&e))
                .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        Ok(Self {
            kid,
            encoding_key,
            decoding_key,
            n,
            e,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: SIGNING_ALGORITHM.to_string(),
            n: URL_SAFE_NO_PAD.encode(&self.n),
            e: URL_SAFE_NO_PAD.encode(&self.e),
        }
    }
}

/// The signing key set shared by the token and JWKS endpoints.
pub struct KeyManager {
    active_kid: String,
    keys: BTreeMap<String, SigningKey>,
}

impl KeyManager {
    pub fn new(active: SigningKey) -> Self {
        let active_kid = active.kid.clone();
        let mut keys = BTreeMap::new();
        keys.insert(active_kid.clone(), active);
        Self { active_kid, keys }
    }

    /// Generate a fresh active key.
    pub fn generate() -> Result<Self, KeyError> {
        SigningKey::generate().map(Self::new)
    }

    /// Publish an additional key for verification only (e.g. the key being rotated out).
    pub fn with_verification_key(mut self, key: SigningKey) -> Self {
        if key.kid != self.active_kid {
            self.keys.insert(key.kid.clone(), key);
        }
        self
    }

    pub fn active_kid(&self) -> &str {
        &self.active_kid
    }

    fn active(&self) -> Result<&SigningKey, KeyError> {
        self.keys
            .get(&self.active_kid)
            .ok_or_else(|| KeyError::UnknownKey(self.active_kid.clone()))
    }

    /// Sign the claims with the active key into a compact JWS.
    pub fn sign(&self, claims: &IdTokenClaims) -> Result<String, KeyError> {
        let key = self.active()?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());

        encode(&header, claims, &key.encoding_key).map_err(|e| KeyError::Encoding(e.to_string()))
    }

    /// Public half of every key in the set.
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: self.keys.values().map(SigningKey::to_jwk).collect(),
        }
    }

    /// Verify an ID token's signature, expiry, issuer and audience.
    pub fn verify_id_token(
        &self,
        token: &str,
        issuer: &str,
        audience: &str,
    ) -> Result<IdTokenClaims, KeyError> {
        let header = decode_header(token).map_err(|e| KeyError::Decoding(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| KeyError::Decoding("token header has no kid".to_string()))?;
        let key = self
            .keys
            .get(&kid)
            .ok_or_else(|| KeyError::UnknownKey(kid.clone()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        decode::<IdTokenClaims>(token, &key.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| KeyError::Decoding(e.to_string()))
    }
}
