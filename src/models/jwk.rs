// src/models/jwk.rs
//! JSON Web Key data model.
//!
//! Covers the subset of [RFC 7517](https://www.rfc-editor.org/rfc/rfc7517)
//! the passport issuer needs: RSA, EC and symmetric (`oct`) keys. The same
//! structure is used for the local keystore, for remote trust anchor key sets
//! and for the published JWK Set.

use serde::{Deserialize, Serialize};

/// A single JSON Web Key.
///
/// Private material is never part of this type. For symmetric keys the
/// shared secret lives in `k`, which is why [`Jwk::to_public`] refuses to
/// project `oct` keys.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jwk {
    /// Key type: `RSA`, `EC` or `oct`
    pub kty: String,

    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Intended use (`sig`)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Algorithm the key is meant for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// Symmetric key value (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

impl Jwk {
    /// Returns true for RSA keys
    pub fn is_rsa(&self) -> bool {
        self.kty == "RSA"
    }

    /// Public projection of this key.
    ///
    /// Returns `None` for symmetric keys, which have no public part.
    pub fn to_public(&self) -> Option<Jwk> {
        match self.kty.as_str() {
            "oct" => None,
            _ => Some(Jwk {
                k: None,
                ..self.clone()
            }),
        }
    }
}

/// A JWK Set (`{"keys": [...]}`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Finds a key by its ID.
    ///
    /// Without a key ID the first RSA key is returned, matching how a JWS
    /// without `kid` is resolved against a single-key set.
    pub fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
        match kid {
            Some(kid) => self.keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
            None => self.keys.iter().find(|k| k.is_rsa()),
        }
    }
}
