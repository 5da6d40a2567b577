// src/wallet/key_management.rs
//! JWT signing and validation service.
//!
//! Builds signers and verifiers for every key of the local keystore:
//! - RSA keys (RS256/384/512, PS256/384/512)
//! - EC keys on P-256 (ES256) and P-384 (ES384)
//! - Symmetric `oct` keys (HS256/384/512)
//!
//! Keys without private material are verify-only. Keys that cannot be turned
//! into a verifier are left out of the pools and logged.
//!
//! The pools are built once in [`SigningService::new`] and never mutated, so
//! a single instance can be shared behind an `Arc` by all requests.

use crate::error::{ConfigError, SigningError};
use crate::models::jwk::{Jwk, JwkSet};
use crate::utils::serialization::decode_base64url;
use crate::wallet::key_store::{KeyStore, KeyStoreEntry};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

/// A key usable for producing signatures.
struct Signer {
    kid: String,
    /// Supported algorithms, the key's own `alg` first
    algorithms: Vec<Algorithm>,
    key: EncodingKey,
}

/// A key usable for checking signatures.
struct KeyVerifier {
    kid: String,
    algorithms: Vec<Algorithm>,
    key: DecodingKey,
}

/// Signs and verifies compact JWTs with the keys of the local keystore.
pub struct SigningService {
    signers: Vec<Signer>,
    verifiers: Vec<KeyVerifier>,
    public_keys: Vec<Jwk>,
    default_signer_key_id: Option<String>,
    default_algorithm: Option<Algorithm>,
}

impl SigningService {
    /// Builds signers and verifiers for all keys of the keystore.
    ///
    /// # Arguments
    /// * `key_store` - Keys to load. Keys without `kid` get a random one.
    /// * `default_signer_key_id` - Key used by [`sign`](Self::sign). When
    ///   `None` and exactly one key was loaded, that key becomes the default.
    /// * `default_algorithm` - Algorithm used by [`sign`](Self::sign). When
    ///   `None` the default signer's own algorithm is used.
    pub fn new(
        key_store: KeyStore,
        default_signer_key_id: Option<String>,
        default_algorithm: Option<Algorithm>,
    ) -> Self {
        let mut signers = Vec::new();
        let mut verifiers = Vec::new();
        let mut public_keys = Vec::new();
        let mut loaded_kids = Vec::new();

        for mut entry in key_store.keys {
            let kid = match entry.jwk.kid.as_deref() {
                Some(kid) if !kid.is_empty() => kid.to_string(),
                _ => {
                    let generated = Uuid::new_v4().to_string();
                    debug!("Key without kid, using generated id {}", generated);
                    generated
                }
            };
            entry.jwk.kid = Some(kid.clone());

            let algorithms = match key_algorithms(&entry.jwk) {
                Ok(algorithms) => algorithms,
                Err(reason) => {
                    warn!("Skipping key {}: {}", kid, reason);
                    continue;
                }
            };

            let verifier_key = match decoding_key(&entry.jwk) {
                Ok(key) => key,
                Err(reason) => {
                    warn!("Exception loading verifier for key {}: {}", kid, reason);
                    continue;
                }
            };

            if entry.is_private() {
                match encoding_key(&entry) {
                    Ok(key) => signers.push(Signer {
                        kid: kid.clone(),
                        algorithms: algorithms.clone(),
                        key,
                    }),
                    Err(reason) => warn!("Exception loading signer for key {}: {}", kid, reason),
                }
            }

            verifiers.push(KeyVerifier {
                kid: kid.clone(),
                algorithms,
                key: verifier_key,
            });
            if let Some(public) = entry.jwk.to_public() {
                public_keys.push(public);
            }
            loaded_kids.push(kid);
        }

        let default_signer_key_id = match default_signer_key_id {
            Some(kid) => Some(kid),
            None if loaded_kids.len() == 1 => loaded_kids.pop(),
            None => None,
        };

        info!(
            "Signing service ready: {} signer(s), {} verifier(s), default signer {:?}",
            signers.len(),
            verifiers.len(),
            default_signer_key_id
        );

        Self {
            signers,
            verifiers,
            public_keys,
            default_signer_key_id,
            default_algorithm,
        }
    }

    /// Loads the keystore file and builds the service from configuration values.
    ///
    /// # Errors
    /// Returns a configuration error if the algorithm name is unknown or the
    /// keystore cannot be read.
    pub fn from_config(
        keystore_path: &str,
        default_signer_key_id: Option<&str>,
        default_algorithm_name: Option<&str>,
    ) -> crate::error::Result<Self> {
        let default_algorithm = default_algorithm_name
            .map(|name| {
                Algorithm::from_str(name).map_err(|_| ConfigError::InvalidValue {
                    field: "default_signing_algorithm",
                    reason: format!("unknown algorithm {}", name),
                })
            })
            .transpose()?;
        let key_store = KeyStore::load(keystore_path)?;

        Ok(Self::new(
            key_store,
            default_signer_key_id.map(str::to_string),
            default_algorithm,
        ))
    }

    /// Signs claims with the default signer.
    ///
    /// Sets `alg` and `kid` on the given header; every other header member
    /// (`typ`, `jku`, ...) is kept as passed in.
    ///
    /// # Errors
    /// - [`SigningError::NoDefaultSigner`] if no default signer is configured
    ///   or the configured key has no private part
    /// - [`SigningError::UnsupportedAlgorithm`] if the default signer cannot
    ///   produce the default algorithm
    pub fn sign<T: Serialize>(&self, mut header: Header, claims: &T) -> Result<String, SigningError> {
        let kid = self.default_signer_key_id.as_deref().ok_or_else(|| {
            error!("Tried to call default signing with no default signer ID set");
            SigningError::NoDefaultSigner(None)
        })?;
        let signer = self.signers.iter().find(|s| s.kid == kid).ok_or_else(|| {
            error!("Default signer {} is not available for signing", kid);
            SigningError::NoDefaultSigner(Some(kid.to_string()))
        })?;

        let alg = self.default_algorithm.unwrap_or(signer.algorithms[0]);
        if !signer.algorithms.contains(&alg) {
            error!("Default signer {} does not support {:?}", kid, alg);
            return Err(SigningError::UnsupportedAlgorithm(alg));
        }

        header.alg = alg;
        header.kid = Some(signer.kid.clone());
        encode(&header, claims, &signer.key).map_err(|e| {
            error!("Failed to sign JWT, error was: {}", e);
            SigningError::from(e)
        })
    }

    /// Signs claims with the first signer supporting `alg`.
    ///
    /// # Errors
    /// [`SigningError::UnsupportedAlgorithm`] if no signer supports `alg`.
    pub fn sign_with_algorithm<T: Serialize>(
        &self,
        mut header: Header,
        claims: &T,
        alg: Algorithm,
    ) -> Result<String, SigningError> {
        let signer = self
            .signers
            .iter()
            .find(|s| s.algorithms.contains(&alg))
            .ok_or_else(|| {
                error!("No matching algorithm found for alg={:?}", alg);
                SigningError::UnsupportedAlgorithm(alg)
            })?;

        header.alg = alg;
        header.kid = Some(signer.kid.clone());
        encode(&header, claims, &signer.key).map_err(|e| {
            error!("Failed to sign JWT, error was: {}", e);
            SigningError::from(e)
        })
    }

    /// Checks the signature of a compact JWT against every held verifier.
    ///
    /// Succeeds on the first verifier that accepts the signature. Temporal
    /// claims are not checked here.
    pub fn verify(&self, jwt: &str) -> bool {
        let header = match decode_header(jwt) {
            Ok(header) => header,
            Err(e) => {
                debug!("Cannot parse JWT header: {}", e);
                return false;
            }
        };
        let validation = signature_only_validation(header.alg);

        for verifier in self.verifiers.iter().filter(|v| v.algorithms.contains(&header.alg)) {
            match decode::<serde_json::Value>(jwt, &verifier.key, &validation) {
                Ok(_) => return true,
                Err(e) => debug!("Failed to validate signature with {}: {}", verifier.kid, e),
            }
        }
        false
    }

    /// Public projections of all loaded keys, for the JWKS endpoint.
    pub fn public_keys(&self) -> JwkSet {
        JwkSet {
            keys: self.public_keys.clone(),
        }
    }

    pub fn default_signer_key_id(&self) -> Option<&str> {
        self.default_signer_key_id.as_deref()
    }

    /// The algorithm [`sign`](Self::sign) would use, if a default signer is available.
    pub fn default_algorithm(&self) -> Option<Algorithm> {
        let kid = self.default_signer_key_id.as_deref()?;
        let signer = self.signers.iter().find(|s| s.kid == kid)?;
        Some(self.default_algorithm.unwrap_or(signer.algorithms[0]))
    }

    /// All algorithms any signer or verifier supports.
    pub fn supported_algorithms(&self) -> Vec<Algorithm> {
        let mut seen = HashSet::new();
        self.signers
            .iter()
            .flat_map(|s| s.algorithms.iter())
            .chain(self.verifiers.iter().flat_map(|v| v.algorithms.iter()))
            .filter(|alg| seen.insert(**alg))
            .copied()
            .collect()
    }
}

/// Validation that only checks the signature and algorithm.
pub(crate) fn signature_only_validation(alg: Algorithm) -> Validation {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = HashSet::new();
    validation
}

/// Algorithms a key can be used with, its declared `alg` first.
fn key_algorithms(jwk: &Jwk) -> Result<Vec<Algorithm>, String> {
    let mut algorithms = match jwk.kty.as_str() {
        "RSA" => vec![
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
        ],
        "EC" => match jwk.crv.as_deref() {
            Some("P-256") => vec![Algorithm::ES256],
            Some("P-384") => vec![Algorithm::ES384],
            other => return Err(format!("Unsupported EC curve: {:?}", other)),
        },
        "oct" => vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512],
        kty => return Err(format!("Unknown key type: {}", kty)),
    };

    if let Some(name) = jwk.alg.as_deref() {
        let declared = Algorithm::from_str(name).map_err(|_| format!("Unknown algorithm: {}", name))?;
        let position = algorithms
            .iter()
            .position(|a| *a == declared)
            .ok_or_else(|| format!("Algorithm {} does not fit key type {}", name, jwk.kty))?;
        algorithms.swap(0, position);
    }
    Ok(algorithms)
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, String> {
    let member = |value: &Option<String>, name: &str| {
        value.clone().ok_or_else(|| format!("Missing {} member", name))
    };

    match jwk.kty.as_str() {
        "RSA" => DecodingKey::from_rsa_components(&member(&jwk.n, "n")?, &member(&jwk.e, "e")?)
            .map_err(|e| e.to_string()),
        "EC" => DecodingKey::from_ec_components(&member(&jwk.x, "x")?, &member(&jwk.y, "y")?)
            .map_err(|e| e.to_string()),
        "oct" => {
            let secret = decode_base64url(&member(&jwk.k, "k")?).map_err(|e| e.to_string())?;
            Ok(DecodingKey::from_secret(&secret))
        }
        kty => Err(format!("Unknown key type: {}", kty)),
    }
}

fn encoding_key(entry: &KeyStoreEntry) -> Result<EncodingKey, String> {
    let pem = || {
        entry
            .private_key_pem
            .as_deref()
            .map(str::as_bytes)
            .ok_or_else(|| "Missing private_key_pem member".to_string())
    };

    match entry.jwk.kty.as_str() {
        "RSA" => EncodingKey::from_rsa_pem(pem()?).map_err(|e| e.to_string()),
        "EC" => EncodingKey::from_ec_pem(pem()?).map_err(|e| e.to_string()),
        "oct" => {
            let k = entry.jwk.k.as_deref().ok_or_else(|| "Missing k member".to_string())?;
            let secret = decode_base64url(k).map_err(|e| e.to_string())?;
            Ok(EncodingKey::from_secret(&secret))
        }
        kty => Err(format!("Unknown key type: {}", kty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture(json: &str) -> KeyStore {
        KeyStore::from_json(json).unwrap()
    }

    fn local() -> SigningService {
        SigningService::new(
            fixture(include_str!("../../tests/fixtures/keystore.json")),
            Some("rsa1".into()),
            Some(Algorithm::RS256),
        )
    }

    fn claims() -> serde_json::Value {
        json!({ "sub": "alice", "iss": "https://issuer.example.org" })
    }

    #[test]
    fn loads_all_keys() {
        let service = local();
        assert_eq!(service.signers.len(), 3);
        assert_eq!(service.verifiers.len(), 4);

        let public = service.public_keys();
        let kids: Vec<_> = public.keys.iter().filter_map(|k| k.kid.as_deref()).collect();
        assert_eq!(kids, vec!["rsa1", "ec1", "rsa-retired"]);
        assert!(public.keys.iter().all(|k| k.k.is_none()));
    }

    #[test]
    fn default_sign_round_trip() {
        let service = local();
        let jwt = service.sign(Header::default(), &claims()).unwrap();

        let header = decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("rsa1"));
        assert_eq!(header.typ.as_deref(), Some("JWT"));
        assert!(service.verify(&jwt));
    }

    #[test]
    fn default_algorithm_overrides_key_algorithm() {
        let service = SigningService::new(
            fixture(include_str!("../../tests/fixtures/keystore.json")),
            Some("rsa1".into()),
            Some(Algorithm::PS512),
        );
        let jwt = service.sign(Header::default(), &claims()).unwrap();
        assert_eq!(decode_header(&jwt).unwrap().alg, Algorithm::PS512);
        assert!(service.verify(&jwt));
    }

    #[test]
    fn sign_with_algorithm_selects_matching_signer() {
        let service = local();

        let es = service.sign_with_algorithm(Header::default(), &claims(), Algorithm::ES256).unwrap();
        assert_eq!(decode_header(&es).unwrap().kid.as_deref(), Some("ec1"));
        assert!(service.verify(&es));

        let hs = service.sign_with_algorithm(Header::default(), &claims(), Algorithm::HS384).unwrap();
        assert_eq!(decode_header(&hs).unwrap().kid.as_deref(), Some("hmac1"));
        assert!(service.verify(&hs));

        let err = service
            .sign_with_algorithm(Header::default(), &claims(), Algorithm::ES384)
            .unwrap_err();
        assert!(matches!(err, SigningError::UnsupportedAlgorithm(Algorithm::ES384)));
    }

    #[test]
    fn no_default_signer_with_several_keys() {
        let service = SigningService::new(fixture(include_str!("../../tests/fixtures/keystore.json")), None, None);
        assert!(service.default_signer_key_id().is_none());
        assert!(matches!(
            service.sign(Header::default(), &claims()),
            Err(SigningError::NoDefaultSigner(None))
        ));
    }

    #[test]
    fn verify_only_key_cannot_be_default_signer() {
        let service = SigningService::new(
            fixture(include_str!("../../tests/fixtures/keystore.json")),
            Some("rsa-retired".into()),
            None,
        );
        assert!(matches!(
            service.sign(Header::default(), &claims()),
            Err(SigningError::NoDefaultSigner(Some(_)))
        ));
    }

    #[test]
    fn default_algorithm_must_fit_default_signer() {
        let service = SigningService::new(
            fixture(include_str!("../../tests/fixtures/keystore.json")),
            Some("ec1".into()),
            Some(Algorithm::RS256),
        );
        assert!(matches!(
            service.sign(Header::default(), &claims()),
            Err(SigningError::UnsupportedAlgorithm(Algorithm::RS256))
        ));
    }

    #[test]
    fn single_key_without_kid_is_implied_default() {
        let service = SigningService::new(fixture(include_str!("../../tests/fixtures/keystore_single.json")), None, None);

        let kid = service.default_signer_key_id().unwrap().to_string();
        assert!(Uuid::parse_str(&kid).is_ok());
        assert_eq!(service.public_keys().keys[0].kid.as_deref(), Some(kid.as_str()));
        assert_eq!(service.default_algorithm(), Some(Algorithm::RS256));

        let jwt = service.sign(Header::default(), &claims()).unwrap();
        assert_eq!(decode_header(&jwt).unwrap().kid, Some(kid));
        assert!(service.verify(&jwt));
    }

    #[test]
    fn keys_with_mismatched_algorithm_are_excluded() {
        let store = fixture(
            r#"{"keys":[
                {"kty":"RSA","kid":"bad","alg":"ES256","n":"AQAB","e":"AQAB"},
                {"kty":"OKP","kid":"ed","crv":"Ed25519","x":"AQ"},
                {"kty":"oct","kid":"h","k":"c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0"}
            ]}"#,
        );
        let service = SigningService::new(store, None, None);
        assert_eq!(service.verifiers.len(), 1);
        assert_eq!(service.default_signer_key_id(), Some("h"));
        assert!(service.public_keys().keys.is_empty());
    }

    #[test]
    fn rejects_foreign_and_tampered_tokens() {
        let service = local();
        let remote = SigningService::new(fixture(include_str!("../../tests/fixtures/remote_keystore.json")), None, None);

        let foreign = remote.sign(Header::default(), &claims()).unwrap();
        assert!(!service.verify(&foreign));

        let jwt = service.sign(Header::default(), &claims()).unwrap();
        let mut parts: Vec<&str> = jwt.split('.').collect();
        let forged = base64::encode_config(r#"{"sub":"mallory"}"#, base64::URL_SAFE_NO_PAD);
        parts[1] = &forged;
        assert!(!service.verify(&parts.join(".")));
        assert!(!service.verify("not-a-jwt"));
    }

    #[test]
    fn supported_algorithms_are_unique() {
        let algorithms = local().supported_algorithms();
        assert_eq!(algorithms.len(), 10);
        assert!(algorithms.contains(&Algorithm::HS512));
        assert!(algorithms.contains(&Algorithm::ES256));
    }

    #[test]
    fn unknown_algorithm_name_is_a_config_error() {
        let err = SigningService::from_config("tests/fixtures/keystore.json", None, Some("XX999")).err();
        assert!(matches!(
            err,
            Some(crate::error::PassportError::Config(ConfigError::InvalidValue { .. }))
        ));
    }
}
