// src/services/visa_verifier.rs
//! Verification of visas issued by third parties.
//!
//! A visa is trusted only when its `jku` header names a configured trust
//! anchor and its RSA signature checks out against that anchor's key set.
//! Every failure produces an unverified [`VerifiedVisaRecord`]; nothing here
//! returns an error.

use crate::models::visa::{VerifiedVisaRecord, VISA_CLAIM};
use crate::remote::trust_anchor::TrustAnchorRegistry;
use crate::utils::serialization::form_urlencode;
use crate::utils::time::iso_date;
use crate::wallet::key_management::signature_only_validation;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Verifies inbound visas against the configured trust anchors.
#[derive(Clone)]
pub struct VisaVerifier {
    anchors: Arc<TrustAnchorRegistry>,
}

impl VisaVerifier {
    pub fn new(anchors: Arc<TrustAnchorRegistry>) -> Self {
        Self { anchors }
    }

    /// Verifies a list of visas, keeping input order.
    pub fn verify_all(&self, jwts: &[String], now: i64) -> Vec<VerifiedVisaRecord> {
        jwts.iter().map(|jwt| self.verify(jwt, now)).collect()
    }

    /// Verifies one compact visa JWT at time `now`.
    ///
    /// Checks, in order: trusted `jku`, RSA signature with the key selected
    /// by `kid`, presence of the required claims, `exp > now` and
    /// `asserted <= now`. On success the record carries the linked identity
    /// `urlencode(sub),urlencode(iss)`.
    pub fn verify(&self, jwt: &str, now: i64) -> VerifiedVisaRecord {
        let mut record = VerifiedVisaRecord::unverified(jwt);

        let header = match decode_header(jwt) {
            Ok(header) => header,
            Err(e) => {
                warn!("cannot parse visa header: {}", e);
                return record;
            }
        };

        let Some(jku) = header.jku.as_deref() else {
            warn!("JKU is missing in visa header");
            return record;
        };
        let Some(anchor) = self.anchors.get(jku) else {
            warn!("JKU {} is not trusted for verification", jku);
            return record;
        };
        record.signer = Some(anchor.display_name.clone());

        if !RSA_ALGORITHMS.contains(&header.alg) {
            warn!("visa signed by {} uses non-RSA algorithm {:?}", anchor.display_name, header.alg);
            return record;
        }

        let Some(jwk) = anchor.keys.find(header.kid.as_deref()).filter(|k| k.is_rsa()) else {
            warn!(
                "no RSA key {} in key set of {}",
                header.kid.as_deref().unwrap_or("(none)"),
                anchor.display_name
            );
            return record;
        };
        let key = match (jwk.n.as_deref(), jwk.e.as_deref()) {
            (Some(n), Some(e)) => match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => key,
                Err(e) => {
                    warn!("unusable key in key set of {}: {}", anchor.display_name, e);
                    return record;
                }
            },
            _ => {
                warn!("RSA key without n/e in key set of {}", anchor.display_name);
                return record;
            }
        };

        let claims = match decode::<Value>(jwt, &key, &signature_only_validation(header.alg)) {
            Ok(data) => data.claims,
            Err(e) => {
                warn!("visa signature not verified by {}: {}", anchor.display_name, e);
                return record;
            }
        };
        debug!("visa signature verified by {}", anchor.display_name);

        let visa = claims.get(VISA_CLAIM);
        let string_claim = |owner: Option<&Value>, name: &str| owner.and_then(|o| o.get(name)).and_then(Value::as_str).map(str::to_string);
        let int_claim = |owner: Option<&Value>, name: &str| owner.and_then(|o| o.get(name)).and_then(timestamp);

        record.subject = string_claim(Some(&claims), "sub");
        record.issuer = string_claim(Some(&claims), "iss");
        record.visa_type = string_claim(visa, "type");
        record.value = string_claim(visa, "value");
        record.source = string_claim(visa, "source");
        let exp = int_claim(Some(&claims), "exp");
        let asserted = int_claim(visa, "asserted");
        let by = string_claim(visa, "by");

        let (Some(sub), Some(iss), Some(exp), Some(visa_type), Some(value), Some(_source), Some(asserted), Some(_by)) = (
            record.subject.as_deref(),
            record.issuer.as_deref(),
            exp,
            record.visa_type.as_deref(),
            record.value.as_deref(),
            record.source.as_deref(),
            asserted,
            by,
        ) else {
            warn!("visa from {} is missing required claims: {}", anchor.display_name, claims);
            return record;
        };

        if exp <= now {
            warn!("visa from {} expired at {}", anchor.display_name, iso_date(exp));
            return record;
        }
        if asserted > now {
            warn!("visa from {} asserted in future {}", anchor.display_name, iso_date(asserted));
            return record;
        }

        record.summary = Some(format!("{}:  \"{}\" asserted {}", visa_type, value, iso_date(asserted)));
        record.linked_identity = Some(format!("{},{}", form_urlencode(sub), form_urlencode(iss)));
        record.verified = true;
        info!("{}", record);
        record
    }
}

/// Reads a NumericDate claim; fractional seconds are truncated.
fn timestamp(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= i64::MIN as f64 && *secs <= i64::MAX as f64)
            .map(|secs| secs as i64)
    })
}
