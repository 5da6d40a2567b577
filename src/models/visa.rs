// src/models/visa.rs
//! GA4GH Passport visa data model.
//!
//! Implements the claim layout of the
//! [GA4GH Passport v1](https://github.com/ga4gh-duri/ga4gh-duri.github.io/blob/master/researcher_ids/ga4gh_passport_v1.md)
//! format:
//!
//! ```text
//! header: { alg, kid, typ: "JWT", jku: "<issuer>/jwk" }
//! claims: { iss, iat, exp, sub, jti, ga4gh_visa_v1: { type, asserted, value, source, by, condition? } }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the visa object claim inside a visa JWT
pub const VISA_CLAIM: &str = "ga4gh_visa_v1";

/// Name of the visa array member returned by claim repositories
pub const PASSPORT_CLAIM: &str = "ga4gh_passport_v1";

/// Standard visa types.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisaType {
    AffiliationAndRole,
    AcceptedTermsAndPolicies,
    ResearcherStatus,
    ControlledAccessGrants,
    LinkedIdentities,
}

impl VisaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisaType::AffiliationAndRole => "AffiliationAndRole",
            VisaType::AcceptedTermsAndPolicies => "AcceptedTermsAndPolicies",
            VisaType::ResearcherStatus => "ResearcherStatus",
            VisaType::ControlledAccessGrants => "ControlledAccessGrants",
            VisaType::LinkedIdentities => "LinkedIdentities",
        }
    }
}

impl fmt::Display for VisaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asserted a visa (`by` member).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VisaAuthority {
    /// The subject asserted it themselves
    #[serde(rename = "self")]
    SelfAsserted,
    /// A peer vouched for the subject
    Peer,
    /// Derived automatically by the issuing system
    System,
    /// Signing official of the subject's organisation
    So,
    /// Data access committee
    Dac,
}

impl VisaAuthority {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisaAuthority::SelfAsserted => "self",
            VisaAuthority::Peer => "peer",
            VisaAuthority::System => "system",
            VisaAuthority::So => "so",
            VisaAuthority::Dac => "dac",
        }
    }
}

impl fmt::Display for VisaAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The facts a visa is built from, before any temporal policy or signing.
///
/// All timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Visa {
    pub visa_type: VisaType,
    pub value: String,
    pub source: String,
    pub by: VisaAuthority,
    pub asserted: i64,
    pub expires: i64,
    pub subject: String,
    pub condition: Option<serde_json::Value>,
}

impl Visa {
    /// `asserted <= now < expires`
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.asserted <= now && now < self.expires
    }
}

/// The `ga4gh_visa_v1` claim object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VisaObject {
    #[serde(rename = "type")]
    pub visa_type: String,
    pub asserted: i64,
    pub value: String,
    pub source: String,
    pub by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

/// Full claim set of an issued visa JWT.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VisaClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub sub: String,
    pub jti: String,
    pub ga4gh_visa_v1: VisaObject,
}

/// Outcome of verifying one inbound visa.
///
/// Only `verified` records with a linked identity are folded into a passport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifiedVisaRecord {
    /// The compact JWT as received
    pub jwt: String,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub visa_type: Option<String>,
    pub value: Option<String>,
    pub source: Option<String>,
    /// Display name of the trust anchor matching the `jku`
    pub signer: Option<String>,
    /// `urlencode(sub),urlencode(iss)`
    pub linked_identity: Option<String>,
    /// Short human readable description of the payload
    pub summary: Option<String>,
    pub verified: bool,
}

impl VerifiedVisaRecord {
    pub fn unverified(jwt: impl Into<String>) -> Self {
        Self {
            jwt: jwt.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for VerifiedVisaRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "visa(verified={}, sub={}, iss={}, type={}, value={}, linked_identity={})",
            self.verified,
            self.subject.as_deref().unwrap_or("-"),
            self.issuer.as_deref().unwrap_or("-"),
            self.visa_type.as_deref().unwrap_or("-"),
            self.value.as_deref().unwrap_or("-"),
            self.linked_identity.as_deref().unwrap_or("-"),
        )?;
        if let Some(summary) = &self.summary {
            write!(f, " {}, signed by {}", summary, self.signer.as_deref().unwrap_or("unknown"))?;
        }
        Ok(())
    }
}

/// An ordered list of compact visa JWTs for one subject.
///
/// Serializes as a bare JSON array.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Passport {
    visas: Vec<String>,
}

impl Passport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, jwt: String) {
        self.visas.push(jwt);
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, jwts: I) {
        self.visas.extend(jwts);
    }

    pub fn visas(&self) -> &[String] {
        &self.visas
    }

    pub fn len(&self) -> usize {
        self.visas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visas.is_empty()
    }
}
