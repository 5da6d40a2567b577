// src/services/visa_factory.rs
//! Visa construction and per-type visa policies.
//!
//! [`VisaFactory::build_visa`] enforces the temporal invariant
//! `asserted <= now < expires`, fills in the GA4GH claim layout and signs
//! the result with the default signer. It never fails: a visa that cannot be
//! built is logged and dropped.
//!
//! The policy functions turn registry facts into [`Visa`] drafts. They are
//! pure, which keeps every visa type testable without keys or a registry.

use crate::config::PassportConfig;
use crate::models::attribute::{Affiliation, Attribute};
use crate::models::visa::{Visa, VisaAuthority, VisaClaims, VisaObject, VisaType};
use crate::utils::time::{iso_date_time, plus_years};
use crate::wallet::key_management::SigningService;
use jsonwebtoken::Header;
use log::{error, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Affiliation prefix marking faculty members (GA4GH interoperability convention)
pub const FACULTY_PREFIX: &str = "faculty@";

/// Builds and signs visas issued by this service.
pub struct VisaFactory {
    signing: Arc<SigningService>,
    issuer: String,
    jku: String,
}

impl VisaFactory {
    /// Creates a factory.
    ///
    /// # Arguments
    /// * `signing` - Shared signing service holding the default signer
    /// * `issuer` - `iss` claim of issued visas
    /// * `jku` - URL of this service's published JWK Set
    pub fn new(signing: Arc<SigningService>, issuer: impl Into<String>, jku: impl Into<String>) -> Self {
        Self {
            signing,
            issuer: issuer.into(),
            jku: jku.into(),
        }
    }

    pub fn from_config(signing: Arc<SigningService>, config: &PassportConfig) -> Self {
        Self::new(signing, config.issuer.clone(), config.jku())
    }

    pub fn signing_service(&self) -> &SigningService {
        &self.signing
    }

    /// Builds and signs one visa.
    ///
    /// # Returns
    /// - `Some(jwt)` with the compact signed visa
    /// - `None` if the visa is asserted in the future, already expired at
    ///   `now` (expiry is exclusive) or cannot be signed
    pub fn build_visa(&self, visa: &Visa, now: i64) -> Option<String> {
        if visa.is_valid_at(now) {
            return self.sign_visa(visa, now);
        }
        if visa.asserted > now {
            warn!(
                "visa asserted in future ! sub {} type {} value {} source {} by {} asserted {}",
                visa.subject,
                visa.visa_type,
                visa.value,
                visa.source,
                visa.by,
                iso_date_time(visa.asserted)
            );
        } else {
            warn!(
                "visa already expired ! sub {} type {} value {} source {} by {} expired {}",
                visa.subject,
                visa.visa_type,
                visa.value,
                visa.source,
                visa.by,
                iso_date_time(visa.expires)
            );
        }
        None
    }

    fn sign_visa(&self, visa: &Visa, now: i64) -> Option<String> {
        let claims = VisaClaims {
            iss: self.issuer.clone(),
            iat: now,
            exp: visa.expires,
            sub: visa.subject.clone(),
            jti: Uuid::new_v4().to_string(),
            ga4gh_visa_v1: VisaObject {
                visa_type: visa.visa_type.to_string(),
                asserted: visa.asserted,
                value: visa.value.clone(),
                source: visa.source.clone(),
                by: visa.by.to_string(),
                condition: visa.condition.clone().filter(|c| !c.is_null()),
            },
        };

        let mut header = Header::default();
        header.typ = Some("JWT".to_string());
        header.jku = Some(self.jku.clone());

        match self.signing.sign(header, &claims) {
            Ok(jwt) => Some(jwt),
            Err(e) => {
                error!("cannot sign {} visa for sub {}: {}", visa.visa_type, visa.subject, e);
                None
            }
        }
    }

    /// Builds every draft, keeping order and dropping the ones that fail.
    pub fn build_visas(&self, visas: &[Visa], now: i64) -> Vec<String> {
        visas.iter().filter_map(|visa| self.build_visa(visa, now)).collect()
    }
}

/// Request-scoped inputs shared by all visa policies.
#[derive(Debug, Clone, Copy)]
pub struct VisaContext<'a> {
    pub subject: &'a str,
    pub org_url: &'a str,
    pub bona_fide_url: &'a str,
    pub now: i64,
}

impl VisaContext<'_> {
    fn visa(
        &self,
        visa_type: VisaType,
        value: &str,
        source: &str,
        by: VisaAuthority,
        asserted: i64,
        expires: i64,
    ) -> Visa {
        Visa {
            visa_type,
            value: value.to_string(),
            source: source.to_string(),
            by,
            asserted,
            expires,
            subject: self.subject.to_string(),
            condition: None,
        }
    }
}

/// One AffiliationAndRole visa per affiliation, valid for a year after assertion.
///
/// Affiliations whose year has already passed are skipped.
pub fn affiliation_and_role(ctx: &VisaContext<'_>, affiliations: &[Affiliation]) -> Vec<Visa> {
    affiliations
        .iter()
        .map(|affiliation| {
            ctx.visa(
                VisaType::AffiliationAndRole,
                &affiliation.value,
                &affiliation.source,
                VisaAuthority::System,
                affiliation.asserted,
                plus_years(affiliation.asserted, 1),
            )
        })
        .filter(|visa| visa.expires >= ctx.now)
        .collect()
}

/// AcceptedTermsAndPolicies visa for members of the bona fide group.
///
/// Asserted when the status attribute was recorded (or now, if unknown) and
/// valid for a hundred years.
pub fn accepted_terms_and_policies(
    ctx: &VisaContext<'_>,
    is_member: bool,
    bona_fide_status: Option<&Attribute>,
) -> Option<Visa> {
    if !is_member {
        return None;
    }
    let asserted = bona_fide_status.and_then(|a| a.created_at).unwrap_or(ctx.now);
    Some(ctx.visa(
        VisaType::AcceptedTermsAndPolicies,
        ctx.bona_fide_url,
        ctx.org_url,
        VisaAuthority::SelfAsserted,
        asserted,
        plus_years(asserted, 100),
    ))
}

/// ResearcherStatus vouched for by a peer, if the status attribute has a creation time.
pub fn peer_researcher_status(ctx: &VisaContext<'_>, status: Option<&Attribute>) -> Option<Visa> {
    let created_at = status?.created_at?;
    Some(ctx.visa(
        VisaType::ResearcherStatus,
        ctx.bona_fide_url,
        ctx.org_url,
        VisaAuthority::Peer,
        created_at,
        plus_years(created_at, 1),
    ))
}

/// ResearcherStatus for every faculty affiliation asserted by an identity provider.
pub fn faculty_researcher_status(ctx: &VisaContext<'_>, affiliations: &[Affiliation]) -> Vec<Visa> {
    affiliations
        .iter()
        .filter(|affiliation| affiliation.value.starts_with(FACULTY_PREFIX))
        .map(|affiliation| {
            ctx.visa(
                VisaType::ResearcherStatus,
                ctx.bona_fide_url,
                &affiliation.source,
                VisaAuthority::System,
                affiliation.asserted,
                plus_years(affiliation.asserted, 1),
            )
        })
        .filter(|visa| visa.expires >= ctx.now)
        .collect()
}

/// ResearcherStatus for every faculty affiliation of the user's groups.
///
/// Group affiliations are maintained by a signing official and are valid for
/// a year from now.
pub fn signing_official_researcher_status(ctx: &VisaContext<'_>, group_affiliations: &[Affiliation]) -> Vec<Visa> {
    group_affiliations
        .iter()
        .filter(|affiliation| affiliation.value.starts_with(FACULTY_PREFIX))
        .map(|affiliation| {
            ctx.visa(
                VisaType::ResearcherStatus,
                ctx.bona_fide_url,
                ctx.org_url,
                VisaAuthority::So,
                affiliation.asserted,
                plus_years(ctx.now, 1),
            )
        })
        .collect()
}

/// All ResearcherStatus visas: peer, faculty and signing official signals.
pub fn researcher_status(
    ctx: &VisaContext<'_>,
    peer_status: Option<&Attribute>,
    affiliations: &[Affiliation],
    group_affiliations: &[Affiliation],
) -> Vec<Visa> {
    peer_researcher_status(ctx, peer_status)
        .into_iter()
        .chain(faculty_researcher_status(ctx, affiliations))
        .chain(signing_official_researcher_status(ctx, group_affiliations))
        .collect()
}

/// One LinkedIdentities visa per distinct linked identity.
pub fn linked_identities(ctx: &VisaContext<'_>, identities: &BTreeSet<String>) -> Vec<Visa> {
    identities
        .iter()
        .map(|identity| {
            ctx.visa(
                VisaType::LinkedIdentities,
                identity,
                ctx.org_url,
                VisaAuthority::System,
                ctx.now,
                plus_years(ctx.now, 1),
            )
        })
        .collect()
}
