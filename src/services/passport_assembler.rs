// src/services/passport_assembler.rs
//! Assembles the GA4GH passport of a user.
//!
//! The passport is built by four producers, run in this order:
//! 1. AffiliationAndRole
//! 2. AcceptedTermsAndPolicies
//! 3. ResearcherStatus
//! 4. ControlledAccessGrants (verified third-party visas followed by the
//!    LinkedIdentities visas derived from them)
//!
//! A failing producer only loses its own visas. The request as a whole fails
//! only when the user has no subject identifier or the registry cannot tell.

use crate::attributes::AttributeSource;
use crate::config::{AttributeNames, PassportConfig};
use crate::error::{AttributeSourceError, PassportError, Result};
use crate::models::visa::{Passport, Visa};
use crate::remote::claim_repository::ClaimRepositoryClient;
use crate::remote::trust_anchor::TrustAnchorRegistry;
use crate::services::visa_factory::{self, VisaContext, VisaFactory};
use crate::services::visa_verifier::VisaVerifier;
use crate::utils::time;
use crate::wallet::key_management::SigningService;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Per-deployment values the producers need.
#[derive(Debug, Clone)]
pub struct PassportSettings {
    pub org_url: String,
    pub bona_fide_url: String,
    pub bona_fide_group_id: u64,
    pub attributes: AttributeNames,
}

impl PassportSettings {
    pub fn from_config(config: &PassportConfig) -> Self {
        Self {
            org_url: config.org_url.clone(),
            bona_fide_url: config.bona_fide_url.clone(),
            bona_fide_group_id: config.bona_fide_group_id,
            attributes: config.attributes.clone(),
        }
    }
}

/// Builds passports from registry attributes and external claim repositories.
pub struct PassportAssembler {
    attributes: Arc<dyn AttributeSource>,
    factory: VisaFactory,
    repositories: ClaimRepositoryClient,
    verifier: VisaVerifier,
    settings: PassportSettings,
}

impl PassportAssembler {
    pub fn new(
        attributes: Arc<dyn AttributeSource>,
        factory: VisaFactory,
        repositories: ClaimRepositoryClient,
        verifier: VisaVerifier,
        settings: PassportSettings,
    ) -> Self {
        Self {
            attributes,
            factory,
            repositories,
            verifier,
            settings,
        }
    }

    /// Wires up all components from configuration.
    ///
    /// Loads the keystore and fetches the key sets of all trusted signers.
    ///
    /// # Errors
    /// Returns a configuration error if the keystore cannot be loaded or the
    /// default signing algorithm is unknown.
    pub async fn from_config(config: &PassportConfig, attributes: Arc<dyn AttributeSource>) -> Result<Self> {
        let signing = Arc::new(SigningService::from_config(
            &config.keystore,
            config.default_signer_key_id.as_deref(),
            config.default_signing_algorithm.as_deref(),
        )?);

        let client = reqwest::Client::new();
        let anchors = TrustAnchorRegistry::load(&client, &config.signers).await;
        if anchors.is_empty() {
            warn!("no trusted signers configured, third-party visas will be rejected");
        } else {
            info!("loaded {} trust anchors", anchors.len());
        }

        let repositories = ClaimRepositoryClient::new(
            client,
            &config.repos,
            config.subject_placeholder.clone(),
            Duration::from_secs(config.repository_timeout_secs),
        );

        Ok(Self::new(
            attributes,
            VisaFactory::from_config(signing, config),
            repositories,
            VisaVerifier::new(Arc::new(anchors)),
            PassportSettings::from_config(config),
        ))
    }

    pub fn signing_service(&self) -> &SigningService {
        self.factory.signing_service()
    }

    /// Assembles the passport of a user at the current time.
    pub async fn assemble(&self, user_id: u64) -> Result<Passport> {
        self.assemble_at(user_id, time::now()).await
    }

    /// Assembles the passport of a user as of `now`.
    ///
    /// # Errors
    /// - [`PassportError::SubjectNotFound`] if the user has no subject identifier
    /// - [`PassportError::AttributeSource`] if the subject cannot be read
    pub async fn assemble_at(&self, user_id: u64, now: i64) -> Result<Passport> {
        let subject = self.subject(user_id).await?;
        let ctx = VisaContext {
            subject: &subject,
            org_url: &self.settings.org_url,
            bona_fide_url: &self.settings.bona_fide_url,
            now,
        };

        let mut passport = Passport::new();

        self.produce(&mut passport, "AffiliationAndRole", self.affiliation_and_role(user_id, &ctx).await, now);
        self.produce(
            &mut passport,
            "AcceptedTermsAndPolicies",
            self.accepted_terms_and_policies(user_id, &ctx).await,
            now,
        );
        passport.extend(self.factory.build_visas(&self.researcher_status(user_id, &ctx).await, now));
        self.controlled_access_grants(&mut passport, &ctx).await;

        debug!("passport for user {} ({}) has {} visas", user_id, subject, passport.len());
        Ok(passport)
    }

    async fn subject(&self, user_id: u64) -> Result<String> {
        let attribute = self
            .attributes
            .user_attribute(user_id, &self.settings.attributes.subject)
            .await?;
        attribute
            .as_ref()
            .and_then(|a| a.value.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(PassportError::SubjectNotFound(user_id))
    }

    fn produce(
        &self,
        passport: &mut Passport,
        producer: &str,
        drafts: std::result::Result<Vec<Visa>, AttributeSourceError>,
        now: i64,
    ) {
        match drafts {
            Ok(drafts) => passport.extend(self.factory.build_visas(&drafts, now)),
            Err(e) => error!("{} visas skipped: {}", producer, e),
        }
    }

    async fn affiliation_and_role(
        &self,
        user_id: u64,
        ctx: &VisaContext<'_>,
    ) -> std::result::Result<Vec<Visa>, AttributeSourceError> {
        let affiliations = self
            .attributes
            .user_affiliations(user_id, &self.settings.attributes.affiliations)
            .await?;
        Ok(visa_factory::affiliation_and_role(ctx, &affiliations))
    }

    async fn accepted_terms_and_policies(
        &self,
        user_id: u64,
        ctx: &VisaContext<'_>,
    ) -> std::result::Result<Vec<Visa>, AttributeSourceError> {
        let is_member = self
            .attributes
            .is_user_in_group(user_id, self.settings.bona_fide_group_id)
            .await?;
        if !is_member {
            return Ok(Vec::new());
        }
        let status = self
            .attributes
            .user_attribute(user_id, &self.settings.attributes.bona_fide_status)
            .await?;
        Ok(visa_factory::accepted_terms_and_policies(ctx, is_member, status.as_ref())
            .into_iter()
            .collect())
    }

    /// The three ResearcherStatus signals read separate attributes; a failed
    /// lookup silences only the signal that depends on it.
    async fn researcher_status(&self, user_id: u64, ctx: &VisaContext<'_>) -> Vec<Visa> {
        let names = &self.settings.attributes;
        let peer_status = self
            .attributes
            .user_attribute(user_id, &names.bona_fide_status_rems)
            .await
            .unwrap_or_else(|e| {
                error!("peer ResearcherStatus skipped: {}", e);
                None
            });
        let affiliations = self
            .attributes
            .user_affiliations(user_id, &names.affiliations)
            .await
            .unwrap_or_else(|e| {
                error!("faculty ResearcherStatus skipped: {}", e);
                Vec::new()
            });
        let group_affiliations = self
            .attributes
            .group_affiliations(user_id, &names.group_affiliations)
            .await
            .unwrap_or_else(|e| {
                error!("signing official ResearcherStatus skipped: {}", e);
                Vec::new()
            });

        visa_factory::researcher_status(ctx, peer_status.as_ref(), &affiliations, &group_affiliations)
    }

    /// Appends verified third-party visas and one LinkedIdentities visa per
    /// distinct `(sub, iss)` they disclose.
    async fn controlled_access_grants(&self, passport: &mut Passport, ctx: &VisaContext<'_>) {
        let mut linked_identities = BTreeSet::new();

        for response in self.repositories.fetch_all(ctx.subject).await {
            for record in self.verifier.verify_all(&response.visas, ctx.now) {
                if !record.verified {
                    debug!("skipping unverified visa from {}", response.repository);
                    continue;
                }
                if let Some(identity) = record.linked_identity {
                    linked_identities.insert(identity);
                }
                passport.push(record.jwt);
            }
        }

        let drafts = visa_factory::linked_identities(ctx, &linked_identities);
        passport.extend(self.factory.build_visas(&drafts, ctx.now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{InMemoryAttributeSource, UserRecord};
    use crate::models::attribute::{Affiliation, Attribute, AttributeValue};
    use crate::wallet::key_store::KeyStore;
    use async_trait::async_trait;
    use jsonwebtoken::Algorithm;
    use serde_json::Value;

    const NOW: i64 = 1_700_000_000;

    fn settings() -> PassportSettings {
        PassportSettings {
            org_url: "https://elixir-europe.org/".into(),
            bona_fide_url: crate::config::DEFAULT_BONA_FIDE_URL.into(),
            bona_fide_group_id: 10432,
            attributes: AttributeNames {
                subject: "sub".into(),
                affiliations: "aff".into(),
                group_affiliations: "gaff".into(),
                bona_fide_status: "bf".into(),
                bona_fide_status_rems: "bf-rems".into(),
            },
        }
    }

    fn assembler(source: Arc<dyn AttributeSource>) -> PassportAssembler {
        let signing = Arc::new(SigningService::new(
            KeyStore::from_json(include_str!("../../tests/fixtures/keystore.json")).unwrap(),
            Some("rsa1".into()),
            Some(Algorithm::RS256),
        ));
        PassportAssembler::new(
            source,
            VisaFactory::new(signing, "https://login.example.org/oidc/", "https://login.example.org/oidc/jwk"),
            ClaimRepositoryClient::new(reqwest::Client::new(), &[], "elixir_id", Duration::from_secs(1)),
            VisaVerifier::new(Arc::new(TrustAnchorRegistry::default())),
            settings(),
        )
    }

    fn attribute(value: &str, created_at: Option<i64>) -> Attribute {
        Attribute {
            value: AttributeValue::String(value.into()),
            created_at,
        }
    }

    fn alice() -> UserRecord {
        let mut user = UserRecord::default();
        user.attributes.insert("sub".into(), attribute("alice@elixir-europe.org", None));
        user.attributes.insert("bf".into(), attribute("true", Some(NOW - 1000)));
        user.groups.insert(10432);
        user.affiliations.insert(
            "aff".into(),
            vec![Affiliation {
                source: "https://idp.muni.cz/".into(),
                value: "faculty@muni.cz".into(),
                asserted: NOW - 100,
            }],
        );
        user
    }

    fn visa_types(passport: &Passport) -> Vec<String> {
        passport
            .visas()
            .iter()
            .map(|jwt| {
                let part = jwt.split('.').nth(1).unwrap();
                let claims: Value =
                    serde_json::from_slice(&base64::decode_config(part, base64::URL_SAFE_NO_PAD).unwrap()).unwrap();
                claims["ga4gh_visa_v1"]["type"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn producers_run_in_order() {
        let source = InMemoryAttributeSource::new().with_user(1, alice());
        let passport = assembler(Arc::new(source)).assemble_at(1, NOW).await.unwrap();

        assert_eq!(
            visa_types(&passport),
            vec!["AffiliationAndRole", "AcceptedTermsAndPolicies", "ResearcherStatus"]
        );
        let issuer = assembler(Arc::new(InMemoryAttributeSource::new()));
        assert!(passport.visas().iter().all(|jwt| issuer.signing_service().verify(jwt)));
    }

    #[tokio::test]
    async fn missing_subject_is_an_error() {
        let mut user = alice();
        user.attributes.remove("sub");
        let source = InMemoryAttributeSource::new().with_user(1, user);

        let result = assembler(Arc::new(source)).assemble_at(1, NOW).await;
        assert!(matches!(result, Err(PassportError::SubjectNotFound(1))));

        let result = assembler(Arc::new(InMemoryAttributeSource::new())).assemble_at(2, NOW).await;
        assert!(matches!(result, Err(PassportError::SubjectNotFound(2))));
    }

    /// Only the subject and affiliations can be read; every other attribute lookup fails.
    struct FlakySource;

    #[async_trait]
    impl AttributeSource for FlakySource {
        async fn user_attribute(
            &self,
            _user_id: u64,
            attribute: &str,
        ) -> std::result::Result<Option<Attribute>, AttributeSourceError> {
            match attribute {
                "sub" => Ok(Some(attribute_value("bob@elixir-europe.org"))),
                _ => Err(AttributeSourceError::Unavailable("registry timeout".into())),
            }
        }

        async fn is_user_in_group(&self, _user_id: u64, _group_id: u64) -> std::result::Result<bool, AttributeSourceError> {
            Ok(true)
        }

        async fn user_affiliations(
            &self,
            _user_id: u64,
            _attribute: &str,
        ) -> std::result::Result<Vec<Affiliation>, AttributeSourceError> {
            Ok(vec![Affiliation {
                source: "https://idp.muni.cz/".into(),
                value: "faculty@muni.cz".into(),
                asserted: NOW,
            }])
        }

        async fn group_affiliations(
            &self,
            _user_id: u64,
            _attribute: &str,
        ) -> std::result::Result<Vec<Affiliation>, AttributeSourceError> {
            Ok(vec![Affiliation {
                source: "https://elixir-europe.org/".into(),
                value: "faculty@elixir-europe.org".into(),
                asserted: NOW,
            }])
        }
    }

    fn attribute_value(value: &str) -> Attribute {
        attribute(value, None)
    }

    #[tokio::test]
    async fn failing_lookup_drops_only_dependent_visas() {
        let passport = assembler(Arc::new(FlakySource)).assemble_at(5, NOW).await.unwrap();

        // AcceptedTermsAndPolicies and the peer signal need the failing status attributes
        assert_eq!(
            visa_types(&passport),
            vec!["AffiliationAndRole", "ResearcherStatus", "ResearcherStatus"]
        );
        let authorities: Vec<String> = passport
            .visas()
            .iter()
            .skip(1)
            .map(|jwt| {
                let part = jwt.split('.').nth(1).unwrap();
                let claims: Value =
                    serde_json::from_slice(&base64::decode_config(part, base64::URL_SAFE_NO_PAD).unwrap()).unwrap();
                claims["ga4gh_visa_v1"]["by"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(authorities, vec!["system", "so"]);
    }
}
