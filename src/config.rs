// src/config.rs
//! Service configuration.
//!
//! Loaded once at startup from a YAML (or TOML/JSON) file, with environment
//! overrides using the `PASSPORT__` prefix and `__` as nesting separator,
//! e.g. `PASSPORT__DEFAULT_SIGNER_KEY_ID=rsa2`.
//!
//! ```yaml
//! issuer: https://login.example.org/oidc/
//! org_url: https://elixir-europe.org/
//! bona_fide_group_id: 10432
//! attributes:
//!   subject: urn:perun:user:attribute-def:virt:login-namespace:elixir-persistent
//!   affiliations: urn:perun:user:attribute-def:virt:eduPersonScopedAffiliations
//!   group_affiliations: urn:perun:group:attribute-def:def:groupAffiliations
//!   bona_fide_status: urn:perun:user:attribute-def:def:elixirBonaFideStatus
//!   bona_fide_status_rems: urn:perun:user:attribute-def:def:elixirBonaFideStatusREMS
//! keystore: /etc/passport/keystore.json
//! default_signer_key_id: rsa1
//! default_signing_algorithm: RS256
//! repos:
//!   - name: REMS
//!     url: https://permissions.example.org/api/permissions/{elixir_id}
//!     auth_header: x-api-key
//!     auth_value: secret
//! signers:
//!   - name: REMS
//!     jwks: https://permissions.example.org/api/jwk
//! ```

use crate::error::ConfigError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Terms of use a bona fide researcher accepts
pub const DEFAULT_BONA_FIDE_URL: &str = "https://doi.org/10.1038/s41431-018-0219-y";

/// Placeholder name used in claim repository URL templates
pub const DEFAULT_SUBJECT_PLACEHOLDER: &str = "elixir_id";

/// Path of the JWKS endpoint relative to the issuer
pub const JWK_PATH: &str = "/jwk";

fn default_bona_fide_url() -> String {
    DEFAULT_BONA_FIDE_URL.to_string()
}

fn default_subject_placeholder() -> String {
    DEFAULT_SUBJECT_PLACEHOLDER.to_string()
}

fn default_repository_timeout_secs() -> u64 {
    30
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// Identifiers of the registry attributes the producers read.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AttributeNames {
    /// Attribute holding the subject identifier (`sub` of issued visas)
    pub subject: String,
    /// User affiliations (AffiliationAndRole, ResearcherStatus)
    pub affiliations: String,
    /// Group affiliations (ResearcherStatus asserted by a signing official)
    pub group_affiliations: String,
    /// Bona fide status accepted by the user (AcceptedTermsAndPolicies)
    pub bona_fide_status: String,
    /// Bona fide status asserted by a peer (ResearcherStatus)
    pub bona_fide_status_rems: String,
}

/// An external authority republishing visas about a subject.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ClaimRepositoryConfig {
    pub name: String,
    /// URL template with a `{<subject_placeholder>}` placeholder
    pub url: String,
    pub auth_header: String,
    pub auth_value: String,
}

/// A trusted remote visa signer.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SignerConfig {
    pub name: String,
    /// JWKS URL; visas must carry exactly this URL as `jku`
    pub jwks: String,
}

/// Complete passport issuer configuration.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PassportConfig {
    /// `iss` of issued visas; the JWKS is published at `<issuer>/jwk`
    pub issuer: String,

    /// Organisation URL used as `source` of system asserted visas
    pub org_url: String,

    /// `value` of AcceptedTermsAndPolicies and ResearcherStatus visas
    #[serde(default = "default_bona_fide_url")]
    pub bona_fide_url: String,

    /// Members of this group have accepted the bona fide terms
    pub bona_fide_group_id: u64,

    pub attributes: AttributeNames,

    /// Path of the JWK Set keystore
    pub keystore: String,

    #[serde(default)]
    pub default_signer_key_id: Option<String>,

    #[serde(default)]
    pub default_signing_algorithm: Option<String>,

    #[serde(default = "default_subject_placeholder")]
    pub subject_placeholder: String,

    #[serde(default = "default_repository_timeout_secs")]
    pub repository_timeout_secs: u64,

    #[serde(default)]
    pub repos: Vec<ClaimRepositoryConfig>,

    #[serde(default)]
    pub signers: Vec<SignerConfig>,

    /// Socket address of the HTTP server
    #[serde(default = "default_listen")]
    pub listen: String,

    /// JSON file backing the in-memory attribute source
    #[serde(default)]
    pub attribute_store: Option<String>,
}

impl PassportConfig {
    /// Loads configuration from a file with `PASSPORT__*` environment overrides.
    ///
    /// # Errors
    /// - [`ConfigError::Source`] if the file cannot be read or deserialized
    /// - [`ConfigError::MissingField`] if a required value is empty
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("PASSPORT").prefix_separator("__").separator("__"))
            .build()?;

        let config: PassportConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every required value is non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("issuer", &self.issuer),
            ("org_url", &self.org_url),
            ("keystore", &self.keystore),
            ("subject_placeholder", &self.subject_placeholder),
            ("attributes.subject", &self.attributes.subject),
            ("attributes.affiliations", &self.attributes.affiliations),
            ("attributes.group_affiliations", &self.attributes.group_affiliations),
            ("attributes.bona_fide_status", &self.attributes.bona_fide_status),
            ("attributes.bona_fide_status_rems", &self.attributes.bona_fide_status_rems),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }
        if self.repository_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "repository_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// `jku` header value of issued visas.
    pub fn jku(&self) -> String {
        format!("{}{}", self.issuer.trim_end_matches('/'), JWK_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str) -> String {
        format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    #[test]
    fn loads_yaml_with_defaults() {
        let config = PassportConfig::load(path("passport.yaml")).unwrap();

        assert_eq!(config.issuer, "https://login.example.org/oidc/");
        assert_eq!(config.bona_fide_url, DEFAULT_BONA_FIDE_URL);
        assert_eq!(config.subject_placeholder, "elixir_id");
        assert_eq!(config.bona_fide_group_id, 10432);
        assert_eq!(config.repos.len(), 2);
        assert_eq!(config.repos[0].auth_header, "x-api-key");
        assert_eq!(config.signers[0].jwks, "https://permissions.example.org/api/jwk");
        assert_eq!(config.default_signing_algorithm.as_deref(), Some("RS256"));
    }

    #[test]
    fn jku_drops_trailing_slash() {
        let config = PassportConfig::load(path("passport.yaml")).unwrap();
        assert_eq!(config.jku(), "https://login.example.org/oidc/jwk");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            PassportConfig::load(path("does-not-exist.yaml")),
            Err(ConfigError::Source(_))
        ));
    }

    #[test]
    fn empty_required_field_is_rejected() {
        let mut config = PassportConfig::load(path("passport.yaml")).unwrap();
        config.attributes.subject = " ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField("attributes.subject"))
        ));
    }
}
