// src/error.rs
//! Error types for the passport issuer.
//!
//! Only configuration-level failures ever reach the caller of
//! [`PassportAssembler::assemble`](crate::services::passport_assembler::PassportAssembler::assemble).
//! Everything that can go wrong with a single visa or a single remote
//! repository is logged and recovered where it happens.

use thiserror::Error;

/// Errors raised while loading or validating the service configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration value is missing or empty
    #[error("Missing required configuration field: {0}")]
    MissingField(&'static str),

    /// A configuration value is present but unusable
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// The configuration source could not be read or deserialized
    #[error("Cannot read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// Errors raised while reading the JSON Web Key store.
#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// The keystore file could not be read
    #[error("Key set resource could not be read: {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The keystore file is not a valid JWK set
    #[error("Key set resource could not be parsed: {path}: {source}")]
    Unparsable {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while signing a JWT.
#[derive(Error, Debug)]
pub enum SigningError {
    /// No default signer key is configured or resolvable
    #[error("No default signer available (key id: {0:?})")]
    NoDefaultSigner(Option<String>),

    /// No signer supports the requested algorithm
    #[error("No signer supports algorithm {0:?}")]
    UnsupportedAlgorithm(jsonwebtoken::Algorithm),

    /// The underlying JWT encoder failed
    #[error("Failed to sign JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Errors reported by an [`AttributeSource`](crate::attributes::AttributeSource).
#[derive(Error, Debug)]
pub enum AttributeSourceError {
    /// The identity registry could not be reached
    #[error("Attribute source unavailable: {0}")]
    Unavailable(String),

    /// The registry answered with something that is not a valid attribute
    #[error("Invalid attribute {attribute}: {reason}")]
    InvalidAttribute { attribute: String, reason: String },

    /// The backing file could not be read
    #[error("Cannot read attribute store: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not valid JSON
    #[error("Cannot parse attribute store: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal errors surfaced to the caller of a passport request.
#[derive(Error, Debug)]
pub enum PassportError {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Keystore could not be loaded
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    /// The user has no subject identifier in the registry
    #[error("No subject identifier found for user {0}")]
    SubjectNotFound(u64),

    /// The registry failed while resolving the subject identifier
    #[error(transparent)]
    AttributeSource(#[from] AttributeSourceError),
}

/// Result type for passport operations
pub type Result<T> = std::result::Result<T, PassportError>;
