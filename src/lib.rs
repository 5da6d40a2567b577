// src/lib.rs
//! # GA4GH Passport Issuer
//!
//! Issues and verifies [GA4GH Passport v1](https://github.com/ga4gh-duri/ga4gh-duri.github.io/blob/master/researcher_ids/ga4gh_passport_v1.md)
//! visas for users of an identity registry.
//!
//! ## Architecture Overview
//! 1. **Wallet**: keystore loading and the JWT [`SigningService`](wallet::key_management::SigningService)
//! 2. **Remote**: claim repositories and trust anchors of third-party visa issuers
//! 3. **Services**: visa factory, verifier, passport assembler and the HTTP API
//! 4. **Attributes**: boundary to the identity registry

pub mod attributes;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod utils;
pub mod wallet;

pub use error::{PassportError, Result};
