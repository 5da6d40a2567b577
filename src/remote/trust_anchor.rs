// src/remote/trust_anchor.rs
//! Trust anchors for inbound visas.
//!
//! Maps the `jku` of a third-party visa to the public key set of a configured
//! signer. The key sets are fetched once when the registry is loaded and are
//! read-only afterwards.

use crate::config::SignerConfig;
use crate::models::jwk::JwkSet;
use log::{error, info, warn};
use reqwest::Url;
use std::collections::HashMap;

/// A trusted remote signer and its public keys.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustAnchor {
    /// Human readable signer name used in logs
    pub display_name: String,
    /// URL the key set was published at
    pub jwks_url: String,
    pub keys: JwkSet,
}

/// Issuer key URL to trust anchor lookup.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorRegistry {
    anchors: HashMap<String, TrustAnchor>,
}

impl TrustAnchorRegistry {
    /// Builds a registry from already fetched anchors.
    pub fn from_anchors(anchors: Vec<TrustAnchor>) -> Self {
        let anchors = anchors
            .into_iter()
            .map(|anchor| (normalize_url(&anchor.jwks_url), anchor))
            .collect();
        Self { anchors }
    }

    /// Fetches the key set of every configured signer.
    ///
    /// Signers with a malformed URL are skipped. A signer whose key set cannot
    /// be fetched stays registered without keys, so its visas are rejected
    /// with a precise log message instead of being reported as untrusted.
    pub async fn load(client: &reqwest::Client, signers: &[SignerConfig]) -> Self {
        let mut anchors = Vec::with_capacity(signers.len());

        for signer in signers {
            if let Err(e) = Url::parse(&signer.jwks) {
                error!("cannot add signer {} with key set URL {}: {}", signer.name, signer.jwks, e);
                continue;
            }

            let keys = match fetch_key_set(client, &signer.jwks).await {
                Ok(keys) => {
                    info!("JWKS Signer {} added with keys {}", signer.name, signer.jwks);
                    keys
                }
                Err(e) => {
                    warn!("cannot fetch key set of signer {} from {}: {}", signer.name, signer.jwks, e);
                    JwkSet::default()
                }
            };

            anchors.push(TrustAnchor {
                display_name: signer.name.clone(),
                jwks_url: signer.jwks.clone(),
                keys,
            });
        }

        Self::from_anchors(anchors)
    }

    /// Trust anchor registered for a `jku`.
    pub fn get(&self, jku: &str) -> Option<&TrustAnchor> {
        self.anchors.get(&normalize_url(jku))
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

async fn fetch_key_set(client: &reqwest::Client, url: &str) -> Result<JwkSet, reqwest::Error> {
    client.get(url).send().await?.error_for_status()?.json::<JwkSet>().await
}

/// Canonical form of a URL for lookups; unparsable input is used verbatim.
fn normalize_url(url: &str) -> String {
    Url::parse(url).map(String::from).unwrap_or_else(|_| url.to_string())
}
