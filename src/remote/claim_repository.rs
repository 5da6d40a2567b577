// src/remote/claim_repository.rs
//! Client for external claim repositories.
//!
//! A claim repository republishes visas about a subject at an authenticated
//! URL. The expected response body is:
//!
//! ```json
//! { "ga4gh_passport_v1": [ "<compact JWT>", ... ] }
//! ```
//!
//! Repositories are untrusted and may be slow or broken. Every failure mode
//! (network error, timeout, HTTP error, malformed body) degrades to an empty
//! contribution for that repository only. HTTP 404 means the subject is not
//! linked at the repository and is not treated as a failure at all.

use crate::config::ClaimRepositoryConfig;
use crate::models::visa::PASSPORT_CLAIM;
use crate::utils::serialization::expand_template;
use futures::future::join_all;
use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// A configured repository with its prepared authentication header.
#[derive(Debug, Clone)]
pub struct ClaimRepository {
    pub name: String,
    pub url_template: String,
    headers: HeaderMap,
}

impl ClaimRepository {
    /// Validates a repository configuration.
    ///
    /// # Returns
    /// `None` (logged) if the URL or authentication fields are empty or the
    /// header cannot be represented in HTTP.
    pub fn from_config(config: &ClaimRepositoryConfig) -> Option<Self> {
        if config.url.is_empty() || config.auth_header.is_empty() || config.auth_value.is_empty() {
            error!("claim repository {} not defined with url|auth_header|auth_value", config.name);
            return None;
        }

        let name = match HeaderName::from_bytes(config.auth_header.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                error!("claim repository {} has invalid auth_header: {}", config.name, e);
                return None;
            }
        };
        let mut value = match HeaderValue::from_str(&config.auth_value) {
            Ok(value) => value,
            Err(e) => {
                error!("claim repository {} has invalid auth_value: {}", config.name, e);
                return None;
            }
        };
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(name, value);

        Some(Self {
            name: config.name.clone(),
            url_template: config.url.clone(),
            headers,
        })
    }
}

/// Visas returned by one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryVisas {
    pub repository: String,
    pub visas: Vec<String>,
}

/// Queries all configured claim repositories for a subject.
pub struct ClaimRepositoryClient {
    client: reqwest::Client,
    repositories: Vec<ClaimRepository>,
    subject_placeholder: String,
    timeout: Duration,
}

impl ClaimRepositoryClient {
    /// Creates a client for the given repositories.
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `configs` - Repository definitions; invalid ones are skipped
    /// * `subject_placeholder` - Placeholder name in the URL templates
    /// * `timeout` - Upper bound for each repository call
    pub fn new(
        client: reqwest::Client,
        configs: &[ClaimRepositoryConfig],
        subject_placeholder: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let repositories = configs
            .iter()
            .filter_map(|config| {
                let repository = ClaimRepository::from_config(config)?;
                info!("GA4GH Claims Repository {} configured at {}", repository.name, repository.url_template);
                Some(repository)
            })
            .collect();

        Self {
            client,
            repositories,
            subject_placeholder: subject_placeholder.into(),
            timeout,
        }
    }

    pub fn repositories(&self) -> &[ClaimRepository] {
        &self.repositories
    }

    /// Queries every repository concurrently.
    ///
    /// Results are returned in configuration order, one entry per repository,
    /// after all calls have finished.
    pub async fn fetch_all(&self, subject: &str) -> Vec<RepositoryVisas> {
        let calls = self.repositories.iter().map(|repository| async move {
            RepositoryVisas {
                repository: repository.name.clone(),
                visas: self.fetch(repository, subject).await,
            }
        });
        join_all(calls).await
    }

    /// Queries a single repository. Never fails; errors yield no visas.
    pub async fn fetch(&self, repository: &ClaimRepository, subject: &str) -> Vec<String> {
        let url = expand_template(&repository.url_template, &[(self.subject_placeholder.as_str(), subject)]);
        debug!("calling Permissions API at {}", url);

        let response = match self
            .client
            .get(&url)
            .headers(repository.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Cannot get dataset permissions from {}: {}", repository.name, e);
                return Vec::new();
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!(
                "Got status 404 from Permissions endpoint {}, subject is not linked at Permissions API",
                repository.url_template
            );
            return Vec::new();
        }
        if !status.is_success() {
            log_http_error(repository, status, response).await;
            return Vec::new();
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                error!("Cannot parse response of {}: {}", repository.name, e);
                return Vec::new();
            }
        };
        debug!("Permissions API response: {}", body);

        extract_visas(&repository.name, &body)
    }
}

async fn log_http_error(repository: &ClaimRepository, status: StatusCode, response: reqwest::Response) {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    error!(
        "HTTP ERROR {} URL {} Content-Type: {}",
        status.as_u16(),
        repository.url_template,
        content_type
    );

    let body = response.text().await.unwrap_or_default();
    if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(json) => error!("{}", json.get("message").and_then(Value::as_str).unwrap_or("")),
            Err(e) => error!("cannot parse error message from JSON: {}", e),
        }
    }
}

/// Pulls the visa JWT strings out of a repository response body.
fn extract_visas(repository: &str, body: &Value) -> Vec<String> {
    let Some(visas) = body.get(PASSPORT_CLAIM).and_then(Value::as_array) else {
        warn!("{} is not an array in response of {}: {}", PASSPORT_CLAIM, repository, body);
        return Vec::new();
    };

    visas
        .iter()
        .filter_map(|visa| match visa.as_str() {
            Some(jwt) => Some(jwt.to_string()),
            None => {
                warn!("element of {} is not a String: {}", PASSPORT_CLAIM, visa);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{mock, Matcher};
    use serde_json::json;

    fn repo(name: &str, path: &str) -> ClaimRepositoryConfig {
        ClaimRepositoryConfig {
            name: name.into(),
            url: format!("{}{}", mockito::server_url(), path),
            auth_header: "x-api-key".into(),
            auth_value: format!("{}-secret", name),
        }
    }

    fn client(configs: &[ClaimRepositoryConfig]) -> ClaimRepositoryClient {
        ClaimRepositoryClient::new(reqwest::Client::new(), configs, "elixir_id", Duration::from_secs(5))
    }

    #[test]
    fn extracts_only_string_elements() {
        let body = json!({ "ga4gh_passport_v1": ["a.b.c", 42, "d.e.f"] });
        assert_eq!(extract_visas("r", &body), vec!["a.b.c", "d.e.f"]);
        assert!(extract_visas("r", &json!({ "ga4gh_passport_v1": "a.b.c" })).is_empty());
        assert!(extract_visas("r", &json!({})).is_empty());
    }

    #[test]
    fn skips_invalid_repository_definitions() {
        let mut missing_auth = repo("a", "/x/{elixir_id}");
        missing_auth.auth_value.clear();
        let mut bad_header = repo("b", "/x/{elixir_id}");
        bad_header.auth_header = "bad header".into();
        let good = repo("c", "/x/{elixir_id}");

        let client = client(&[missing_auth, bad_header, good]);
        assert_eq!(client.repositories().len(), 1);
        assert_eq!(client.repositories()[0].name, "c");
    }

    #[tokio::test]
    async fn sends_auth_header_and_templated_subject() {
        let _m = mock("GET", "/claims-ok/alice%40elixir-europe.org")
            .match_header("x-api-key", "ok-secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ga4gh_passport_v1":["h.p.s"]}"#)
            .create();

        let client = client(&[repo("ok", "/claims-ok/{elixir_id}")]);
        let results = client.fetch_all("alice@elixir-europe.org").await;

        assert_eq!(
            results,
            vec![RepositoryVisas {
                repository: "ok".into(),
                visas: vec!["h.p.s".into()],
            }]
        );
    }

    #[tokio::test]
    async fn failures_degrade_to_empty_results() {
        let _not_found = mock("GET", Matcher::Regex("^/claims-404/".into())).with_status(404).create();
        let _error = mock("GET", Matcher::Regex("^/claims-500/".into()))
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"database down"}"#)
            .create();
        let _garbage = mock("GET", Matcher::Regex("^/claims-garbage/".into()))
            .with_status(200)
            .with_body("<html>")
            .create();

        let configs = vec![
            repo("missing", "/claims-404/{elixir_id}"),
            repo("broken", "/claims-500/{elixir_id}"),
            repo("garbage", "/claims-garbage/{elixir_id}"),
            ClaimRepositoryConfig {
                name: "offline".into(),
                url: "http://127.0.0.1:1/claims/{elixir_id}".into(),
                auth_header: "x-api-key".into(),
                auth_value: "x".into(),
            },
        ];
        let results = client(&configs).fetch_all("bob").await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.visas.is_empty()));
        let names: Vec<_> = results.iter().map(|r| r.repository.as_str()).collect();
        assert_eq!(names, vec!["missing", "broken", "garbage", "offline"]);
    }
}
