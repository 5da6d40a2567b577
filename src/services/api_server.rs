// src/services/api_server.rs
//! HTTP interface of the passport issuer.
//!
//! Endpoints:
//! - `GET /jwk` publishes the public keys visas are signed with
//! - `GET /ga4gh/:user_id` returns the passport of a user as a JSON array of
//!   compact visa JWTs

use crate::config::JWK_PATH;
use crate::error::PassportError;
use crate::services::passport_assembler::PassportAssembler;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::{error, info, warn};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// API server state shared with every handler.
#[derive(Clone)]
pub struct ApiServer {
    assembler: Arc<PassportAssembler>,
}

impl ApiServer {
    pub fn new(assembler: Arc<PassportAssembler>) -> Self {
        Self { assembler }
    }

    /// Routes of the service, bound to this server's state.
    pub fn router(&self) -> Router {
        Router::new()
            .route(JWK_PATH, get(Self::jwk_handler))
            .route("/ga4gh/:user_id", get(Self::passport_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Binds to `addr` and serves requests until the process stops.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("passport API listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// Publishes the service's public JWK Set
    ///
    /// # Endpoint
    /// GET /jwk
    async fn jwk_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        Json(state.assembler.signing_service().public_keys())
    }

    /// Assembles the passport of a user
    ///
    /// # Endpoint
    /// GET /ga4gh/:user_id
    ///
    /// # Responses
    /// - 200 OK: JSON array of visa JWTs
    /// - 404 Not Found: the user has no subject identifier
    /// - 500 Internal Server Error: the registry or configuration failed
    async fn passport_handler(Path(user_id): Path<u64>, State(state): State<Arc<ApiServer>>) -> Response {
        match state.assembler.assemble(user_id).await {
            Ok(passport) => (StatusCode::OK, Json(passport)).into_response(),
            Err(e @ PassportError::SubjectNotFound(_)) => {
                warn!("{}", e);
                (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
            }
            Err(e) => {
                error!("passport assembly for user {} failed: {}", user_id, e);
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{InMemoryAttributeSource, UserRecord};
    use crate::config::AttributeNames;
    use crate::models::attribute::{Attribute, AttributeValue};
    use crate::models::jwk::JwkSet;
    use crate::remote::claim_repository::ClaimRepositoryClient;
    use crate::remote::trust_anchor::TrustAnchorRegistry;
    use crate::services::passport_assembler::PassportSettings;
    use crate::services::visa_factory::VisaFactory;
    use crate::services::visa_verifier::VisaVerifier;
    use crate::wallet::key_management::SigningService;
    use crate::wallet::key_store::KeyStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn server() -> ApiServer {
        let signing = Arc::new(SigningService::new(
            KeyStore::from_json(include_str!("../../tests/fixtures/keystore.json")).unwrap(),
            Some("rsa1".into()),
            None,
        ));
        let mut user = UserRecord::default();
        user.attributes.insert(
            "sub".into(),
            Attribute {
                value: AttributeValue::String("alice@elixir-europe.org".into()),
                created_at: None,
            },
        );
        user.groups.insert(10432);

        let assembler = PassportAssembler::new(
            Arc::new(InMemoryAttributeSource::new().with_user(1, user)),
            VisaFactory::new(signing, "https://login.example.org/oidc/", "https://login.example.org/oidc/jwk"),
            ClaimRepositoryClient::new(reqwest::Client::new(), &[], "elixir_id", Duration::from_secs(1)),
            VisaVerifier::new(Arc::new(TrustAnchorRegistry::default())),
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
            },
        );
        ApiServer::new(Arc::new(assembler))
    }

    async fn get(uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = server()
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body.to_vec())
    }

    #[tokio::test]
    async fn publishes_public_keys_only() {
        let (status, content_type, body) = get("/jwk").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));

        let jwks: JwkSet = serde_json::from_slice(&body).unwrap();
        let kids: Vec<_> = jwks.keys.iter().filter_map(|k| k.kid.as_deref()).collect();
        assert!(kids.contains(&"rsa1"));
        assert!(!kids.contains(&"hmac1"));
        assert!(jwks.keys.iter().all(|k| k.k.is_none()));
    }

    #[tokio::test]
    async fn serves_passport_as_array() {
        let (status, _, body) = get("/ga4gh/1").await;
        assert_eq!(status, StatusCode::OK);

        let visas: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(visas.len(), 1);
        assert_eq!(visas[0].split('.').count(), 3);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (status, _, _) = get("/ga4gh/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = get("/ga4gh/not-a-number").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
