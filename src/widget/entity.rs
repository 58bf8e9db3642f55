// SPDX-License-Identifier: MPL-2.0

//! # Camera Entity Resolution
//!
//! Looks up a camera entity on the Home Assistant REST API and extracts its
//! `entity_picture` attribute, a server-relative path such as
//! `/api/camera_proxy/camera.front?token=...`.
//!
//! ## API Integration
//!
//! - State: `GET {server}/api/states/{entity_id}` with a bearer token
//!
//! ## Error Handling
//!
//! - 404: the entity does not exist
//! - Missing or null `entity_picture`: attribute missing
//! - Anything else (timeouts, non-success status, bad JSON): transport failure

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ResolveError;

/// Attribute holding the relative picture URL of a camera entity.
pub const PICTURE_ATTRIBUTE: &str = "entity_picture";

/// Resolves an entity id to its current picture path.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve_picture_url(&self, entity_id: &str) -> Result<String, ResolveError>;
}

/// Supplies the base URL of the server the picture paths are relative to.
pub trait UrlRepository: Send + Sync {
    fn base_url(&self) -> String;
}

/// A fixed base URL, taken from the config.
#[derive(Debug, Clone)]
pub struct StaticUrl(pub String);

impl UrlRepository for StaticUrl {
    fn base_url(&self) -> String {
        self.0.clone()
    }
}

/// Join the server base URL and a relative picture path.
///
/// One trailing slash is stripped from the base, the path is appended as is.
pub fn display_url(base_url: &str, picture_path: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    format!("{}{}", base, picture_path)
}

/// Entity state as returned by `/api/states/{entity_id}`.
#[derive(Debug, Deserialize)]
struct EntityState {
    #[serde(default)]
    attributes: serde_json::Map<String, Value>,
}

/// Extract the picture path from a decoded entity state.
fn entity_picture(entity_id: &str, state: &EntityState) -> Result<String, ResolveError> {
    match state.attributes.get(PICTURE_ATTRIBUTE) {
        Some(Value::String(path)) => Ok(path.clone()),
        None | Some(Value::Null) => Err(ResolveError::AttributeMissing {
            entity_id: entity_id.to_string(),
            attribute: PICTURE_ATTRIBUTE,
        }),
        Some(other) => Ok(other.to_string()),
    }
}

/// [`EntityResolver`] backed by the Home Assistant REST API.
pub struct HomeAssistantClient {
    client: reqwest::Client,
    urls: Arc<dyn UrlRepository>,
    access_token: String,
}

impl HomeAssistantClient {
    pub fn new(
        urls: Arc<dyn UrlRepository>,
        access_token: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        // Use a client with timeout to prevent a dead server from stalling refreshes
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            urls,
            access_token,
        })
    }

    fn state_url(&self, entity_id: &str) -> String {
        display_url(
            &self.urls.base_url(),
            &format!("/api/states/{}", urlencoding::encode(entity_id)),
        )
    }
}

#[async_trait]
impl EntityResolver for HomeAssistantClient {
    async fn resolve_picture_url(&self, entity_id: &str) -> Result<String, ResolveError> {
        let url = self.state_url(entity_id);
        log::debug!("Requesting entity state: {}", url);

        let transport = |e: reqwest::Error| ResolveError::Transport {
            details: e.to_string(),
        };

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolveError::EntityNotFound {
                entity_id: entity_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ResolveError::Transport {
                details: format!("{} returned {}", url, status),
            });
        }

        let state: EntityState = response.json().await.map_err(|e| ResolveError::Transport {
            details: format!("invalid state for {}: {}", entity_id, e),
        })?;
        entity_picture(entity_id, &state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_display_url_strips_one_trailing_slash() {
        assert_eq!(
            display_url("http://host:8123/", "/api/camera_proxy/camera.front"),
            "http://host:8123/api/camera_proxy/camera.front"
        );
        assert_eq!(
            display_url("http://host:8123", "/api/camera_proxy/camera.front"),
            "http://host:8123/api/camera_proxy/camera.front"
        );
        assert_eq!(display_url("http://host:8123//", "/x"), "http://host:8123//x");
    }

    fn parse(body: &str) -> Result<String, ResolveError> {
        let state: EntityState = serde_json::from_str(body).unwrap();
        entity_picture("camera.front", &state)
    }

    #[test]
    fn test_entity_picture_from_state() {
        let body = r#"{
            "entity_id": "camera.front",
            "state": "idle",
            "attributes": {
                "friendly_name": "Front door",
                "entity_picture": "/api/camera_proxy/camera.front?token=abc"
            }
        }"#;
        assert_eq!(parse(body).unwrap(), "/api/camera_proxy/camera.front?token=abc");
        assert_eq!(parse(r#"{"attributes": {"entity_picture": 42}}"#).unwrap(), "42");
    }

    #[test]
    fn test_missing_or_null_attribute() {
        for body in [
            r#"{"entity_id": "camera.front", "attributes": {}}"#,
            r#"{"entity_id": "camera.front", "attributes": {"entity_picture": null}}"#,
            r#"{"entity_id": "camera.front"}"#,
        ] {
            assert_eq!(
                parse(body),
                Err(ResolveError::AttributeMissing {
                    entity_id: String::from("camera.front"),
                    attribute: PICTURE_ATTRIBUTE,
                })
            );
        }
    }

    #[test]
    fn test_state_url_encodes_entity_id() {
        let client = HomeAssistantClient::new(
            Arc::new(StaticUrl(String::from("http://host:8123/"))),
            String::from("token"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.state_url("camera.front door"),
            "http://host:8123/api/states/camera.front%20door"
        );
    }

    fn client_for(server: &MockServer) -> HomeAssistantClient {
        HomeAssistantClient::new(
            Arc::new(StaticUrl(format!("{}/", server.uri()))),
            String::from("secret"),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/camera.front"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entity_id": "camera.front",
                "state": "idle",
                "attributes": {"entity_picture": "/api/camera_proxy/camera.front?token=abc"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let picture = client_for(&server).resolve_picture_url("camera.front").await;
        assert_eq!(picture, Ok(String::from("/api/camera_proxy/camera.front?token=abc")));
    }

    #[tokio::test]
    async fn test_resolve_unknown_entity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/camera.gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message": "Entity not found."}"#))
            .mount(&server)
            .await;

        let err = client_for(&server).resolve_picture_url("camera.gone").await.unwrap_err();
        assert_eq!(
            err,
            ResolveError::EntityNotFound {
                entity_id: String::from("camera.gone"),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_server_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/camera.front"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&server)
            .await;

        let err = client_for(&server).resolve_picture_url("camera.front").await.unwrap_err();
        assert!(matches!(err, ResolveError::Transport { ref details } if details.contains("500")));
    }

    #[tokio::test]
    async fn test_resolve_missing_attribute() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/camera.front"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entity_id": "camera.front",
                "state": "unavailable",
                "attributes": {"friendly_name": "Front door"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).resolve_picture_url("camera.front").await.unwrap_err();
        assert!(matches!(err, ResolveError::AttributeMissing { .. }));
    }

    #[tokio::test]
    async fn test_resolve_invalid_body_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/camera.front"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).resolve_picture_url("camera.front").await.unwrap_err();
        assert!(matches!(err, ResolveError::Transport { .. }));
    }
}
