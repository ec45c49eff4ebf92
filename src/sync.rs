//! API Sync Module
//!
//! Handles HTTP communication with the Studyplus API.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, Settings};
use crate::record::{self, StudyRecord};

const API_VERSION: &str = "v1";
const RECORDS_PATH: &str = "study_records";

/// API client for the Studyplus backend
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("studyplus-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Full URL of the record collection
    pub fn records_url(&self) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, RECORDS_PATH)
    }

    /// Submit one study record. A single attempt; no retries.
    pub async fn post_record(&self, access_token: &str, record: &StudyRecord) -> Result<(), PostError> {
        let url = self.records_url();
        let body = record::serialize(record).map_err(|e| {
            error!("Failed to encode study record: {}", e);
            PostError::BadRequest
        })?;

        debug!("Posting study record to: {}", url);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("OAuth {}", access_token))
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    warn!("Study record not sent, offline: {}", e);
                    PostError::Offline
                } else {
                    warn!("Study record not sent: {}", e);
                    PostError::BadRequest
                }
            })?;

        let status = response.status();
        if (200..=204).contains(&status.as_u16()) {
            info!("Study record posted ({})", status);
            return Ok(());
        }

        let error = match status {
            StatusCode::BAD_REQUEST => PostError::InvalidRecord,
            StatusCode::UNAUTHORIZED => PostError::AuthInvalid,
            StatusCode::INTERNAL_SERVER_ERROR => PostError::ServerError,
            StatusCode::SERVICE_UNAVAILABLE => PostError::ServiceUnavailable,
            _ => {
                let text = response.text().await.unwrap_or_default();
                PostError::Unknown {
                    status: status.as_u16(),
                    message: error_message(status, &text),
                }
            }
        };

        warn!("Study record rejected with {}: {}", status, error);
        Err(error)
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(alias = "error")]
    message: String,
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        return parsed.message;
    }

    let body = body.trim();
    if !body.is_empty() {
        return body.chars().take(200).collect();
    }

    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Status: {}", status))
}

/// Post errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostError {
    #[error("Not logged in")]
    LoginRequired,

    #[error("Duration must be between 0 and 86400 seconds")]
    InvalidDuration,

    #[error("Network is offline")]
    Offline,

    #[error("Request could not be completed")]
    BadRequest,

    #[error("Study record was rejected by the server")]
    InvalidRecord,

    #[error("Access token is no longer valid")]
    AuthInvalid,

    #[error("Server error")]
    ServerError,

    #[error("Service is temporarily unavailable")]
    ServiceUnavailable,

    #[error("Unexpected response {status}: {message}")]
    Unknown { status: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(url: String) -> ApiClient {
        ApiClient::new(&Settings {
            api_base_url: url,
            ..Settings::default()
        })
        .unwrap()
    }

    fn record() -> StudyRecord {
        StudyRecord::new(1800).comment("reading")
    }

    #[tokio::test]
    async fn test_post_sends_token_and_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/study_records")
            .match_header("authorization", "OAuth tok123")
            .match_header("content-type", Matcher::Regex("^application/json".into()))
            .match_body(Matcher::PartialJson(serde_json::json!({
                "duration": 1800,
                "comment": "reading",
            })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let result = client(server.url()).post_record("tok123", &record()).await;

        assert_eq!(result, Ok(()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_content_is_success() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/study_records")
            .with_status(204)
            .create_async()
            .await;

        assert_eq!(client(server.url()).post_record("t", &record()).await, Ok(()));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (400, PostError::InvalidRecord),
            (401, PostError::AuthInvalid),
            (500, PostError::ServerError),
            (503, PostError::ServiceUnavailable),
        ];

        for (status, expected) in cases {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("POST", "/v1/study_records")
                .with_status(status)
                .create_async()
                .await;

            let result = client(server.url()).post_record("t", &record()).await;
            assert_eq!(result, Err(expected), "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_unknown_status_carries_message() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/study_records")
            .with_status(429)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"slow down"}"#)
            .create_async()
            .await;

        let result = client(server.url()).post_record("t", &record()).await;

        assert_eq!(
            result,
            Err(PostError::Unknown {
                status: 429,
                message: "slow down".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_status_without_body_uses_reason() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/study_records")
            .with_status(404)
            .create_async()
            .await;

        let result = client(server.url()).post_record("t", &record()).await;

        assert_eq!(
            result,
            Err(PostError::Unknown {
                status: 404,
                message: "Not Found".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_offline() {
        // Nothing listens on the discard port
        let result = client("http://127.0.0.1:9".into()).post_record("t", &record()).await;
        assert_eq!(result, Err(PostError::Offline));
    }

    #[tokio::test]
    async fn test_silent_server_times_out_as_bad_request() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept connections and hold them open without ever replying
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = ApiClient::new(&Settings {
            api_base_url: format!("http://{}", addr),
            timeout_secs: 1,
            ..Settings::default()
        })
        .unwrap();

        assert_eq!(
            client.post_record("t", &record()).await,
            Err(PostError::BadRequest)
        );
        silent.abort();
    }

    #[test]
    fn test_records_url_trims_trailing_slash() {
        assert_eq!(
            client("https://example.test/".into()).records_url(),
            "https://example.test/v1/study_records"
        );
    }
}
