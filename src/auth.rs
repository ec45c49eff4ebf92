//! Authentication Module
//!
//! Credential stored after a successful handshake and the login outcomes
//! reported to the host.

use serde::{Deserialize, Serialize};

/// Credential data stored securely per service identifier
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// Failure codes sent by the companion app in the coded callback variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    GetAppDescription,
    AuthFailed,
    LoginFailed,
    Maintenance,
    InvalidSession,
    NetworkUnavailable,
    ServerError,
    PostRecordFailed,
    NotConnected,
    Unexpected(i64),
}

impl FailureCode {
    pub fn code(&self) -> i64 {
        match self {
            Self::GetAppDescription => 1000,
            Self::AuthFailed => 2000,
            Self::LoginFailed => 3000,
            Self::Maintenance => 4000,
            Self::InvalidSession => 5000,
            Self::NetworkUnavailable => 6000,
            Self::ServerError => 7000,
            Self::PostRecordFailed => 8000,
            Self::NotConnected => 9000,
            Self::Unexpected(code) => *code,
        }
    }
}

impl From<i64> for FailureCode {
    fn from(code: i64) -> Self {
        match code {
            1000 => Self::GetAppDescription,
            2000 => Self::AuthFailed,
            3000 => Self::LoginFailed,
            4000 => Self::Maintenance,
            5000 => Self::InvalidSession,
            6000 => Self::NetworkUnavailable,
            7000 => Self::ServerError,
            8000 => Self::PostRecordFailed,
            9000 => Self::NotConnected,
            other => Self::Unexpected(other),
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::GetAppDescription => "failed to get information about the application",
            Self::AuthFailed => "failed to authorize the user",
            Self::LoginFailed => "failed to log in",
            Self::Maintenance => "service is in temporary maintenance",
            Self::InvalidSession => "session is invalid",
            Self::NetworkUnavailable => "network is not available",
            Self::ServerError => "server error",
            Self::PostRecordFailed => "failed to post study record",
            Self::NotConnected => "not connected",
            Self::Unexpected(code) => return write!(f, "unexpected error code {}", code),
        };
        write!(f, "{} ({})", message, self.code())
    }
}

/// Login errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("Unknown URL: {0}")]
    UnknownUrl(String),

    #[error("Companion application reported an error")]
    ApplicationError,

    #[error("Companion application reported failure: {0}")]
    Failed(FailureCode),

    #[error("Login was cancelled")]
    Cancelled,

    #[error("Could not write credential: {0}")]
    StorageWriteFailed(String),
}

/// Notification pushed to subscribers once per handled callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    LoggedIn { username: Option<String> },
    Failed(LoginError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_codes_map_both_ways() {
        for code in [1000, 2000, 3000, 4000, 5000, 6000, 7000, 8000, 9000] {
            assert_eq!(FailureCode::from(code).code(), code);
        }
        assert_eq!(FailureCode::from(1234), FailureCode::Unexpected(1234));
        assert_eq!(FailureCode::from(5000), FailureCode::InvalidSession);
    }

    #[test]
    fn credential_debug_redacts_token() {
        let credential = Credential::new("tok123").with_username("alice");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("tok123"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn credential_without_username_omits_field() {
        let json = serde_json::to_string(&Credential::new("tok")).unwrap();
        assert_eq!(json, r#"{"access_token":"tok"}"#);
    }
}
