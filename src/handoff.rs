//! Handoff Module
//!
//! Login handshake with the companion app over custom URL schemes.
//!
//! Outbound: `studyplus://external_app/<command>/<consumerKey>/<consumerSecret>`
//! Inbound:  `studyplus-<consumerKey>://{auth-result|login-result}/{success/<token>[/<username>] | fail[/<code>] | cancel}`

use tracing::{debug, warn};
use url::Url;

use crate::auth::{FailureCode, LoginError};
use crate::config::{CallbackVariant, Configuration};

/// Scheme registered by the companion app
pub const URL_SCHEME: &str = "studyplus";

const CALLBACK_HOSTS: [&str; 2] = ["auth-result", "login-result"];

/// Command sent to the companion app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchCommand {
    Auth,
}

impl LaunchCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
        }
    }
}

/// Result of parsing one inbound callback URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Success {
        token: String,
        username: Option<String>,
    },
    Failure(LoginError),
    Cancelled,
    /// Addressed to this app but with a malformed payload
    Invalid(String),
    /// Uses this app's callback scheme but not the callback layout
    Rejected(String),
    /// Not a callback of this protocol; another handler may own it
    Unrecognized(String),
}

/// Builds launch URIs and parses callbacks for one configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct HandoffProtocol {
    variant: CallbackVariant,
}

impl HandoffProtocol {
    pub fn new(variant: CallbackVariant) -> Self {
        Self { variant }
    }

    /// Scheme the companion app calls back on for this consumer key
    pub fn callback_scheme(config: &Configuration) -> String {
        format!("{}-{}", URL_SCHEME, config.consumer_key)
    }

    pub fn launch_uri(&self, config: &Configuration, command: LaunchCommand) -> String {
        format!(
            "{}://external_app/{}/{}/{}",
            URL_SCHEME,
            command.as_str(),
            urlencoding::encode(&config.consumer_key),
            urlencoding::encode(&config.consumer_secret),
        )
    }

    pub fn parse_callback(&self, config: &Configuration, uri: &str) -> HandshakeOutcome {
        let unrecognized = || HandshakeOutcome::Unrecognized(uri.to_string());
        let invalid = || HandshakeOutcome::Invalid(uri.to_string());
        let rejected = || HandshakeOutcome::Rejected(uri.to_string());

        if !config.is_configured() {
            return unrecognized();
        }

        let Ok(url) = Url::parse(uri) else {
            return unrecognized();
        };

        if !url
            .scheme()
            .eq_ignore_ascii_case(&Self::callback_scheme(config))
        {
            return unrecognized();
        }

        match url.host_str() {
            Some(host) if CALLBACK_HOSTS.contains(&host) => {}
            _ => {
                warn!("Callback on our scheme with an unexpected host: {}", uri);
                return rejected();
            }
        }

        let segments: Vec<&str> = match url.path_segments() {
            Some(segments) => segments.collect(),
            None => return rejected(),
        };

        let Some(outcome) = segments.first().filter(|s| !s.is_empty()) else {
            warn!("Callback on our scheme without an outcome: {}", uri);
            return rejected();
        };

        debug!("Dispatching callback outcome: {}", outcome);

        match *outcome {
            "success" => {
                let Some(token) = segments.get(1).and_then(|s| decode_segment(s)) else {
                    warn!("Success callback without a token");
                    return invalid();
                };
                let username = segments.get(2).and_then(|s| decode_segment(s));
                HandshakeOutcome::Success { token, username }
            }
            "fail" => match self.variant {
                CallbackVariant::Current => HandshakeOutcome::Failure(LoginError::ApplicationError),
                CallbackVariant::Coded => {
                    match segments
                        .get(1)
                        .and_then(|s| decode_segment(s))
                        .and_then(|s| s.parse::<i64>().ok())
                    {
                        Some(code) => HandshakeOutcome::Failure(LoginError::Failed(FailureCode::from(code))),
                        None => {
                            warn!("Fail callback with a missing or malformed error code");
                            invalid()
                        }
                    }
                }
            },
            "cancel" => HandshakeOutcome::Cancelled,
            _ => unrecognized(),
        }
    }
}

/// Percent-decoded, whitespace-trimmed segment; `None` when empty
fn decode_segment(segment: &str) -> Option<String> {
    let decoded = urlencoding::decode(segment).ok()?;
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Opens URIs with whatever the platform has registered for them
pub trait UriOpener: Send + Sync {
    fn open(&self, uri: &str) -> Result<(), OpenError>;
}

impl<T: UriOpener + ?Sized> UriOpener for std::sync::Arc<T> {
    fn open(&self, uri: &str) -> Result<(), OpenError> {
        (**self).open(uri)
    }
}

/// Delegates to the desktop's URL handler
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl UriOpener for SystemOpener {
    fn open(&self, uri: &str) -> Result<(), OpenError> {
        open::that(uri).map_err(|e| OpenError::NoHandler(e.to_string()))
    }
}

/// Launch errors
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("No handler for URI: {0}")]
    NoHandler(String),
}
