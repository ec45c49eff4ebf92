//! Session Module
//!
//! `Studyplus` is the single entry point for the host application: it owns
//! the consumer configuration and wires the handshake, credential storage
//! and API client together.

use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::auth::{Credential, LoginError, LoginEvent};
use crate::config::{ConfigError, Configuration, Settings};
use crate::handoff::{HandoffProtocol, HandshakeOutcome, LaunchCommand, SystemOpener, UriOpener};
use crate::record::{self, StudyRecord};
use crate::storage::{CredentialStore, KeyringStorage};
use crate::sync::{ApiClient, PostError};

/// Prefix of the secure-storage service identifier
pub const SERVICE_NAMESPACE: &str = "studyplus";

const EVENT_CAPACITY: usize = 16;

/// What `handle_callback` did with a URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Not a callback of this protocol
    NotHandled,
    LoggedIn { username: Option<String> },
    Failed(LoginError),
    /// On this app's scheme but not a callback; reported, yet left unhandled
    Rejected(LoginError),
}

impl CallbackOutcome {
    pub fn is_handled(&self) -> bool {
        !matches!(self, Self::NotHandled | Self::Rejected(_))
    }
}

/// Session with the Studyplus companion app
pub struct Studyplus {
    config: RwLock<Configuration>,
    settings: Settings,
    protocol: HandoffProtocol,
    store: Box<dyn CredentialStore>,
    opener: Box<dyn UriOpener>,
    api: ApiClient,
    events: broadcast::Sender<LoginEvent>,
}

impl Studyplus {
    pub fn new(
        config: Configuration,
        settings: Settings,
        store: impl CredentialStore + 'static,
        opener: impl UriOpener + 'static,
    ) -> Result<Self, ConfigError> {
        if !config.is_configured() {
            warn!("Studyplus session created without consumer key and secret");
        }

        let api = ApiClient::new(&settings)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            config: RwLock::new(config),
            protocol: HandoffProtocol::new(settings.callback_variant),
            settings,
            store: Box::new(store),
            opener: Box::new(opener),
            api,
            events,
        })
    }

    /// Session backed by the OS keychain and the desktop URL handler
    pub fn with_defaults(config: Configuration, settings: Settings) -> Result<Self, ConfigError> {
        Self::new(config, settings, KeyringStorage::new(), SystemOpener)
    }

    /// Snapshot of the current configuration
    pub fn configuration(&self) -> Configuration {
        match self.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `studyplus_<consumerKey>`, or `None` while unconfigured
    pub fn service_id(&self) -> Option<String> {
        Self::service_id_for(&self.configuration())
    }

    fn service_id_for(config: &Configuration) -> Option<String> {
        config
            .is_configured()
            .then(|| format!("{}_{}", SERVICE_NAMESPACE, config.consumer_key))
    }

    /// Receive one `LoginEvent` per handled callback
    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.events.subscribe()
    }

    /// Open the companion app's login screen. Completion arrives later
    /// through `handle_callback`.
    pub fn login(&self) {
        let config = self.configuration();
        if !config.is_configured() {
            error!("Cannot log in: consumer key and secret are not set");
            return;
        }

        let uri = self.protocol.launch_uri(&config, LaunchCommand::Auth);
        debug!("Opening companion app for {}", config.consumer_key);

        let Err(e) = self.opener.open(&uri) else {
            return;
        };

        warn!("Companion app unavailable: {}", e);

        if self.settings.open_store_if_not_installed {
            info!("Opening store listing: {}", self.settings.store_url);
            if let Err(e) = self.opener.open(&self.settings.store_url) {
                error!("Failed to open store listing: {}", e);
            }
        }
    }

    /// Forget the stored credential. Idempotent.
    pub fn logout(&self) {
        if let Some(service_id) = self.service_id() {
            self.store.delete_all(&service_id);
            info!("Logged out of {}", service_id);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.credential().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.credential().map(|c| c.access_token)
    }

    pub fn username(&self) -> Option<String> {
        self.credential().and_then(|c| c.username)
    }

    fn credential(&self) -> Option<Credential> {
        self.service_id().and_then(|id| self.store.get(&id))
    }

    /// Submit a study record with the stored access token.
    ///
    /// An `AuthInvalid` response evicts the stored credential before the
    /// error is returned.
    pub async fn post(&self, record: &StudyRecord) -> Result<(), PostError> {
        let Some(service_id) = self.service_id() else {
            return Err(PostError::LoginRequired);
        };
        let Some(credential) = self.store.get(&service_id) else {
            return Err(PostError::LoginRequired);
        };

        if !record::validate(record) {
            return Err(PostError::InvalidDuration);
        }

        if self.settings.dry_run {
            info!("Dry run: study record accepted without posting");
            return Ok(());
        }

        let result = self.api.post_record(&credential.access_token, record).await;

        if result == Err(PostError::AuthInvalid) {
            warn!("Access token rejected; removing credential for {}", service_id);
            self.store.delete_all(&service_id);
        }

        result
    }

    /// Forward a URI the host was asked to open. Returns whether the URI
    /// belonged to this protocol.
    pub fn handle_callback(&self, uri: &str) -> bool {
        self.resolve_callback(uri).is_handled()
    }

    /// Like `handle_callback`, returning the handshake result
    pub fn resolve_callback(&self, uri: &str) -> CallbackOutcome {
        let config = self.configuration();

        let outcome = match self.protocol.parse_callback(&config, uri) {
            HandshakeOutcome::Unrecognized(_) => {
                debug!("Ignoring URI not addressed to Studyplus");
                return CallbackOutcome::NotHandled;
            }
            HandshakeOutcome::Success { token, username } => {
                self.store_credential(&config, Credential { access_token: token, username })
            }
            HandshakeOutcome::Failure(e) => CallbackOutcome::Failed(e),
            HandshakeOutcome::Cancelled => CallbackOutcome::Failed(LoginError::Cancelled),
            HandshakeOutcome::Invalid(uri) => CallbackOutcome::Failed(LoginError::UnknownUrl(uri)),
            HandshakeOutcome::Rejected(uri) => CallbackOutcome::Rejected(LoginError::UnknownUrl(uri)),
        };

        let event = match &outcome {
            CallbackOutcome::LoggedIn { username } => {
                info!("Logged in to Studyplus");
                LoginEvent::LoggedIn {
                    username: username.clone(),
                }
            }
            CallbackOutcome::Failed(e) | CallbackOutcome::Rejected(e) => {
                warn!("Login did not complete: {}", e);
                LoginEvent::Failed(e.clone())
            }
            CallbackOutcome::NotHandled => return CallbackOutcome::NotHandled,
        };

        // No subscribers is fine; the outcome is also returned
        let _ = self.events.send(event);
        outcome
    }

    fn store_credential(&self, config: &Configuration, credential: Credential) -> CallbackOutcome {
        let Some(service_id) = Self::service_id_for(config) else {
            return CallbackOutcome::NotHandled;
        };

        match self.store.set(&service_id, &credential) {
            Ok(()) => CallbackOutcome::LoggedIn {
                username: credential.username,
            },
            Err(e) => {
                error!("Failed to save credential: {}", e);
                CallbackOutcome::Failed(LoginError::StorageWriteFailed(e.to_string()))
            }
        }
    }

    /// Switch to another consumer key and secret. Credentials stored under
    /// the previous key stay in storage but are no longer reachable.
    pub fn change(&self, consumer_key: impl Into<String>, consumer_secret: impl Into<String>) {
        let next = Configuration::new(consumer_key, consumer_secret);
        info!("Switching consumer key to {}", next.consumer_key);

        match self.config.write() {
            Ok(mut config) => *config = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
