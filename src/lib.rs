//! Studyplus SDK Library
//!
//! Delegates login to the Studyplus companion app and posts study records
//! with the access token it hands back.

pub mod auth;
pub mod config;
pub mod handoff;
pub mod logging;
pub mod record;
pub mod session;
pub mod storage;
pub mod sync;

pub use auth::{Credential, FailureCode, LoginError, LoginEvent};
pub use config::{CallbackVariant, ConfigError, Configuration, Settings};
pub use handoff::{HandoffProtocol, HandshakeOutcome, LaunchCommand, SystemOpener, UriOpener};
pub use record::{RecordAmount, RecordError, StudyRecord};
pub use session::{CallbackOutcome, Studyplus};
pub use storage::{CredentialStore, KeyringStorage, MemoryStorage, SecureStorage, StorageError};
pub use sync::{ApiClient, PostError};

/// SDK version
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
