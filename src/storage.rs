//! Secure Storage Module
//!
//! One credential slot per service identifier. `set` always clears the slot
//! before writing, so a lookup never sees more than one credential.
//!
//! Backends:
//! - `KeyringStorage`: the OS keychain (Keychain, Credential Manager, Secret Service)
//! - `SecureStorage`: one file per service, encrypted with DPAPI on Windows
//! - `MemoryStorage`: in-process stand-in for tests

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::auth::Credential;

#[cfg(windows)]
use windows::Win32::Security::Cryptography::{
    CryptProtectData, CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN, CRYPT_INTEGER_BLOB,
};

/// Keyed credential storage scoped by service identifier
pub trait CredentialStore: Send + Sync {
    /// Stored credential, `None` when the slot is empty or unreadable
    fn get(&self, service_id: &str) -> Option<Credential>;

    /// Replace whatever is stored for `service_id`
    fn set(&self, service_id: &str, credential: &Credential) -> Result<(), StorageError>;

    /// Clear the slot. Idempotent; failures are logged, not returned.
    fn delete_all(&self, service_id: &str);
}

impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    fn get(&self, service_id: &str) -> Option<Credential> {
        (**self).get(service_id)
    }

    fn set(&self, service_id: &str, credential: &Credential) -> Result<(), StorageError> {
        (**self).set(service_id, credential)
    }

    fn delete_all(&self, service_id: &str) {
        (**self).delete_all(service_id)
    }
}

/// File-backed storage, encrypted with DPAPI on Windows
pub struct SecureStorage {
    storage_path: PathBuf,
}

impl SecureStorage {
    /// Storage under the local data directory
    pub fn new() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("StudyplusSDK")
            .join("credentials");
        Self::with_path(storage_path)
    }

    /// Storage rooted at a custom directory
    pub fn with_path(storage_path: PathBuf) -> Self {
        if let Err(e) = std::fs::create_dir_all(&storage_path) {
            error!("Failed to create storage directory: {}", e);
        }

        debug!("Secure storage initialized at: {:?}", storage_path);

        Self { storage_path }
    }

    // Percent-encoded so distinct service ids never share a file
    fn file_path(&self, service_id: &str) -> PathBuf {
        let name = urlencoding::encode(service_id);
        self.storage_path.join(format!("{}.dat", name))
    }

    fn load(&self, service_id: &str) -> Result<Credential, StorageError> {
        let sealed = std::fs::read(self.file_path(service_id))
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let opened = unprotect(&sealed)?;

        serde_json::from_slice(&opened).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn remove(&self, service_id: &str) -> Result<(), StorageError> {
        let file_path = self.file_path(service_id);

        match std::fs::remove_file(&file_path) {
            Ok(()) => {
                info!("Deleted stored credential for service: {}", service_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

impl Default for SecureStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for SecureStorage {
    fn get(&self, service_id: &str) -> Option<Credential> {
        match self.load(service_id) {
            Ok(credential) => Some(credential),
            Err(StorageError::Io(_)) => None,
            Err(e) => {
                warn!("Stored credential for {} is unreadable: {}", service_id, e);
                None
            }
        }
    }

    fn set(&self, service_id: &str, credential: &Credential) -> Result<(), StorageError> {
        self.remove(service_id)?;

        let json = serde_json::to_vec(credential)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let sealed = protect(&json)?;

        let file_path = self.file_path(service_id);
        if let Err(e) = write_owner_only(&file_path, &sealed) {
            let _ = std::fs::remove_file(&file_path);
            return Err(StorageError::Io(e.to_string()));
        }

        info!("Saved credential for service: {}", service_id);
        Ok(())
    }

    fn delete_all(&self, service_id: &str) {
        if let Err(e) = self.remove(service_id) {
            error!("Failed to delete credential for {}: {}", service_id, e);
        }
    }
}

// Created with 0600 on Unix so the token is never readable by others
fn write_owner_only(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(windows)]
fn dpapi(data: &[u8], seal: bool) -> Result<Vec<u8>, StorageError> {
    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };
    let mut output = CRYPT_INTEGER_BLOB {
        cbData: 0,
        pbData: std::ptr::null_mut(),
    };

    // SAFETY: `input` borrows `data` for the duration of the call and the
    // output buffer is copied before being released with LocalFree.
    unsafe {
        let result = if seal {
            CryptProtectData(&input, None, None, None, None, CRYPTPROTECT_UI_FORBIDDEN, &mut output)
        } else {
            CryptUnprotectData(&input, None, None, None, None, CRYPTPROTECT_UI_FORBIDDEN, &mut output)
        };

        if result.is_err() {
            return Err(if seal {
                StorageError::Encryption("DPAPI encryption failed".into())
            } else {
                StorageError::Decryption("DPAPI decryption failed".into())
            });
        }

        let bytes = std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();

        windows::Win32::Foundation::LocalFree(windows::Win32::Foundation::HLOCAL(
            output.pbData as *mut std::ffi::c_void,
        ));

        Ok(bytes)
    }
}

#[cfg(windows)]
fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    dpapi(data, true)
}

#[cfg(windows)]
fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    dpapi(data, false)
}

// Elsewhere the file is owner-only (0600); prefer KeyringStorage there.
#[cfg(not(windows))]
fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    Ok(data.to_vec())
}

#[cfg(not(windows))]
fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    Ok(data.to_vec())
}

/// Storage in the operating system keychain
pub struct KeyringStorage;

impl KeyringStorage {
    const ACCOUNT: &'static str = "credential";

    pub fn new() -> Self {
        Self
    }

    fn entry(service_id: &str, account: &str) -> Result<keyring::Entry, StorageError> {
        keyring::Entry::new(service_id, account).map_err(|e| StorageError::Keychain(e.to_string()))
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStorage {
    fn get(&self, service_id: &str) -> Option<Credential> {
        let entry = Self::entry(service_id, Self::ACCOUNT).ok()?;

        match entry.get_password() {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    warn!("Keychain credential for {} is unreadable: {}", service_id, e);
                    None
                }
            },
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!("Keychain lookup failed for {}: {}", service_id, e);
                None
            }
        }
    }

    fn set(&self, service_id: &str, credential: &Credential) -> Result<(), StorageError> {
        self.delete_all(service_id);

        let json = serde_json::to_string(credential)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Self::entry(service_id, Self::ACCOUNT)?
            .set_password(&json)
            .map_err(|e| StorageError::Keychain(e.to_string()))?;

        info!("Saved credential to keychain for service: {}", service_id);
        Ok(())
    }

    fn delete_all(&self, service_id: &str) {
        let Ok(entry) = Self::entry(service_id, Self::ACCOUNT) else {
            return;
        };
        match entry.delete_credential() {
            Ok(()) => debug!("Deleted keychain entry for service: {}", service_id),
            Err(keyring::Error::NoEntry) => {}
            Err(e) => error!("Failed to delete keychain entry for {}: {}", service_id, e),
        }
    }
}

/// In-memory storage, not persistent
#[derive(Default)]
pub struct MemoryStorage {
    slots: RwLock<HashMap<String, Credential>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots across all service identifiers
    pub fn len(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryStorage {
    fn get(&self, service_id: &str) -> Option<Credential> {
        self.slots.read().ok()?.get(service_id).cloned()
    }

    fn set(&self, service_id: &str, credential: &Credential) -> Result<(), StorageError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        slots.remove(service_id);
        slots.insert(service_id.to_string(), credential.clone());
        Ok(())
    }

    fn delete_all(&self, service_id: &str) {
        match self.slots.write() {
            Ok(mut slots) => {
                slots.remove(service_id);
            }
            Err(e) => error!("Memory storage lock poisoned: {}", e),
        }
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
