//! API token persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use petsync_core::signals::TokenSource;
use petsync_core::util::normalize_text_option;

use crate::error::CliError;

pub const ENV_TOKEN: &str = "PETSYNC_TOKEN";

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "petsync-cli";

/// Token slot for one profile
#[derive(Clone)]
pub struct TokenStore {
    username: String,
}

impl TokenStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            username: format!("api_token:{profile_name}"),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, CliError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| CliError::Auth(error.to_string()))
    }

    #[cfg(not(test))]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(normalize_text_option(Some(token))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(CliError::Auth(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        Ok(normalize_text_option(guard.get(&self.username).cloned()))
    }

    #[cfg(not(test))]
    pub fn save(&self, token: &str) -> Result<(), CliError> {
        self.entry()?
            .set_password(token)
            .map_err(|error| CliError::Auth(error.to_string()))
    }

    #[cfg(test)]
    pub fn save(&self, token: &str) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        guard.insert(self.username.clone(), token.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> Result<(), CliError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(CliError::Auth(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::Auth(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Token source for sync sessions: `PETSYNC_TOKEN`, else the keychain.
///
/// The keychain is read on every call so a `petsync auth login` from
/// another shell is picked up by a running `watch`.
pub struct ProfileToken {
    store: TokenStore,
    env_token: Option<String>,
}

impl ProfileToken {
    pub fn new(profile_name: &str) -> Self {
        Self::with_env_token(profile_name, std::env::var(ENV_TOKEN).ok())
    }

    pub fn with_env_token(profile_name: &str, env_token: Option<String>) -> Self {
        Self {
            store: TokenStore::new(profile_name),
            env_token: normalize_text_option(env_token),
        }
    }
}

impl TokenSource for ProfileToken {
    fn token(&self) -> Option<String> {
        if let Some(token) = &self.env_token {
            return Some(token.clone());
        }
        match self.store.load() {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(%error, "Failed to read API token from keychain");
                None
            }
        }
    }
}
