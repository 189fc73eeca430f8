//! Environment signals consulted before any sync work: connectivity and the
//! presence of an auth token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Reports whether the device currently has network connectivity
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Synchronous access to the current auth token
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;

    fn has_token(&self) -> bool {
        self.token().is_some()
    }
}

/// Connectivity for hosts without a network probe
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Connectivity flipped by the host from its own network events
#[derive(Debug, Clone)]
pub struct OnlineFlag(Arc<AtomicBool>);

impl OnlineFlag {
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn set(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for OnlineFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed token, trimmed; blank tokens count as absent
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(crate::util::normalize_text_option(token))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token slot shared with an auth flow that may sign in later
#[derive(Clone, Default)]
pub struct SharedToken(Arc<RwLock<Option<String>>>);

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut slot) = self.0.write() {
            *slot = crate::util::normalize_text_option(token);
        }
    }
}

impl TokenSource for SharedToken {
    fn token(&self) -> Option<String> {
        self.0.read().ok().and_then(|slot| slot.clone())
    }
}
