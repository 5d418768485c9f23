//! Bearer token lookup for the socket handshake.

use crate::storage::Storage;

/// Storage key the login flow saves the session token under.
pub const TOKEN_KEY: &str = "satoken";

/// Source of the bearer token appended to the socket URL.
///
/// Queried on every connect attempt, so a token saved or cleared by the
/// login flow is picked up by the next reconnect.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Token persisted in [`Storage`] under [`TOKEN_KEY`].
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    storage: Storage,
}

impl StoredCredentials {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn save_token(&self, token: &str) -> bool {
        self.storage.save(TOKEN_KEY, &token)
    }

    pub fn clear_token(&self) {
        self.storage.remove(TOKEN_KEY);
    }
}

impl CredentialStore for StoredCredentials {
    fn token(&self) -> Option<String> {
        self.storage
            .load::<String>(TOKEN_KEY)
            .filter(|token| !token.is_empty())
    }
}

/// A fixed token held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialStore for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}
