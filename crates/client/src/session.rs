//! The logged-in user, as seen by message handlers.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Minimal profile of the current user.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub user_id: i64,
    pub username: String,
}

/// Read access to the current user's identifier.
pub trait UserStore: Send + Sync {
    fn current_user_id(&self) -> Option<i64>;
}

/// Holds the current user; cleared on logout.
#[derive(Debug, Default)]
pub struct SessionUser {
    user: RwLock<Option<UserData>>,
}

impl SessionUser {
    pub fn new(user: Option<UserData>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    pub fn set(&self, user: Option<UserData>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn get(&self) -> Option<UserData> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UserStore for SessionUser {
    fn current_user_id(&self) -> Option<i64> {
        self.get().map(|u| u.user_id)
    }
}
