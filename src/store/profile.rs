// src/store/profile.rs

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Persisted;
use crate::error::StoreError;
use crate::storage::KeyValueStore;

pub const NAMESPACE: &str = "user-profile-storage";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: String,
    pub username: String,
    /// `data:` URL of the avatar image.
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            username: "User".to_string(),
            profile_picture: None,
        }
    }
}

pub struct UserProfileStore {
    state: Persisted<UserProfile>,
}

impl UserProfileStore {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Ok(Self {
            state: Persisted::load(storage, NAMESPACE)?,
        })
    }

    pub fn get(&self) -> &UserProfile {
        self.state.get()
    }

    pub fn set_user_id(&mut self, user_id: &str) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        self.state.update(|p| p.user_id = user_id)
    }

    pub fn update(&mut self, username: &str, profile_picture: Option<String>) -> Result<(), StoreError> {
        let username = username.to_string();
        self.state.update(|p| {
            p.username = username;
            p.profile_picture = profile_picture;
        })
    }
}
