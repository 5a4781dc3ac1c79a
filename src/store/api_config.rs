// src/store/api_config.rs

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Persisted;
use crate::error::{ChatError, StoreError};
use crate::storage::KeyValueStore;

pub const NAMESPACE: &str = "api-config-storage";

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").expect("valid scheme regex"));

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub available_models: Vec<ModelOption>,
    #[serde(default)]
    pub selected_model: String,
    #[serde(default)]
    pub is_configured: bool,
}

impl ApiConfig {
    /// Everything a completion request needs is present.
    pub fn ensure_ready(&self) -> Result<(), ChatError> {
        let missing = if !self.is_configured {
            "endpoint has not been saved"
        } else if self.base_url.is_empty() {
            "base URL is missing"
        } else if self.api_key.is_empty() {
            "API key is missing"
        } else if self.selected_model.is_empty() {
            "no model selected"
        } else {
            return Ok(());
        };
        Err(ChatError::NotConfigured(missing.to_string()))
    }

    pub fn is_ready(&self) -> bool {
        self.ensure_ready().is_ok()
    }
}

/// Trim, drop trailing slashes and default to `https://` when no scheme is
/// given.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if SCHEME.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

pub struct ApiConfigStore {
    state: Persisted<ApiConfig>,
}

impl ApiConfigStore {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Ok(Self {
            state: Persisted::load(storage, NAMESPACE)?,
        })
    }

    pub fn get(&self) -> &ApiConfig {
        self.state.get()
    }

    /// Persist a new endpoint + key and mark the configuration usable.
    pub fn save(&mut self, base_url: &str, api_key: &str) -> Result<(), StoreError> {
        let base_url = normalize_base_url(base_url);
        let api_key = api_key.trim().to_string();
        self.state.update(|c| {
            c.base_url = base_url;
            c.api_key = api_key;
            c.is_configured = true;
        })
    }

    /// Replace the model list and select its first entry.
    pub fn set_available_models(&mut self, models: Vec<ModelOption>) -> Result<(), StoreError> {
        self.state.update(|c| {
            c.selected_model = models.first().map(|m| m.id.clone()).unwrap_or_default();
            c.available_models = models;
        })
    }

    pub fn select_model(&mut self, model_id: &str) -> Result<(), StoreError> {
        let model_id = model_id.to_string();
        self.state.update(|c| c.selected_model = model_id)
    }

    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.state.update(|c| *c = ApiConfig::default())
    }
}
