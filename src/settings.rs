// src/settings.rs

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage::KeyValueStore;
use crate::store::Persisted;

pub const NAMESPACE: &str = "settings-storage";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub enum MessageDisplayDensity {
    #[default]
    Comfortable,
    Compact,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub enum PreferredLanguage {
    #[default]
    English,
    Spanish,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub version: u32,
    #[serde(default)]
    pub message_display_density: MessageDisplayDensity,
    #[serde(default)]
    pub preferred_language: PreferredLanguage,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            message_display_density: MessageDisplayDensity::default(),
            preferred_language: PreferredLanguage::default(),
        }
    }
}

impl FromStr for MessageDisplayDensity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "comfortable" => Ok(Self::Comfortable),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown density '{other}' (comfortable | compact)")),
        }
    }
}

impl FromStr for PreferredLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "spanish" | "es" => Ok(Self::Spanish),
            other => Err(format!("unknown language '{other}' (english | spanish)")),
        }
    }
}

impl fmt::Display for MessageDisplayDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for PreferredLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct SettingsStore {
    state: Persisted<AppSettings>,
}

impl SettingsStore {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        Ok(Self {
            state: Persisted::load(storage, NAMESPACE)?,
        })
    }

    pub fn get(&self) -> &AppSettings {
        self.state.get()
    }

    pub fn set_density(&mut self, density: MessageDisplayDensity) -> Result<(), StoreError> {
        self.state.update(|s| s.message_display_density = density)
    }

    pub fn set_language(&mut self, language: PreferredLanguage) -> Result<(), StoreError> {
        self.state.update(|s| s.preferred_language = language)
    }

    /// Back to defaults (for reset functionality)
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.state.update(|s| *s = AppSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_settings_round_trip() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut settings = SettingsStore::load(storage.clone()).unwrap();
        assert_eq!(settings.get(), &AppSettings::default());

        settings.set_density("compact".parse().unwrap()).unwrap();
        settings.set_language("es".parse().unwrap()).unwrap();

        let reloaded = SettingsStore::load(storage).unwrap();
        assert_eq!(reloaded.get().message_display_density, MessageDisplayDensity::Compact);
        assert_eq!(reloaded.get().preferred_language, PreferredLanguage::Spanish);
    }

    #[test]
    fn test_parse_rejects_unknown_values() {
        assert!("dense".parse::<MessageDisplayDensity>().is_err());
        assert!("klingon".parse::<PreferredLanguage>().is_err());
    }
}
