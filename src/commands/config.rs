// src/commands/config.rs

use crate::error::ChatError;
use crate::state::{lock, AppState};
use crate::store::{ApiConfig, ModelOption};
use crate::types::Toast;

pub fn get_config(state: &AppState) -> ApiConfig {
    lock(&state.api_config).get().clone()
}

pub fn save_config(state: &AppState, base_url: &str, api_key: &str) -> Result<ApiConfig, ChatError> {
    let mut config = lock(&state.api_config);
    config.save(base_url, api_key)?;
    tracing::info!("[config] endpoint set to {}", config.get().base_url);
    Ok(config.get().clone())
}

/// Fetch the endpoint's models, store them and select the first one.
/// Failures are reported as an error toast as well as returned.
pub async fn check_models(state: &AppState) -> Result<Vec<ModelOption>, ChatError> {
    let (base_url, api_key) = {
        let config = lock(&state.api_config);
        let c = config.get();
        (c.base_url.clone(), c.api_key.clone())
    };
    if base_url.is_empty() || api_key.is_empty() {
        let e = ChatError::NotConfigured("base URL and API key are required".to_string());
        state.toast(Toast::error(e.to_string()));
        return Err(e);
    }

    match state.client.list_models(&base_url, &api_key).await {
        Ok(models) => {
            lock(&state.api_config).set_available_models(models.clone())?;
            state.toast(Toast::success(format!("Successfully found {} models!", models.len())));
            Ok(models)
        }
        Err(e) => {
            tracing::warn!("[config] model check failed: {e}");
            state.toast(Toast::error(e.to_string()));
            Err(e)
        }
    }
}

pub fn select_model(state: &AppState, model_id: &str) -> Result<(), ChatError> {
    let mut config = lock(&state.api_config);
    let known = config.get().available_models.is_empty()
        || config.get().available_models.iter().any(|m| m.id == model_id);
    if !known {
        return Err(ChatError::NotConfigured(format!("unknown model '{model_id}'")));
    }
    config.select_model(model_id)?;
    Ok(())
}

pub fn reset_config(state: &AppState) -> Result<(), ChatError> {
    lock(&state.api_config).reset()?;
    state.toast(Toast::info("API configuration cleared"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::storage::MemoryStore;

    #[test]
    fn test_save_normalizes_and_marks_configured() {
        let state = AppState::hydrate(Arc::new(MemoryStore::new())).unwrap();
        let config = save_config(&state, " api.example.com/v1/ ", " sk-test ").unwrap();
        assert_eq!(config.base_url, "https://api.example.com/v1");
        assert_eq!(config.api_key, "sk-test");
        assert!(config.is_configured);
        assert!(!config.is_ready());
    }

    #[test]
    fn test_select_model_checks_known_models() {
        let state = AppState::hydrate(Arc::new(MemoryStore::new())).unwrap();
        lock(&state.api_config)
            .set_available_models(vec![ModelOption {
                id: "m1".to_string(),
                name: "m1".to_string(),
            }])
            .unwrap();

        assert!(select_model(&state, "m2").is_err());
        assert!(select_model(&state, "m1").is_ok());
        assert_eq!(get_config(&state).selected_model, "m1");
    }

    #[tokio::test]
    async fn test_check_models_requires_credentials() {
        let state = AppState::hydrate(Arc::new(MemoryStore::new())).unwrap();
        let mut events = state.subscribe();
        assert!(matches!(check_models(&state).await, Err(ChatError::NotConfigured(_))));
        assert!(matches!(events.recv().await.unwrap(), crate::types::ChatEvent::Toast(_)));
    }
}
