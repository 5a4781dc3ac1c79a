// src/commands/profile.rs

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::StoreError;
use crate::settings::{AppSettings, MessageDisplayDensity, PreferredLanguage};
use crate::state::{lock, AppState};
use crate::store::UserProfile;
use crate::types::Toast;

const MAX_AVATAR_BYTES: u64 = 2 * 1024 * 1024;

pub fn get_profile(state: &AppState) -> UserProfile {
    lock(&state.profile).get().clone()
}

/// Give a fresh profile a stable local id.
pub fn ensure_user_id(state: &AppState) -> Result<String, StoreError> {
    let mut profile = lock(&state.profile);
    if profile.get().user_id.is_empty() {
        profile.set_user_id(&uuid::Uuid::new_v4().to_string())?;
    }
    Ok(profile.get().user_id.clone())
}

pub fn update_username(state: &AppState, username: &str) -> Result<bool, StoreError> {
    let username = username.trim();
    if username.is_empty() {
        state.toast(Toast::error("Username cannot be empty"));
        return Ok(false);
    }

    let mut profile = lock(&state.profile);
    let picture = profile.get().profile_picture.clone();
    profile.update(username, picture)?;
    drop(profile);

    state.toast(Toast::success("Profile updated successfully"));
    Ok(true)
}

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Store the image at `path` as the avatar, encoded as a `data:` URL.
pub fn set_avatar_from_file(state: &AppState, path: &Path) -> Result<bool, StoreError> {
    let Some(mime) = image_mime(path) else {
        state.toast(Toast::error("Please choose an image file"));
        return Ok(false);
    };
    if std::fs::metadata(path)?.len() > MAX_AVATAR_BYTES {
        state.toast(Toast::error("Image is too large (max 2 MB)"));
        return Ok(false);
    }

    let bytes = std::fs::read(path)?;
    let url = format!("data:{mime};base64,{}", STANDARD.encode(bytes));

    let mut profile = lock(&state.profile);
    let username = profile.get().username.clone();
    profile.update(&username, Some(url))?;
    drop(profile);

    state.toast(Toast::success("Profile picture updated"));
    Ok(true)
}

pub fn clear_avatar(state: &AppState) -> Result<(), StoreError> {
    let mut profile = lock(&state.profile);
    let username = profile.get().username.clone();
    profile.update(&username, None)
}

pub fn get_settings(state: &AppState) -> AppSettings {
    lock(&state.settings).get().clone()
}

pub fn set_density(state: &AppState, density: MessageDisplayDensity) -> Result<(), StoreError> {
    lock(&state.settings).set_density(density)
}

pub fn set_language(state: &AppState, language: PreferredLanguage) -> Result<(), StoreError> {
    lock(&state.settings).set_language(language)
}

pub fn reset_settings(state: &AppState) -> Result<(), StoreError> {
    lock(&state.settings).reset()
}
