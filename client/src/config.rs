use gloo_storage::Storage;
use rollum_shared::LatLng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::surface::SurfaceOptions;

pub const MAP_CONTAINER_ID: &str = "rollum-map";
pub const DEFAULT_STYLE: &str = "mapbox://styles/mapbox/light-v11";
pub const DEFAULT_CENTER: LatLng = LatLng::new(55.7558, 37.6176); // Moscow
pub const DEFAULT_ZOOM: f64 = 12.0;

// Readiness
pub const LOAD_TIMEOUT_MS: f64 = 10_000.0;

// Camera focus
pub const FOCUS_ZOOM: f64 = 16.0;
pub const FOCUS_FLY_DURATION_MS: f64 = 1_500.0;
pub const FOCUS_SETTLE_MS: f64 = 500.0;
pub const FIT_PADDING_PX: f64 = 50.0;
pub const FIT_DURATION_MS: f64 = 1_000.0;
pub const COORD_EPSILON: f64 = 1e-6;

const SETTINGS_KEY: &str = "rollum_map_settings";
const ACCESS_TOKEN_PREFIX: &str = "pk.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("a mapbox access token is required")]
    MissingToken,
    #[error("access token must start with \"pk.\"")]
    InvalidToken,
}

/// Per-browser map settings, persisted to local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub style: String,
    pub center: LatLng,
    pub zoom: f64,
    pub access_token: String,
    pub store_url: String,
    pub store_key: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            style: DEFAULT_STYLE.to_string(),
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            access_token: String::new(),
            store_url: String::new(),
            store_key: String::new(),
        }
    }
}

impl MapConfig {
    pub fn load() -> Self {
        gloo_storage::LocalStorage::get(SETTINGS_KEY).unwrap_or_default()
    }

    pub fn save(&self) {
        if let Err(e) = gloo_storage::LocalStorage::set(SETTINGS_KEY, self) {
            tracing::warn!(error = %e, "failed to persist map settings");
        }
    }

    pub fn surface_options(&self) -> SurfaceOptions {
        SurfaceOptions {
            container_id: MAP_CONTAINER_ID.to_string(),
            style: self.style.clone(),
            center: self.center,
            zoom: self.zoom,
            access_token: self.access_token.clone(),
        }
    }
}

pub fn validate_access_token(token: &str) -> Result<(), ConfigError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ConfigError::MissingToken);
    }
    if !token.starts_with(ACCESS_TOKEN_PREFIX) {
        return Err(ConfigError::InvalidToken);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DEFAULT_CENTER, MapConfig, validate_access_token};

    #[test]
    fn token_must_be_public_mapbox_token() {
        assert_eq!(validate_access_token(""), Err(ConfigError::MissingToken));
        assert_eq!(validate_access_token("   "), Err(ConfigError::MissingToken));
        assert_eq!(validate_access_token("sk.secret"), Err(ConfigError::InvalidToken));
        assert_eq!(validate_access_token(" pk.eyJ1Ijo "), Ok(()));
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let config: MapConfig = serde_json::from_str(r#"{"access_token":"pk.abc"}"#).unwrap();
        assert_eq!(config.access_token, "pk.abc");
        assert_eq!(config.center, DEFAULT_CENTER);
        assert_eq!(config.zoom, 12.0);
        assert_eq!(config.surface_options().container_id, "rollum-map");
    }
}
