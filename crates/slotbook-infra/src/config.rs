//! Configuration loader for slotbook.
//!
//! Reads `config.toml` from the data directory (`~/.slotbook/` in production)
//! and deserializes it into [`BookingConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use slotbook_types::config::BookingConfig;

/// Resolve the data directory.
///
/// Priority:
/// 1. `SLOTBOOK_DATA_DIR` environment variable
/// 2. `~/.slotbook`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SLOTBOOK_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".slotbook");
    }

    PathBuf::from(".slotbook")
}

/// SQLite URL of the booking database inside `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("slotbook.db").display())
}

/// Load booking configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults.
/// - Unreadable or unparsable file: logs a warning, defaults.
///
/// The result is always normalized (window floor, batch size clamp, timeout floor).
pub async fn load_booking_config(data_dir: &Path) -> BookingConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return BookingConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return BookingConfig::default();
        }
    };

    match toml::from_str::<BookingConfig>(&content) {
        Ok(config) => config.normalized(),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            BookingConfig::default()
        }
    }
}
