use anyhow::{anyhow, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operational limits for the booking engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Longest rental a single request may cover, in billable days.
    pub max_rental_days: i64,
    /// Open solicitations allowed per item before new ones are refused.
    pub max_pending_per_item: usize,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_rental_days: 90,
            max_pending_per_item: 16,
        }
    }
}

impl BookingConfig {
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let default_config = BookingConfig::default();
        let mut figment = Figment::from(Serialized::defaults(default_config));

        if let Some(path) = path_override {
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
            }
        } else {
            let default_path = PathBuf::from("booking.toml");
            if default_path.exists() {
                figment = figment.merge(Toml::file(default_path));
            }
        }

        figment = figment.merge(Env::prefixed("LUTHIER_BOOKING_"));

        figment
            .extract()
            .map_err(|e| anyhow!("Configuration error: {}", e))
    }

    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }
}
