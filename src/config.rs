//! Application-level configuration loading: the estimation-series catalog
//! and the plan-tier feature table.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::room::PlanTier;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "STORYDECK_BACK_CONFIG_PATH";

/// Participant and room limits granted by a plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanFeatures {
    /// Maximum concurrently present members per room.
    pub max_participants: usize,
    /// Maximum simultaneously active rooms per account.
    pub max_active_rooms: usize,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    series: IndexMap<String, Vec<String>>,
    free: PlanFeatures,
    pro: PlanFeatures,
    enterprise: PlanFeatures,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to the baked-in
    /// catalog and plan table.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        series = config.series.len(),
                        "loaded series catalog and plan table from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Selectable values for a scale, when the key is known.
    pub fn series_values(&self, key: &str) -> Option<&[String]> {
        self.series.get(key).map(Vec::as_slice)
    }

    /// Names of all known scales, in catalog order.
    pub fn series_keys(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Limits granted by a plan tier.
    pub fn plan_features(&self, tier: PlanTier) -> PlanFeatures {
        match tier {
            PlanTier::Free => self.free,
            PlanTier::Pro => self.pro,
            PlanTier::Enterprise => self.enterprise,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            series: default_series(),
            free: PlanFeatures {
                max_participants: 5,
                max_active_rooms: 1,
            },
            pro: PlanFeatures {
                max_participants: 15,
                max_active_rooms: 10,
            },
            enterprise: PlanFeatures {
                max_participants: 100,
                max_active_rooms: 100,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file. Every section is
/// optional; omitted sections keep their defaults.
struct RawConfig {
    #[serde(default)]
    series: Option<IndexMap<String, Vec<String>>>,
    #[serde(default)]
    plans: Option<RawPlans>,
}

#[derive(Debug, Deserialize)]
struct RawPlans {
    #[serde(default)]
    free: Option<RawPlanFeatures>,
    #[serde(default)]
    pro: Option<RawPlanFeatures>,
    #[serde(default)]
    enterprise: Option<RawPlanFeatures>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlanFeatures {
    max_participants: usize,
    max_active_rooms: usize,
}

impl From<RawPlanFeatures> for PlanFeatures {
    fn from(value: RawPlanFeatures) -> Self {
        Self {
            max_participants: value.max_participants,
            max_active_rooms: value.max_active_rooms,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        let plans = value.plans;
        let pick = |raw: Option<RawPlanFeatures>, fallback: PlanFeatures| {
            raw.map(Into::into).unwrap_or(fallback)
        };

        let (free, pro, enterprise) = match plans {
            Some(raw) => (
                pick(raw.free, defaults.free),
                pick(raw.pro, defaults.pro),
                pick(raw.enterprise, defaults.enterprise),
            ),
            None => (defaults.free, defaults.pro, defaults.enterprise),
        };

        Self {
            series: value.series.unwrap_or(defaults.series),
            free,
            pro,
            enterprise,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in estimation scales shipped with the binary.
fn default_series() -> IndexMap<String, Vec<String>> {
    let owned = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

    let mut series = IndexMap::new();
    series.insert(
        "fibonacci".to_string(),
        owned(&[
            "0", "1", "2", "3", "5", "8", "13", "21", "34", "55", "89", "?", "∞",
        ]),
    );
    series.insert(
        "shortFibonacci".to_string(),
        owned(&["0", "½", "1", "2", "3", "5", "8", "13", "20", "40", "100", "?"]),
    );
    series.insert(
        "tShirt".to_string(),
        owned(&["XXS", "XS", "S", "M", "L", "XL", "XXL", "?"]),
    );
    series.insert(
        "powersOfTwo".to_string(),
        owned(&["0", "1", "2", "4", "8", "16", "32", "64", "?"]),
    );
    series
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_known_scales() {
        let config = AppConfig::default();
        let fibonacci = config.series_values("fibonacci").unwrap();
        assert_eq!(fibonacci.first().map(String::as_str), Some("0"));
        assert!(fibonacci.contains(&"?".to_string()));
        assert!(config.series_values("unknown").is_none());
    }

    #[test]
    fn default_free_tier_limits() {
        let config = AppConfig::default();
        let features = config.plan_features(PlanTier::Free);
        assert_eq!(features.max_participants, 5);
        assert_eq!(features.max_active_rooms, 1);
    }

    #[test]
    fn partial_config_overrides_only_named_sections() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"plans": {"free": {"maxParticipants": 3, "maxActiveRooms": 2}}}"#)
                .unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.plan_features(PlanTier::Free).max_participants, 3);
        assert_eq!(config.plan_features(PlanTier::Pro).max_participants, 15);
        assert!(config.series_values("fibonacci").is_some());
    }
}
