//! Configuration management

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::defaults::{
    EXACT_SEQUENCING_MAX_STOPS, SEQUENCER_TIME_BUDGET_MS, TRAVEL_TIMEOUT_MS,
    UNKNOWN_TRAVEL_PENALTY_MINUTES,
};
use crate::services::geocoding::DEFAULT_NOMINATIM_URL;
use crate::services::pricing::AllSplitPolicy;
use crate::services::proposal_state::PipelineSettings;
use crate::services::sequencer::SequencerPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// Nominatim API URL (for geocoding)
    pub nominatim_url: String,

    /// "mock" or "nominatim"
    pub geocoder_backend: String,

    /// Valhalla routing engine URL (optional, falls back to haversine if unavailable)
    pub valhalla_url: Option<String>,

    /// Exact sequencing up to this many stops
    pub exact_sequencing_max_stops: usize,

    pub sequencer_time_budget: Duration,

    pub unknown_travel_penalty_minutes: u32,

    /// Per-lookup travel provider timeout
    pub travel_timeout: Duration,

    pub all_split_policy: AllSplitPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let nats_url = lookup("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());

        let nominatim_url = lookup("NOMINATIM_URL").unwrap_or_else(|| DEFAULT_NOMINATIM_URL.to_string());

        let geocoder_backend = lookup("GEOCODER_BACKEND")
            .map(|b| b.trim().to_lowercase())
            .unwrap_or_else(|| "mock".to_string());

        let valhalla_url = lookup("VALHALLA_URL").filter(|url| !url.trim().is_empty());

        let exact_sequencing_max_stops =
            parse_or(&lookup, "EXACT_SEQUENCING_MAX_STOPS", EXACT_SEQUENCING_MAX_STOPS)?;
        let time_budget_ms = parse_or(&lookup, "SEQUENCER_TIME_BUDGET_MS", SEQUENCER_TIME_BUDGET_MS)?;
        let unknown_travel_penalty_minutes =
            parse_or(&lookup, "UNKNOWN_TRAVEL_PENALTY_MINUTES", UNKNOWN_TRAVEL_PENALTY_MINUTES)?;
        let travel_timeout_ms = parse_or(&lookup, "TRAVEL_TIMEOUT_MS", TRAVEL_TIMEOUT_MS)?;

        let all_split_policy = match lookup("ALL_SPLIT_POLICY") {
            Some(value) => AllSplitPolicy::parse(&value)
                .with_context(|| format!("ALL_SPLIT_POLICY must be 'implicit' or 'none', got '{}'", value))?,
            None => AllSplitPolicy::default(),
        };

        Ok(Self {
            nats_url,
            nominatim_url,
            geocoder_backend,
            valhalla_url,
            exact_sequencing_max_stops,
            sequencer_time_budget: Duration::from_millis(time_budget_ms),
            unknown_travel_penalty_minutes,
            travel_timeout: Duration::from_millis(travel_timeout_ms),
            all_split_policy,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            sequencer: SequencerPolicy {
                exact_max_stops: self.exact_sequencing_max_stops,
                time_budget: self.sequencer_time_budget,
                unknown_travel_penalty_minutes: self.unknown_travel_penalty_minutes,
                ..Default::default()
            },
            split_policy: self.all_split_policy,
            travel_timeout: self.travel_timeout,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, value)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.nominatim_url, "https://nominatim.openstreetmap.org");
        assert_eq!(config.geocoder_backend, "mock");
        assert!(config.valhalla_url.is_none());
        assert_eq!(config.exact_sequencing_max_stops, 10);
        assert_eq!(config.sequencer_time_budget, Duration::from_millis(150));
        assert_eq!(config.unknown_travel_penalty_minutes, 240);
        assert_eq!(config.travel_timeout, Duration::from_millis(2000));
        assert_eq!(config.all_split_policy, AllSplitPolicy::SingleImplicitGroup);
    }

    #[test]
    fn test_config_valhalla_url_some_when_set() {
        let config = config(&[("VALHALLA_URL", "http://localhost:8002")]).unwrap();
        assert_eq!(config.valhalla_url, Some("http://localhost:8002".to_string()));

        let config = self::config(&[("VALHALLA_URL", "  ")]).unwrap();
        assert!(config.valhalla_url.is_none());
    }

    #[test]
    fn test_config_overrides_flow_into_pipeline() {
        let config = config(&[
            ("EXACT_SEQUENCING_MAX_STOPS", "8"),
            ("SEQUENCER_TIME_BUDGET_MS", "50"),
            ("ALL_SPLIT_POLICY", "none"),
            ("GEOCODER_BACKEND", "Nominatim"),
        ])
        .unwrap();
        assert_eq!(config.geocoder_backend, "nominatim");

        let settings = config.pipeline_settings();
        assert_eq!(settings.sequencer.exact_max_stops, 8);
        assert_eq!(settings.sequencer.time_budget, Duration::from_millis(50));
        assert_eq!(settings.sequencer.two_opt_max_iterations, 100);
        assert_eq!(settings.split_policy, AllSplitPolicy::Unattributed);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        let err = config(&[("TRAVEL_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("TRAVEL_TIMEOUT_MS"));

        assert!(config(&[("EXACT_SEQUENCING_MAX_STOPS", "-1")]).is_err());
        assert!(config(&[("ALL_SPLIT_POLICY", "halves")]).is_err());
    }
}
