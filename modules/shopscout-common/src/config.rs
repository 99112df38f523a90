use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::types::Strategy;

pub const DEFAULT_SITE_BASE_URL: &str = "https://www.shopltk.com";
pub const DEFAULT_API_HOST: &str = "api-gateway.shopltk.com";

/// Pipeline configuration. Every key is optional in the TOML file; missing
/// keys fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Highest priority first. Must not repeat a strategy.
    pub strategy_priority: Vec<Strategy>,
    pub proximity: ProximityConfig,
    pub capture: CaptureConfig,
    pub details: DetailConfig,
    /// Used to rebuild permalinks and resolve relative URLs.
    pub site_base_url: String,
    /// Only intercepted responses whose URL contains this host are parsed.
    /// Responses with no known URL are always parsed.
    pub api_host_filter: Option<String>,
    pub thumbnail_width: u32,
    /// Admit posts found only by a lower-priority strategy once a higher one
    /// has already produced posts.
    pub admit_fallback_posts: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProximityConfig {
    /// Max character distance between markup fragments.
    pub max_offset_distance: usize,
    /// Max slot distance between fragments read from the same JSON source.
    /// Zero turns index-based proximity off.
    pub max_index_distance: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    pub scroll_cycles: u32,
    pub cycle_timeout_ms: u64,
    /// Budget for the initial page load, before the first scroll cycle.
    pub navigation_timeout_ms: u64,
    /// Extra time the session waits past the remote budget for the driver
    /// to hand over what it collected.
    pub transfer_margin_ms: u64,
}

/// Follow-up captures of individual post pages, after the listing run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetailConfig {
    /// Posts to revisit per listing run. Zero disables the pass.
    pub limit: usize,
    /// Pause between post pages.
    pub delay_ms: u64,
    pub scroll_cycles: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy_priority: Strategy::ALL.to_vec(),
            proximity: ProximityConfig::default(),
            capture: CaptureConfig::default(),
            details: DetailConfig::default(),
            site_base_url: DEFAULT_SITE_BASE_URL.to_string(),
            api_host_filter: Some(DEFAULT_API_HOST.to_string()),
            thumbnail_width: 150,
            admit_fallback_posts: true,
        }
    }
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            max_offset_distance: 2000,
            max_index_distance: 0,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            scroll_cycles: 5,
            cycle_timeout_ms: 1500,
            navigation_timeout_ms: 60_000,
            transfer_margin_ms: 15_000,
        }
    }
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            delay_ms: 1000,
            scroll_cycles: 1,
        }
    }
}

impl DetailConfig {
    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl CaptureConfig {
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Time a remote driver may spend on the page: load plus every scroll
    /// cycle. It must return what it has once this runs out.
    pub fn remote_budget(&self) -> Duration {
        self.navigation_timeout() + self.cycle_timeout() * self.scroll_cycles.max(1)
    }

    /// Hard deadline for the whole capture window. Always later than the
    /// remote budget by the transfer margin.
    pub fn deadline(&self) -> Duration {
        self.remote_budget() + Duration::from_millis(self.transfer_margin_ms)
    }

    /// Same timings, different cycle count.
    pub fn with_scroll_cycles(&self, scroll_cycles: u32) -> Self {
        Self {
            scroll_cycles,
            ..self.clone()
        }
    }
}

impl PipelineConfig {
    /// Load a TOML config file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHOPSCOUT_*` environment overrides on top of the file values.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("SHOPSCOUT_SCROLL_CYCLES") {
            self.capture.scroll_cycles = parse_override("SHOPSCOUT_SCROLL_CYCLES", &raw)?;
        }
        if let Some(raw) = lookup("SHOPSCOUT_PROXIMITY_BYTES") {
            self.proximity.max_offset_distance =
                parse_override("SHOPSCOUT_PROXIMITY_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("SHOPSCOUT_DETAIL_LIMIT") {
            self.details.limit = parse_override("SHOPSCOUT_DETAIL_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("SHOPSCOUT_SITE_BASE_URL") {
            self.site_base_url = raw;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategy_priority.is_empty() {
            return Err(ConfigError::Invalid(
                "strategy_priority must name at least one strategy".into(),
            ));
        }
        for (i, s) in self.strategy_priority.iter().enumerate() {
            if self.strategy_priority[..i].contains(s) {
                return Err(ConfigError::Invalid(format!(
                    "strategy_priority lists {s} twice; priorities must be strict"
                )));
            }
        }
        if self.capture.scroll_cycles == 0 {
            return Err(ConfigError::Invalid("capture.scroll_cycles must be > 0".into()));
        }
        if self.thumbnail_width == 0 {
            return Err(ConfigError::Invalid("thumbnail_width must be > 0".into()));
        }
        if !self.site_base_url.starts_with("http://") && !self.site_base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "site_base_url must be an http(s) URL, got {}",
                self.site_base_url
            )));
        }
        Ok(())
    }

    /// Rank of a strategy: 0 is highest. Strategies not listed rank last.
    pub fn rank(&self, strategy: Strategy) -> usize {
        self.strategy_priority
            .iter()
            .position(|s| *s == strategy)
            .unwrap_or(self.strategy_priority.len())
    }

    pub fn is_enabled(&self, strategy: Strategy) -> bool {
        self.strategy_priority.contains(&strategy)
    }

    pub fn base_url(&self) -> &str {
        self.site_base_url.trim_end_matches('/')
    }

    pub fn log_summary(&self) {
        let priority: Vec<&str> = self.strategy_priority.iter().map(|s| s.as_str()).collect();
        info!(
            ?priority,
            max_offset_distance = self.proximity.max_offset_distance,
            max_index_distance = self.proximity.max_index_distance,
            scroll_cycles = self.capture.scroll_cycles,
            cycle_timeout_ms = self.capture.cycle_timeout_ms,
            navigation_timeout_ms = self.capture.navigation_timeout_ms,
            detail_limit = self.details.limit,
            site = self.site_base_url.as_str(),
            "Pipeline config loaded"
        );
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a number, got {raw:?}")))
}
