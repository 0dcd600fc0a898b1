use serde::{Deserialize, Serialize};

/// Catalog ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    DateAsc,
    DateDesc,
    #[default]
    PriceDesc,
    PriceAsc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoloadWindow {
    /// `"HH:MM"`, local time.
    pub hour_start: String,
    /// `"HH:MM"`, local time. May be earlier than `hour_start` to wrap midnight.
    pub hour_end: String,
}

impl Default for AutoloadWindow {
    fn default() -> Self {
        Self {
            hour_start: "03:00".to_string(),
            hour_end: "17:00".to_string(),
        }
    }
}

/// Minutes between reload eligibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterRange {
    pub min: u64,
    pub max: u64,
}

impl Default for JitterRange {
    fn default() -> Self {
        Self { min: 5, max: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoloadSettings {
    pub enabled: bool,
    pub window: AutoloadWindow,
    pub jitter: JitterRange,
    /// Display queue the headless surface claims when asked for reload eligibility.
    pub queue: Option<String>,
}

/// Every configuration value the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub identity: String,
    pub region_code: Option<String>,
    pub endpoint: String,
    pub stream_enabled: bool,
    pub sort_type: SortType,
    pub hide_duplicate_thumbnail: bool,
    pub resync_on_connect: bool,
    pub snapshot_limit: u32,
    pub reconnect_interval_secs: u64,
    pub resync_timeout_secs: u64,
    pub autoload: AutoloadSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            identity: String::new(),
            region_code: None,
            endpoint: "ws://localhost:3000/feed".to_string(),
            stream_enabled: true,
            sort_type: SortType::default(),
            hide_duplicate_thumbnail: false,
            resync_on_connect: true,
            snapshot_limit: 100,
            reconnect_interval_secs: 30,
            resync_timeout_secs: 60,
            autoload: AutoloadSettings::default(),
        }
    }
}
