// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Source;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Backoff for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Korea Meteorological Administration source
    #[serde(default = "defaults::kma")]
    pub kma: KmaConfig,

    /// Japan Meteorological Agency source
    #[serde(default = "defaults::jma")]
    pub jma: JmaConfig,

    /// Relevance rules for JMA bulletins
    #[serde(default)]
    pub relevance: RelevanceConfig,

    /// Artifact storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Push notification delivery
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Remote translation service
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Operator alerting; disabled when absent
    #[serde(default)]
    pub alert: Option<AlertConfig>,

    /// Rule files and scratch space
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.kma.interval_secs == 0 || self.jma.interval_secs == 0 {
            return Err(AppError::validation("Time value is zero or under zero."));
        }
        if !matches!(self.storage.backend.as_str(), "local" | "s3") {
            return Err(AppError::validation(format!(
                "storage.backend must be 'local' or 's3', got '{}'",
                self.storage.backend
            )));
        }
        if self.storage.version.trim_matches('/').is_empty() {
            return Err(AppError::validation("storage.version is empty"));
        }
        Ok(())
    }

    /// Poll interval of a source.
    pub fn interval(&self, source: Source) -> Duration {
        match source {
            Source::Kma => Duration::from_secs(self.kma.interval_secs),
            Source::Jma => Duration::from_secs(self.jma.interval_secs),
        }
    }

    /// State file of a source.
    pub fn state_file(&self, source: Source) -> &Path {
        match source {
            Source::Kma => &self.kma.state_file,
            Source::Jma => &self.jma.state_file,
        }
    }

    /// Whether a source should be polled by `run`.
    pub fn enabled(&self, source: Source) -> bool {
        match source {
            Source::Kma => self.kma.enabled,
            Source::Jma => self.jma.enabled,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Retry settings for transient network failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Upper bound of a single backoff wait
    #[serde(default = "defaults::backoff_cap")]
    pub cap_secs: u64,

    /// Consecutive failures after which every retry is logged as a warning
    #[serde(default = "defaults::warn_after")]
    pub warn_after: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            cap_secs: defaults::backoff_cap(),
            warn_after: defaults::warn_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmaConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,
    #[serde(default = "defaults::kma_base_url")]
    pub base_url: String,
    #[serde(default = "defaults::kma_list_url")]
    pub list_url: String,
    #[serde(default = "defaults::kma_detail_url")]
    pub detail_url: String,
    #[serde(default = "defaults::kma_state_file")]
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JmaConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,
    #[serde(default = "defaults::jma_feed_url")]
    pub feed_url: String,
    /// Base that relative links on the quake pages resolve against
    #[serde(default = "defaults::jma_quake_url")]
    pub quake_url: String,
    #[serde(default = "defaults::jma_intensity_index")]
    pub intensity_index_url: String,
    #[serde(default = "defaults::jma_hypocenter_index")]
    pub hypocenter_index_url: String,
    #[serde(default = "defaults::jma_combined_index")]
    pub combined_index_url: String,
    #[serde(default = "defaults::jma_state_file")]
    pub state_file: PathBuf,
}

/// Region names the JMA relevance rule keys on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceConfig {
    /// Hypocenter that always notifies at tier 0
    #[serde(default = "defaults::sentinel_hypocenter")]
    pub sentinel_hypocenter: String,

    /// Border region whose intensity gates notification
    #[serde(default = "defaults::border_region")]
    pub border_region: String,

    /// Neighboring region the border intensity is compared against
    #[serde(default = "defaults::reference_region")]
    pub reference_region: String,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            sentinel_hypocenter: defaults::sentinel_hypocenter(),
            border_region: defaults::border_region(),
            reference_region: defaults::reference_region(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `local` or `s3`
    #[serde(default = "defaults::storage_backend")]
    pub backend: String,

    /// Key prefix of every artifact
    #[serde(default = "defaults::storage_version")]
    pub version: String,

    /// Root directory of the local backend
    #[serde(default = "defaults::storage_local_dir")]
    pub local_dir: PathBuf,

    #[serde(default = "defaults::storage_bucket")]
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: defaults::storage_backend(),
            version: defaults::storage_version(),
            local_dir: defaults::storage_local_dir(),
            bucket: defaults::storage_bucket(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Validate messages with FCM without delivering them
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "defaults::kma_topic")]
    pub kma_topic: String,

    #[serde(default = "defaults::jma_topic")]
    pub jma_topic: String,

    /// Firebase project; messages are only logged when unset
    #[serde(default)]
    pub fcm_project_id: Option<String>,

    /// Environment variable holding the FCM bearer token
    #[serde(default = "defaults::fcm_token_env")]
    pub fcm_token_env: String,
}

impl NotificationConfig {
    pub fn topic(&self, source: Source) -> &str {
        match source {
            Source::Kma => &self.kma_topic,
            Source::Jma => &self.jma_topic,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            kma_topic: defaults::kma_topic(),
            jma_topic: defaults::jma_topic(),
            fcm_project_id: None,
            fcm_token_env: defaults::fcm_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "defaults::translate_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key; dictionary-only when unset
    #[serde(default = "defaults::translate_key_env")]
    pub api_key_env: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::translate_endpoint(),
            api_key_env: defaults::translate_key_env(),
        }
    }
}

/// Mailgun settings for operator alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub domain: String,
    pub sender: String,
    pub recipient: String,
    #[serde(default = "defaults::mailgun_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::templates_path")]
    pub templates: PathBuf,
    #[serde(default = "defaults::dictionary_path")]
    pub dictionary: PathBuf,
    #[serde(default = "defaults::codes_path")]
    pub region_codes: PathBuf,
    /// Images are staged here between download and upload
    #[serde(default = "defaults::scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates: defaults::templates_path(),
            dictionary: defaults::dictionary_path(),
            region_codes: defaults::codes_path(),
            scratch_dir: defaults::scratch_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::{JmaConfig, KmaConfig};

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; quake-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn backoff_cap() -> u64 {
        120
    }
    pub fn warn_after() -> u32 {
        3
    }

    // Source defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn interval() -> u64 {
        5
    }
    pub fn kma_base_url() -> String {
        "https://www.weather.go.kr".into()
    }
    pub fn kma_list_url() -> String {
        "https://www.weather.go.kr/w/wnuri-eqk-vol/rest/eqk/list.do".into()
    }
    pub fn kma_detail_url() -> String {
        "https://www.weather.go.kr/w/wnuri-eqk-vol/eqk/report.do".into()
    }
    pub fn kma_state_file() -> PathBuf {
        PathBuf::from("data/kma_uid.txt")
    }
    pub fn jma_feed_url() -> String {
        "http://www.data.jma.go.jp/developer/xml/feed/eqvol.xml".into()
    }
    pub fn jma_quake_url() -> String {
        "https://www.jma.go.jp/jp/quake/".into()
    }
    pub fn jma_intensity_index() -> String {
        "https://www.jma.go.jp/jp/quake/quake_sindo_index.html".into()
    }
    pub fn jma_hypocenter_index() -> String {
        "https://www.jma.go.jp/jp/quake/quake_singen_index.html".into()
    }
    pub fn jma_combined_index() -> String {
        "https://www.jma.go.jp/jp/quake/quake_singendo_index.html".into()
    }
    pub fn jma_state_file() -> PathBuf {
        PathBuf::from("data/jma_uid.txt")
    }

    pub fn kma() -> KmaConfig {
        KmaConfig {
            enabled: enabled(),
            interval_secs: interval(),
            base_url: kma_base_url(),
            list_url: kma_list_url(),
            detail_url: kma_detail_url(),
            state_file: kma_state_file(),
        }
    }

    pub fn jma() -> JmaConfig {
        JmaConfig {
            enabled: enabled(),
            interval_secs: interval(),
            feed_url: jma_feed_url(),
            quake_url: jma_quake_url(),
            intensity_index_url: jma_intensity_index(),
            hypocenter_index_url: jma_hypocenter_index(),
            combined_index_url: jma_combined_index(),
            state_file: jma_state_file(),
        }
    }

    // Relevance defaults
    pub fn sentinel_hypocenter() -> String {
        "朝鮮半島南部".into()
    }
    pub fn border_region() -> String {
        "長崎県対馬".into()
    }
    pub fn reference_region() -> String {
        "福岡県福岡".into()
    }

    // Storage defaults
    pub fn storage_backend() -> String {
        "local".into()
    }
    pub fn storage_version() -> String {
        "v3".into()
    }
    pub fn storage_local_dir() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn storage_bucket() -> String {
        "jijinalimi".into()
    }

    // Notification defaults
    pub fn kma_topic() -> String {
        "kma".into()
    }
    pub fn jma_topic() -> String {
        "jma".into()
    }
    pub fn fcm_token_env() -> String {
        "FCM_ACCESS_TOKEN".into()
    }
    pub fn translate_endpoint() -> String {
        "https://translation.googleapis.com/language/translate/v2".into()
    }
    pub fn translate_key_env() -> String {
        "GOOGLE_TRANSLATE_API_KEY".into()
    }
    pub fn mailgun_key_env() -> String {
        "MAILGUN_API_KEY".into()
    }

    // Path defaults
    pub fn templates_path() -> PathBuf {
        PathBuf::from("rules/notification.json")
    }
    pub fn dictionary_path() -> PathBuf {
        PathBuf::from("rules/translate.json")
    }
    pub fn codes_path() -> PathBuf {
        PathBuf::from("rules/codes.json")
    }
    pub fn scratch_dir() -> PathBuf {
        PathBuf::from("data/tmp")
    }
}

impl Default for KmaConfig {
    fn default() -> Self {
        defaults::kma()
    }
}

impl Default for JmaConfig {
    fn default() -> Self {
        defaults::jma()
    }
}
