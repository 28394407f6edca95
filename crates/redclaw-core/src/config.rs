//! RedClaw configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedClawConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub rss: RssConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub vpn: VpnConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for RedClawConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            gemini: GeminiConfig::default(),
            rag: RagConfig::default(),
            rss: RssConfig::default(),
            scan: ScanConfig::default(),
            vpn: VpnConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl RedClawConfig {
    /// Load config from the default path (~/.redclaw/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::RedClawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::RedClawError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::RedClawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the RedClaw home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".redclaw")
    }
}

fn bool_true() -> bool {
    true
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bot token; falls back to TELEGRAM_BOT_TOKEN.
    #[serde(default)]
    pub bot_token: String,
    /// Only these user ids may issue commands. Empty means nobody.
    #[serde(default)]
    pub authorized_user_ids: Vec<i64>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    1
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            authorized_user_ids: vec![],
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl TelegramConfig {
    /// Resolve the bot token: config value first, TELEGRAM_BOT_TOKEN second.
    pub fn resolve_token(&self) -> String {
        if !self.bot_token.is_empty() {
            self.bot_token.clone()
        } else {
            std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default()
        }
    }
}

/// Gemini API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key; falls back to GEMINI_API_KEY / GOOGLE_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_embedding_model() -> String {
    "text-embedding-004".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_top_p() -> f32 {
    0.9
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_gemini_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

impl GeminiConfig {
    /// Resolve the API key: config value first, then env vars.
    pub fn resolve_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .unwrap_or_default()
    }
}

/// RAG store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Collection name -> description. Collections are also auto-created on
    /// first insert, so this only seeds the well-known ones.
    #[serde(default = "default_collections")]
    pub collections: BTreeMap<String, String>,
    /// Database path; empty means ~/.redclaw/rag.db.
    #[serde(default)]
    pub db_path: String,
}

fn default_embedding_dim() -> usize {
    768
}
fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    64
}
fn default_similarity_threshold() -> f32 {
    0.55
}
fn default_max_results() -> usize {
    10
}
fn default_collections() -> BTreeMap<String, String> {
    [
        ("vulnerabilities", "CVE advisories and vulnerability writeups"),
        ("news", "Security news articles"),
        ("research", "Security research and papers"),
        ("exploit_development", "Exploitation techniques"),
        ("malware_analysis", "Malware analysis reports"),
        ("network_security", "Network security material"),
        ("web_security", "Web application security material"),
        ("incident_response", "Incident response and forensics"),
        ("tools_techniques", "Tooling and methodology notes"),
        ("general", "Uncategorized documents"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_dim: default_embedding_dim(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
            collections: default_collections(),
            db_path: String::new(),
        }
    }
}

impl RagConfig {
    /// Resolve the database path, defaulting under the home dir.
    pub fn resolve_db_path(&self) -> PathBuf {
        if self.db_path.is_empty() {
            RedClawConfig::home_dir().join("rag.db")
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

/// A single RSS feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// RAG collection the articles land in (vulnerabilities, news, research).
    pub category: String,
}

/// RSS ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssConfig {
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedConfig>,
    #[serde(default = "default_max_articles")]
    pub max_articles_per_feed: usize,
    #[serde(default = "default_rss_poll_minutes")]
    pub poll_interval_minutes: u64,
}

fn default_feeds() -> Vec<FeedConfig> {
    vec![
        FeedConfig {
            name: "NVD Recent".into(),
            url: "https://nvd.nist.gov/feeds/xml/cve/misc/nvd-rss.xml".into(),
            category: "vulnerabilities".into(),
        },
        FeedConfig {
            name: "The Hacker News".into(),
            url: "https://feeds.feedburner.com/TheHackersNews".into(),
            category: "news".into(),
        },
    ]
}
fn default_max_articles() -> usize {
    50
}
fn default_rss_poll_minutes() -> u64 {
    60
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            max_articles_per_feed: default_max_articles(),
            poll_interval_minutes: default_rss_poll_minutes(),
        }
    }
}

/// Scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Targets must match one of these suffixes/prefixes, or be private
    /// (RFC1918) addresses when `allow_private` is set.
    #[serde(default)]
    pub allowed_targets: Vec<String>,
    #[serde(default = "bool_true")]
    pub allow_private: bool,
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_wordlist")]
    pub wordlist: String,
}

fn default_allowed_tools() -> Vec<String> {
    vec!["nmap", "gobuster", "wpscan"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_scan_timeout() -> u64 {
    600
}
fn default_wordlist() -> String {
    "/usr/share/wordlists/dirb/common.txt".into()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            allowed_tools: default_allowed_tools(),
            allowed_targets: vec![],
            allow_private: true,
            timeout_secs: default_scan_timeout(),
            wordlist: default_wordlist(),
        }
    }
}

/// VPN manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpnConfig {
    /// Directory holding .ovpn and .conf profiles; empty means ~/.redclaw/vpn.
    #[serde(default)]
    pub config_dir: String,
    /// Profiles to bring up on startup.
    #[serde(default)]
    pub startup_profiles: Vec<String>,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            config_dir: String::new(),
            startup_profiles: vec![],
        }
    }
}

impl VpnConfig {
    pub fn resolve_config_dir(&self) -> PathBuf {
        if self.config_dir.is_empty() {
            RedClawConfig::home_dir().join("vpn")
        } else {
            PathBuf::from(&self.config_dir)
        }
    }
}

/// Report generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output directory; empty means ~/.redclaw/reports.
    #[serde(default)]
    pub output_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: String::new(),
        }
    }
}

impl ReportConfig {
    pub fn resolve_output_dir(&self) -> PathBuf {
        if self.output_dir.is_empty() {
            RedClawConfig::home_dir().join("reports")
        } else {
            PathBuf::from(&self.output_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedClawConfig::default();
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert!((config.rag.similarity_threshold - 0.55).abs() < 0.001);
        assert_eq!(config.rag.max_results, 10);
        assert!(config.rag.collections.contains_key("vulnerabilities"));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [telegram]
            enabled = true
            bot_token = "123:abc"
            authorized_user_ids = [42]

            [rag]
            chunk_size = 256
            similarity_threshold = 0.7

            [[rss.feeds]]
            name = "Test Feed"
            url = "https://example.com/rss"
            category = "news"
        "#;

        let config: RedClawConfig = toml::from_str(toml_str).unwrap();
        assert!(config.telegram.enabled);
        assert_eq!(config.telegram.authorized_user_ids, vec![42]);
        assert_eq!(config.rag.chunk_size, 256);
        assert_eq!(config.rss.feeds.len(), 1);
        assert_eq!(config.rss.feeds[0].category, "news");
        // Untouched sections keep defaults
        assert_eq!(config.scan.allowed_tools.len(), 3);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let toml_str = "";
        let config: RedClawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rag.chunk_size, 512);
        assert_eq!(config.rss.max_articles_per_feed, 50);
        assert_eq!(config.scan.timeout_secs, 600);
    }

    #[test]
    fn test_home_dir() {
        let home = RedClawConfig::home_dir();
        assert!(home.to_string_lossy().contains("redclaw"));
    }
}
