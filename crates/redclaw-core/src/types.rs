//! Shared domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity bucket for analyzed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl ThreatLevel {
    /// Map a 1-10 security score onto a threat level.
    pub fn from_score(score: u8) -> Self {
        match score {
            9..=10 => ThreatLevel::Critical,
            8 => ThreatLevel::High,
            6..=7 => ThreatLevel::Medium,
            _ => ThreatLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Critical => "CRITICAL",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::Low => "LOW",
        }
    }
}

/// Structured result of analyzing a piece of security content,
/// whether by the LLM or the keyword fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAnalysis {
    pub summary: String,
    /// Specific subcategory, e.g. "sql_injection", "ransomware".
    pub classification: String,
    pub tags: Vec<String>,
    /// Importance for security professionals, clamped to 1..=10.
    pub security_score: u8,
    pub threat_level: ThreatLevel,
    #[serde(default)]
    pub affected_systems: Vec<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
    /// RAG collection this content belongs in.
    #[serde(default)]
    pub category: String,
}

impl SecurityAnalysis {
    /// Clamp the score into range and recompute the threat level from it.
    pub fn normalize(mut self) -> Self {
        self.security_score = self.security_score.clamp(1, 10);
        self.threat_level = ThreatLevel::from_score(self.security_score);
        self.tags.truncate(10);
        self
    }
}

/// What kind of work an inbound message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Scan,
    Analysis,
    Search,
    Rss,
}

/// A document going into the RAG store. Metadata values are stringified
/// before storage; lists and objects become JSON strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// One similarity-search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub content: String,
    /// Stringified metadata as stored.
    pub metadata: BTreeMap<String, String>,
    pub similarity_score: f32,
    pub collection: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub matched_tags: Vec<String>,
}

/// A processed RSS article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Content hash of title + link; the dedup key.
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub category: String,
    pub published: Option<DateTime<Utc>>,
    pub analysis: SecurityAnalysis,
    /// CVE/CWE/CAPEC identifiers found in the text.
    pub security_identifiers: Vec<String>,
    /// Truncated article body.
    pub content: String,
    pub processed_at: DateTime<Utc>,
}

/// Result of running one external scan tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub tool: String,
    pub target: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_secs: f64,
    pub timed_out: bool,
    /// Tool-specific structured summary (ports, paths, findings).
    pub parsed: serde_json::Value,
}

impl ScanOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Generation parameters handed to a provider.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 2048,
            top_p: 0.9,
        }
    }
}
