//! Keyword-based analysis fallback.
//!
//! Whenever the LLM is unconfigured, unreachable, or replies with
//! something unparseable, analysis degrades to counting security keywords.
//! Crude, but it keeps the pipeline moving and the scores comparable.

use redclaw_core::types::{SecurityAnalysis, ThreatLevel};

const SECURITY_KEYWORDS: &[&str] = &[
    "vulnerability",
    "exploit",
    "malware",
    "ransomware",
    "phishing",
    "zero-day",
    "cve",
    "patch",
    "security",
    "attack",
    "breach",
    "trojan",
    "backdoor",
    "sql injection",
    "xss",
    "csrf",
];

/// Keyword groups used to pick a RAG category for documents.
const CATEGORY_KEYWORDS: &[(&str, &str, &[&str])] = &[
    (
        "vulnerability",
        "exploit_development",
        &["vulnerability", "cve", "exploit", "flaw", "weakness"],
    ),
    (
        "malware",
        "malware_analysis",
        &["malware", "virus", "trojan", "ransomware", "backdoor"],
    ),
    (
        "network",
        "network_security",
        &["firewall", "ids", "ips", "network", "traffic"],
    ),
    (
        "web",
        "web_security",
        &["xss", "sql injection", "csrf", "owasp", "web application"],
    ),
    (
        "incident",
        "incident_response",
        &["incident", "breach", "attack", "compromise", "forensics"],
    ),
];

/// Analyze an article or snippet without AI: count keywords, score
/// `hits + 3` capped at 10.
pub fn basic_analysis(title: &str, content: &str, category: &str) -> SecurityAnalysis {
    let text = format!("{title} {content}").to_lowercase();
    let found: Vec<String> = SECURITY_KEYWORDS
        .iter()
        .filter(|kw| text.contains(*kw))
        .map(|kw| kw.to_string())
        .collect();

    let score = (found.len() as u8 + 3).min(10);
    let preview: String = content.chars().take(200).collect();

    SecurityAnalysis {
        summary: format!("{title}. {preview}..."),
        classification: category.to_string(),
        tags: found.into_iter().take(5).collect(),
        security_score: score,
        threat_level: if score >= 6 {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        },
        affected_systems: vec![],
        indicators: vec![],
        category: category.to_string(),
    }
}

/// Analyze an uploaded document without AI: score each keyword group and
/// map the winning group onto a RAG collection.
pub fn basic_document_analysis(filename: &str, content: &str) -> SecurityAnalysis {
    let text = content.to_lowercase();

    let mut best: Option<(&str, &str, usize)> = None;
    let mut total_hits = 0usize;
    let mut found_keywords: Vec<String> = Vec::new();

    for (group, collection, keywords) in CATEGORY_KEYWORDS {
        let hits = keywords.iter().filter(|kw| text.contains(*kw)).count();
        total_hits += hits;
        found_keywords.extend(
            keywords
                .iter()
                .filter(|kw| text.contains(*kw))
                .map(|kw| kw.to_string()),
        );
        if hits > 0 && best.map(|(_, _, b)| hits > b).unwrap_or(true) {
            best = Some((group, collection, hits));
        }
    }

    let (classification, category) = best
        .map(|(group, collection, _)| (group.to_string(), collection.to_string()))
        .unwrap_or_else(|| ("general".to_string(), "tools_techniques".to_string()));

    found_keywords.sort();
    found_keywords.dedup();

    let score = (total_hits as u8 + 3).min(10);
    let preview: String = content.chars().take(200).collect();

    SecurityAnalysis {
        summary: format!(
            "Security document {filename} containing {} relevant keywords. {preview}...",
            found_keywords.len()
        ),
        classification,
        tags: found_keywords.into_iter().take(5).collect(),
        security_score: score,
        threat_level: ThreatLevel::from_score(score),
        affected_systems: vec![],
        indicators: vec![],
        category,
    }
}
