//! # RedClaw Providers
//!
//! Generative-AI backends for the platform. One real provider (Gemini's
//! native REST API) plus the keyword fallback analyzer every call site
//! degrades to when the API is unreachable or returns garbage.

pub mod fallback;
pub mod gemini;

use redclaw_core::RedClawConfig;
use redclaw_core::error::Result;
use redclaw_core::traits::Provider;
use redclaw_core::types::{GenerateParams, SecurityAnalysis};

/// Create the configured provider.
pub fn create_provider(config: &RedClawConfig) -> Result<Box<dyn Provider>> {
    Ok(Box::new(gemini::GeminiProvider::new(&config.gemini)))
}

/// Run a structured-analysis prompt and parse the JSON reply, falling back
/// to keyword analysis when the provider is unavailable or replies with
/// something that does not parse.
pub async fn analyze_or_fallback(
    provider: &dyn Provider,
    prompt: &str,
    title: &str,
    content: &str,
    category: &str,
    params: &GenerateParams,
) -> SecurityAnalysis {
    if provider.is_available() {
        match provider.generate(prompt, params).await {
            Ok(reply) => match parse_analysis_json(&reply) {
                Some(analysis) => return analysis.normalize(),
                None => {
                    tracing::warn!("Provider returned non-JSON analysis, using basic analysis");
                }
            },
            Err(e) => {
                tracing::error!("AI analysis failed: {e}");
            }
        }
    }
    fallback::basic_analysis(title, content, category)
}

/// Extract a JSON object from an LLM reply. Models love wrapping output in
/// code fences or prose; take everything between the first `{` and the
/// last `}`.
pub fn parse_analysis_json(reply: &str) -> Option<SecurityAnalysis> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analysis_json_fenced() {
        let reply = r#"Here you go:
```json
{
  "summary": "A serious RCE.",
  "classification": "rce",
  "tags": ["rce", "apache"],
  "security_score": 9,
  "threat_level": "CRITICAL",
  "category": "vulnerabilities"
}
```"#;
        let a = parse_analysis_json(reply).unwrap();
        assert_eq!(a.classification, "rce");
        assert_eq!(a.security_score, 9);
    }

    #[test]
    fn test_parse_analysis_json_garbage() {
        assert!(parse_analysis_json("I cannot help with that.").is_none());
        assert!(parse_analysis_json("}{").is_none());
    }
}
