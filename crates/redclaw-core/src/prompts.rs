//! Prompt templates for AI analysis tasks.
//!
//! Every prompt that asks for structured output requests a single JSON
//! object; callers parse it into `SecurityAnalysis` and fall back to the
//! keyword analyzer when parsing fails.

/// Analysis prompt for an RSS article.
pub fn article_analysis(title: &str, category: &str, content: &str) -> String {
    let content = truncate(content, 2000);
    format!(
        r#"Analyze this cybersecurity article and provide structured information.

Title: {title}
Category: {category}
Content: {content}

Respond with exactly one JSON object in this shape:
{{
  "summary": "2-3 sentence summary highlighting key security insights",
  "classification": "specific subcategory (e.g. 'sql_injection', 'ransomware', 'zero_day')",
  "tags": ["tag1", "tag2", "tag3", "tag4", "tag5"],
  "security_score": 8,
  "threat_level": "HIGH",
  "affected_systems": ["system1"],
  "indicators": ["ioc1"],
  "category": "{category}"
}}

Security score (1-10): rate the importance for cybersecurity professionals.
Tags should cover vulnerability types, affected technologies and attack methods."#
    )
}

/// Analysis prompt for an uploaded document.
pub fn document_analysis(filename: &str, content: &str, categories: &[String]) -> String {
    let preview = truncate(content, 3000);
    let cats = categories.join(", ");
    format!(
        r#"Analyze this cybersecurity document and classify it.

Filename: {filename}
Content length: {} characters
Content preview: {preview}

Respond with exactly one JSON object in this shape:
{{
  "category": "one of: {cats}",
  "classification": "specific subcategory or attack type",
  "summary": "2-3 sentence summary highlighting key security insights",
  "tags": ["tag1", "tag2", "tag3", "tag4", "tag5"],
  "security_score": 8,
  "threat_level": "HIGH",
  "affected_systems": [],
  "indicators": []
}}

Focus on practical security insight: vulnerabilities, attack methods,
and defensive measures."#,
        content.len()
    )
}

/// Scan-planning prompt for a target.
pub fn scan_planning(target: &str) -> String {
    format!(
        "Provide a concise security scanning approach for target: {target}. \
         Cover reconnaissance, vulnerability assessment and enumeration \
         strategy in a few short paragraphs."
    )
}

/// Analytical prompt with optional retrieved context.
pub fn security_analysis(query: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!(
            "You are a penetration-testing assistant. Use the reference \
             material below when it is relevant.\n\n\
             Reference material:\n{ctx}\n\n\
             Question: {query}"
        ),
        _ => format!("You are a penetration-testing assistant.\n\nQuestion: {query}"),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "héllo wörld".repeat(300);
        let t = truncate(&s, 2000);
        assert!(t.chars().count() <= 2000);
    }

    #[test]
    fn test_article_prompt_mentions_title() {
        let p = article_analysis("CVE-2024-1234 exploited", "vulnerabilities", "details");
        assert!(p.contains("CVE-2024-1234"));
        assert!(p.contains("security_score"));
    }
}
