//! RSS feed ingestion.
//!
//! Each configured feed is fetched, parsed, deduplicated against the store,
//! analyzed (AI with keyword fallback), and written into the collection the
//! feed is configured for. A failing feed or entry never aborts the run.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use redclaw_core::config::{FeedConfig, RssConfig};
use redclaw_core::error::{RedClawError, Result};
use redclaw_core::prompts;
use redclaw_core::traits::Provider;
use redclaw_core::types::{Article, Document, GenerateParams, SecurityAnalysis};
use redclaw_providers::analyze_or_fallback;
use redclaw_rag::RagStore;

static CVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CVE-\d{4}-\d{4,7}").unwrap());
static CWE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"CWE-\d{1,4}").unwrap());
static CAPEC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"CAPEC-\d{1,4}").unwrap());

/// Article body kept per entry; feeds love shipping entire pages.
const MAX_CONTENT_LEN: usize = 2000;

/// What one `fetch_all` run did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    pub feeds_processed: usize,
    pub feeds_failed: usize,
    pub total_entries: usize,
    pub new_articles: usize,
    pub new_cves: usize,
    pub security_news: usize,
    pub research_items: usize,
    /// Up to five highest-scoring new articles (score >= 7).
    pub highlights: Vec<Highlight>,
    pub finished_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highlight {
    pub title: String,
    pub url: String,
    pub security_score: u8,
    pub threat_level: String,
}

/// One feed's processing: entries examined and the articles new this run.
#[derive(Debug, Default)]
pub struct FeedRun {
    pub entries_seen: usize,
    pub articles: Vec<Article>,
}

/// Pulls configured feeds into the RAG store.
pub struct RssFetcher {
    client: reqwest::Client,
    config: RssConfig,
    params: GenerateParams,
}

impl RssFetcher {
    pub fn new(config: RssConfig, params: GenerateParams) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("redclaw/0.2")
            .build()
            .map_err(|e| RedClawError::Ingest(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            params,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_minutes * 60)
    }

    /// Fetch and ingest every configured feed.
    pub async fn fetch_all(&self, provider: &dyn Provider, store: &RagStore) -> IngestSummary {
        let mut summary = IngestSummary::default();
        let mut scored: Vec<(u8, Highlight)> = Vec::new();

        for feed in &self.config.feeds {
            match self.fetch_feed(feed, provider, store).await {
                Ok(run) => {
                    summary.feeds_processed += 1;
                    summary.total_entries += run.entries_seen;
                    for article in run.articles {
                        summary.new_articles += 1;
                        match article.category.as_str() {
                            "vulnerabilities" => summary.new_cves += 1,
                            "news" => summary.security_news += 1,
                            "research" => summary.research_items += 1,
                            _ => {}
                        }
                        if article.analysis.security_score >= 7 {
                            scored.push((
                                article.analysis.security_score,
                                Highlight {
                                    title: article.title.clone(),
                                    url: article.url.clone(),
                                    security_score: article.analysis.security_score,
                                    threat_level: article.analysis.threat_level.as_str().into(),
                                },
                            ));
                        }
                    }
                }
                Err(e) => {
                    summary.feeds_failed += 1;
                    tracing::error!(feed = %feed.name, "Feed failed: {e}");
                }
            }
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        summary.highlights = scored.into_iter().take(5).map(|(_, h)| h).collect();
        summary.finished_at = Some(Utc::now());

        tracing::info!(
            feeds = summary.feeds_processed,
            new = summary.new_articles,
            cves = summary.new_cves,
            "RSS run complete"
        );
        summary
    }

    /// Fetch one feed; counts examined entries and collects the new articles.
    pub async fn fetch_feed(
        &self,
        feed: &FeedConfig,
        provider: &dyn Provider,
        store: &RagStore,
    ) -> Result<FeedRun> {
        tracing::info!(feed = %feed.name, url = %feed.url, "Fetching feed");

        let bytes = self
            .client
            .get(&feed.url)
            .send()
            .await
            .map_err(|e| RedClawError::Ingest(format!("Fetch {}: {e}", feed.url)))?
            .error_for_status()
            .map_err(|e| RedClawError::Ingest(format!("Fetch {}: {e}", feed.url)))?
            .bytes()
            .await
            .map_err(|e| RedClawError::Ingest(format!("Read {}: {e}", feed.url)))?;

        let parsed = feed_rs::parser::parse(bytes.as_ref())
            .map_err(|e| RedClawError::Ingest(format!("Parse {}: {e}", feed.name)))?;

        Ok(self.ingest_entries(&parsed.entries, feed, provider, store).await)
    }

    async fn ingest_entries(
        &self,
        entries: &[feed_rs::model::Entry],
        feed: &FeedConfig,
        provider: &dyn Provider,
        store: &RagStore,
    ) -> FeedRun {
        let mut run = FeedRun::default();
        for entry in entries.iter().take(self.config.max_articles_per_feed) {
            run.entries_seen += 1;
            match self.process_entry(entry, feed, provider, store).await {
                Ok(Some(article)) => run.articles.push(article),
                Ok(None) => {} // already known
                Err(e) => {
                    tracing::warn!(feed = %feed.name, "Entry skipped: {e}");
                }
            }
        }
        run
    }

    async fn process_entry(
        &self,
        entry: &feed_rs::model::Entry,
        feed: &FeedConfig,
        provider: &dyn Provider,
        store: &RagStore,
    ) -> Result<Option<Article>> {
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();
        if title.is_empty() {
            return Err(RedClawError::Ingest("Entry without title".into()));
        }
        let url = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();
        let body = entry_body(entry);

        let raw = format!("{title}\n\n{body}");
        let probe = Document::new(&raw).with_meta("source", feed.name.as_str());
        let doc_id = RagStore::document_id(&probe);
        if store.document_exists(&doc_id)? {
            return Ok(None);
        }

        let prompt = prompts::article_analysis(&title, &feed.category, &body);
        let analysis =
            analyze_or_fallback(provider, &prompt, &title, &body, &feed.category, &self.params)
                .await;

        let identifiers = extract_identifiers(&raw);
        let article = Article {
            id: article_id(&title, &url),
            title: title.clone(),
            url: url.clone(),
            source: feed.name.clone(),
            category: feed.category.clone(),
            published: entry.published.or(entry.updated),
            analysis: analysis.clone(),
            security_identifiers: identifiers.clone(),
            content: body,
            processed_at: Utc::now(),
        };

        store
            .add_document(&article_document(&raw, &article, &analysis), &feed.category)
            .await?;

        tracing::info!(
            title = %title,
            score = analysis.security_score,
            "Stored article"
        );
        Ok(Some(article))
    }
}

/// Stable article id from title + link.
pub fn article_id(title: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// CVE / CWE / CAPEC identifiers in the text, deduplicated.
pub fn extract_identifiers(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = [&*CVE_RE, &*CWE_RE, &*CAPEC_RE]
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

fn entry_body(entry: &feed_rs::model::Entry) -> String {
    let text = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| {
            entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
        })
        .unwrap_or_default();
    let stripped = crate::files::strip_html(&text);
    stripped.chars().take(MAX_CONTENT_LEN).collect()
}

fn article_document(raw: &str, article: &Article, analysis: &SecurityAnalysis) -> Document {
    Document::new(raw)
        .with_meta("source", article.source.as_str())
        .with_meta("title", article.title.as_str())
        .with_meta("url", article.url.as_str())
        .with_meta("article_id", article.id.as_str())
        .with_meta("doc_type", "rss_article")
        .with_meta("classification", analysis.classification.as_str())
        .with_meta("summary", analysis.summary.as_str())
        .with_meta("tags", serde_json::json!(analysis.tags))
        .with_meta("security_score", analysis.security_score)
        .with_meta("threat_level", analysis.threat_level.as_str())
        .with_meta(
            "security_identifiers",
            serde_json::json!(article.security_identifiers),
        )
        .with_meta(
            "published",
            article
                .published
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_identifiers() {
        let text = "CVE-2024-3094 maps to CWE-506; see also CAPEC-443 and CVE-2024-3094 again.";
        let ids = extract_identifiers(text);
        assert_eq!(ids, vec!["CAPEC-443", "CVE-2024-3094", "CWE-506"]);
    }

    #[test]
    fn test_extract_identifiers_none() {
        assert!(extract_identifiers("nothing interesting here").is_empty());
    }

    #[test]
    fn test_article_id_stable_and_distinct() {
        let a = article_id("Title", "https://a.example");
        let b = article_id("Title", "https://a.example");
        let c = article_id("Title", "https://b.example");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_entries_seen_counts_deduplicated_entries() {
        use redclaw_core::config::RagConfig;
        use redclaw_rag::HashEmbedder;

        let rss_xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Test Feed</title>
  <item>
    <title>Botnet exploits router vulnerability</title>
    <link>https://example.com/botnet</link>
    <description>Attackers exploit an authentication bypass.</description>
  </item>
</channel></rss>"#;
        let parsed = feed_rs::parser::parse(rss_xml.as_bytes()).unwrap();

        let config = RagConfig {
            embedding_dim: 64,
            ..RagConfig::default()
        };
        let store = RagStore::open_in_memory(config, Box::new(HashEmbedder::new(64))).unwrap();
        let fetcher = RssFetcher::new(RssConfig::default(), GenerateParams::default()).unwrap();
        let provider =
            redclaw_providers::gemini::GeminiProvider::new(&Default::default());
        let feed = FeedConfig {
            name: "Test Feed".into(),
            url: "https://example.com/feed".into(),
            category: "news".into(),
        };

        let first = fetcher
            .ingest_entries(&parsed.entries, &feed, &provider, &store)
            .await;
        assert_eq!(first.entries_seen, 1);
        assert_eq!(first.articles.len(), 1);

        // Re-running the same feed examines the entry but stores nothing.
        let second = fetcher
            .ingest_entries(&parsed.entries, &feed, &provider, &store)
            .await;
        assert_eq!(second.entries_seen, 1);
        assert!(second.articles.is_empty());
    }

    #[tokio::test]
    async fn test_feed_parse_and_ingest() {
        use redclaw_core::config::RagConfig;
        use redclaw_rag::HashEmbedder;

        let rss_xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Test Feed</title>
  <item>
    <title>Critical RCE vulnerability CVE-2024-9999 under active exploit</title>
    <link>https://example.com/cve-2024-9999</link>
    <description>A remote code execution vulnerability lets attackers run malware.</description>
  </item>
</channel></rss>"#;

        let parsed = feed_rs::parser::parse(rss_xml.as_bytes()).unwrap();
        assert_eq!(parsed.entries.len(), 1);

        // Ingest path without the network: drive process_entry pieces directly.
        let config = RagConfig {
            embedding_dim: 64,
            similarity_threshold: 0.0,
            ..RagConfig::default()
        };
        let store = RagStore::open_in_memory(config, Box::new(HashEmbedder::new(64))).unwrap();

        let entry = &parsed.entries[0];
        let title = entry.title.as_ref().unwrap().content.clone();
        let body = entry_body(entry);
        let raw = format!("{title}\n\n{body}");
        let analysis = redclaw_providers::fallback::basic_analysis(&title, &body, "vulnerabilities");
        let article = Article {
            id: article_id(&title, "https://example.com/cve-2024-9999"),
            title: title.clone(),
            url: "https://example.com/cve-2024-9999".into(),
            source: "Test Feed".into(),
            category: "vulnerabilities".into(),
            published: None,
            analysis: analysis.clone(),
            security_identifiers: extract_identifiers(&raw),
            content: body,
            processed_at: Utc::now(),
        };
        assert_eq!(article.security_identifiers, vec!["CVE-2024-9999"]);

        let doc = article_document(&raw, &article, &analysis);
        let id = store.add_document(&doc, "vulnerabilities").await.unwrap();
        assert!(store.document_exists(&id).unwrap());

        // Second pass sees the document and skips it.
        let probe = Document::new(&raw).with_meta("source", "Test Feed");
        assert!(store.document_exists(&RagStore::document_id(&probe)).unwrap());
    }
}
