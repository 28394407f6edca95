//! Uploaded-file parsing and ingestion.
//!
//! Supported formats: PDF, Markdown, HTML, JSON, plain text and CSV.
//! Extracted text is analyzed, chunked, and written into the collection
//! the analysis picked.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use redclaw_core::error::{RedClawError, Result};
use redclaw_core::prompts;
use redclaw_core::traits::Provider;
use redclaw_core::types::{Document, GenerateParams, SecurityAnalysis};
use redclaw_providers::{fallback, parse_analysis_json};
use redclaw_rag::{RagStore, chunker};

const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "md", "markdown", "html", "htm", "json", "txt", "csv"];

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// Result of ingesting one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileIngestOutcome {
    pub filename: String,
    pub collection: String,
    pub chunks_stored: usize,
    pub analysis: SecurityAnalysis,
}

/// Parses uploaded files into plain text and feeds them to the store.
pub struct FileParser {
    params: GenerateParams,
}

impl FileParser {
    pub fn new(params: GenerateParams) -> Self {
        Self { params }
    }

    pub fn is_supported(path: &Path) -> bool {
        extension(path)
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Extract plain text from a file on disk.
    pub fn parse_file(&self, path: &Path) -> Result<String> {
        let meta = std::fs::metadata(path)
            .map_err(|e| RedClawError::Ingest(format!("File {}: {e}", path.display())))?;
        if meta.len() > MAX_FILE_SIZE {
            return Err(RedClawError::Ingest(format!(
                "File too large: {} bytes (max {MAX_FILE_SIZE})",
                meta.len()
            )));
        }

        let ext = extension(path)
            .ok_or_else(|| RedClawError::Ingest(format!("No extension: {}", path.display())))?;

        let text = match ext.as_str() {
            "pdf" => pdf_extract::extract_text(path)
                .map_err(|e| RedClawError::Ingest(format!("PDF extraction failed: {e}")))?,
            "html" | "htm" => strip_html(&std::fs::read_to_string(path)?),
            "json" => flatten_json(&std::fs::read_to_string(path)?)?,
            "md" | "markdown" | "txt" | "csv" => std::fs::read_to_string(path)?,
            other => {
                return Err(RedClawError::Ingest(format!(
                    "Unsupported file type: .{other}"
                )));
            }
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(RedClawError::Ingest(format!(
                "No text extracted from {}",
                path.display()
            )));
        }
        Ok(text)
    }

    /// Parse, analyze, chunk and store a file.
    pub async fn ingest(
        &self,
        path: &Path,
        provider: &dyn Provider,
        store: &RagStore,
    ) -> Result<FileIngestOutcome> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let text = self.parse_file(path)?;
        let analysis = self
            .analyze_document(provider, &filename, &text, store)
            .await;

        let known = store.known_collections();
        let collection = if known.contains(&analysis.category) {
            analysis.category.clone()
        } else {
            "general".to_string()
        };

        let chunks = chunker::chunk_text(&text, store.chunk_size());
        let total_chunks = chunks.len();
        let mut stored = 0usize;
        for (i, chunk) in chunks.iter().enumerate() {
            let doc = Document::new(chunk)
                .with_meta("filename", filename.as_str())
                .with_meta("source", "file_upload")
                .with_meta("doc_type", "uploaded_file")
                .with_meta("chunk_id", i as u64)
                .with_meta("total_chunks", total_chunks as u64)
                .with_meta("classification", analysis.classification.as_str())
                .with_meta("summary", analysis.summary.as_str())
                .with_meta("tags", serde_json::json!(analysis.tags))
                .with_meta("security_score", analysis.security_score)
                .with_meta("threat_level", analysis.threat_level.as_str());
            store.add_document(&doc, &collection).await?;
            stored += 1;
        }

        tracing::info!(
            file = %filename,
            collection = %collection,
            chunks = stored,
            "Ingested file"
        );

        Ok(FileIngestOutcome {
            filename,
            collection,
            chunks_stored: stored,
            analysis,
        })
    }

    async fn analyze_document(
        &self,
        provider: &dyn Provider,
        filename: &str,
        text: &str,
        store: &RagStore,
    ) -> SecurityAnalysis {
        if provider.is_available() {
            let prompt = prompts::document_analysis(filename, text, &store.known_collections());
            match provider.generate(&prompt, &self.params).await {
                Ok(reply) => {
                    if let Some(analysis) = parse_analysis_json(&reply) {
                        return analysis.normalize();
                    }
                    tracing::warn!(file = %filename, "Non-JSON document analysis, using basic analysis");
                }
                Err(e) => {
                    tracing::error!(file = %filename, "Document analysis failed: {e}");
                }
            }
        }
        fallback::basic_document_analysis(filename, text)
    }
}

/// Remove script/style blocks and tags, collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let no_scripts = SCRIPT_RE.replace_all(html, " ");
    let no_tags = TAG_RE.replace_all(&no_scripts, " ");
    let decoded = no_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    WS_RE
        .replace_all(&decoded, " ")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Flatten a JSON document into `path: value` lines.
fn flatten_json(raw: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| RedClawError::Ingest(format!("Invalid JSON: {e}")))?;
    let mut lines = Vec::new();
    flatten_value("", &value, &mut lines);
    Ok(lines.join("\n"))
}

fn flatten_value(prefix: &str, value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_value(&key, v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_value(&format!("{prefix}[{i}]"), v, out);
            }
        }
        serde_json::Value::String(s) => out.push(format!("{prefix}: {s}")),
        other => out.push(format!("{prefix}: {other}")),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redclaw_core::config::RagConfig;
    use redclaw_rag::HashEmbedder;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_strip_html() {
        let html = r#"<html><head><style>body { color: red }</style></head>
<body><h1>XSS &amp; SQLi</h1><script>alert(1)</script><p>Two   bugs.</p></body></html>"#;
        let text = strip_html(html);
        assert!(text.contains("XSS & SQLi"));
        assert!(text.contains("Two bugs."));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_flatten_json() {
        let raw = r#"{"finding": {"severity": "high", "cvss": 9.8}, "hosts": ["a", "b"]}"#;
        let flat = flatten_json(raw).unwrap();
        assert!(flat.contains("finding.severity: high"));
        assert!(flat.contains("finding.cvss: 9.8"));
        assert!(flat.contains("hosts[0]: a"));
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "tool.exe", "MZ");
        let parser = FileParser::new(GenerateParams::default());
        assert!(parser.parse_file(&path).is_err());
        assert!(!FileParser::is_supported(&path));
    }

    #[test]
    fn test_parse_missing_file() {
        let parser = FileParser::new(GenerateParams::default());
        assert!(parser.parse_file(Path::new("/nonexistent/notes.txt")).is_err());
    }

    #[tokio::test]
    async fn test_ingest_markdown_routes_to_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "owasp-notes.md",
            "# Web testing\n\nChecklist for XSS and SQL injection per OWASP.\n\nAlways test CSRF tokens.",
        );

        let config = RagConfig {
            embedding_dim: 64,
            similarity_threshold: 0.0,
            ..RagConfig::default()
        };
        let store = RagStore::open_in_memory(config, Box::new(HashEmbedder::new(64))).unwrap();
        let provider = redclaw_providers::gemini::GeminiProvider::new(&Default::default());

        let parser = FileParser::new(GenerateParams::default());
        let outcome = parser.ingest(&path, &provider, &store).await.unwrap();

        // No API key configured, so the keyword analyzer decides.
        assert_eq!(outcome.collection, "web_security");
        assert_eq!(outcome.chunks_stored, 1);
        assert_eq!(store.collection_stats().unwrap().total_documents, 1);
    }

    #[tokio::test]
    async fn test_ingest_large_file_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let body = (0..30)
            .map(|i| format!("Paragraph {i} about firewall and network traffic analysis."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let path = write_file(&dir, "net.txt", &body);

        let config = RagConfig {
            embedding_dim: 64,
            chunk_size: 200,
            similarity_threshold: 0.0,
            ..RagConfig::default()
        };
        let store = RagStore::open_in_memory(config, Box::new(HashEmbedder::new(64))).unwrap();
        let provider = redclaw_providers::gemini::GeminiProvider::new(&Default::default());

        let parser = FileParser::new(GenerateParams::default());
        let outcome = parser.ingest(&path, &provider, &store).await.unwrap();
        assert!(outcome.chunks_stored > 1);
        assert_eq!(
            store.collection_stats().unwrap().total_documents,
            outcome.chunks_stored
        );
    }
}
