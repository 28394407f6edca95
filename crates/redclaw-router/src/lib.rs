//! # RedClaw Router
//!
//! Turns parsed chat commands into work: scans, analysis, searches, feed
//! runs, reports, VPN actions. Every route catches its own failures and
//! returns a user-facing reply; nothing here takes the bot down.

pub mod status;

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use redclaw_channels::Command;
use redclaw_core::prompts;
use redclaw_core::traits::Provider;
use redclaw_core::types::{GenerateParams, ScanOutcome, TaskKind};
use redclaw_ingest::{FileParser, ReportGenerator, RssFetcher};
use redclaw_rag::RagStore;
use redclaw_recon::{Scanner, VpnManager};

use crate::status::StatusMonitor;

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}(?:\.\d{1,3}){3}(?:/\d{1,2})?|[A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,})\b")
        .unwrap()
});

const SCAN_KEYWORDS: &[&str] = &["scan", "nmap", "enumerate", "discover"];
const ANALYSIS_KEYWORDS: &[&str] = &["how to", "exploit", "vulnerability", "attack"];
const SEARCH_KEYWORDS: &[&str] = &["search", "find", "look for", "show me"];
const RSS_KEYWORDS: &[&str] = &["rss", "news", "feeds", "updates"];

/// Classify free text into a task. Analysis is the default.
pub fn detect_task_kind(text: &str) -> TaskKind {
    let lower = text.to_lowercase();
    let hit = |keywords: &[&str]| keywords.iter().any(|kw| lower.contains(kw));

    if hit(SCAN_KEYWORDS) {
        TaskKind::Scan
    } else if hit(ANALYSIS_KEYWORDS) {
        TaskKind::Analysis
    } else if hit(SEARCH_KEYWORDS) {
        TaskKind::Search
    } else if hit(RSS_KEYWORDS) {
        TaskKind::Rss
    } else {
        TaskKind::Analysis
    }
}

/// Pull the first IP/CIDR/hostname out of free text.
pub fn extract_target(text: &str) -> Option<String> {
    TARGET_RE.find(text).map(|m| m.as_str().to_string())
}

pub struct TaskRouter {
    provider: Arc<dyn Provider>,
    store: Arc<RagStore>,
    fetcher: RssFetcher,
    parser: FileParser,
    scanner: Scanner,
    vpn: Arc<VpnManager>,
    reports: ReportGenerator,
    monitor: StatusMonitor,
    params: GenerateParams,
}

impl TaskRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<RagStore>,
        fetcher: RssFetcher,
        parser: FileParser,
        scanner: Scanner,
        vpn: Arc<VpnManager>,
        reports: ReportGenerator,
        params: GenerateParams,
    ) -> Self {
        Self {
            provider,
            store,
            fetcher,
            parser,
            scanner,
            vpn,
            reports,
            monitor: StatusMonitor::new(),
            params,
        }
    }

    /// Handle one parsed command and produce the reply text.
    pub async fn route(&self, command: &Command) -> String {
        match command {
            Command::Start => "RedClaw online. /help lists the commands.".into(),
            Command::Help => redclaw_channels::commands::help_text().into(),
            Command::Status => self.route_status().await,
            Command::Scan { target } => self.route_scan(target).await,
            Command::Think { query } => self.route_think(query).await,
            Command::Search { query, collection } => {
                self.route_search(query, collection.as_deref()).await
            }
            Command::Report { kind } => self.route_report(kind),
            Command::Rss => self.route_rss().await,
            Command::Vpn { action, profile } => self.route_vpn(action, profile.as_deref()).await,
            Command::Natural { text } => self.route_natural(text).await,
        }
    }

    /// Keyword-routed free text.
    pub async fn route_natural(&self, text: &str) -> String {
        match detect_task_kind(text) {
            TaskKind::Scan => match extract_target(text) {
                Some(target) => self.route_scan(&target).await,
                None => "I can scan for you, but I need a target (IP or hostname).".into(),
            },
            TaskKind::Search => self.route_search(text, None).await,
            TaskKind::Rss => self.route_rss().await,
            TaskKind::Analysis => self.route_think(text).await,
        }
    }

    /// Staged scan with an optional AI plan up front.
    pub async fn route_scan(&self, target: &str) -> String {
        let target = target.trim();
        if target.is_empty() {
            return "Usage: /scan <target>".into();
        }
        if let Err(e) = self.scanner.allowlist().check_target(target) {
            return format!("Scan refused: {e}");
        }

        let mut reply = format!("Scanning `{target}`...\n");

        if self.provider.is_available() {
            match self
                .provider
                .generate(&prompts::scan_planning(target), &self.params)
                .await
            {
                Ok(plan) => reply.push_str(&format!("\n*Approach*\n{plan}\n")),
                Err(e) => tracing::warn!("Scan planning skipped: {e}"),
            }
        }

        match self.scanner.comprehensive_scan(target).await {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    if let Err(e) = self.reports.save_scan(outcome) {
                        tracing::error!("Saving scan result failed: {e}");
                    }
                    reply.push_str(&format_scan_outcome(outcome));
                }
            }
            Err(e) => {
                tracing::error!(%target, "Scan failed: {e}");
                reply.push_str(&format!("\nScan failed: {e}"));
            }
        }
        reply
    }

    /// Context-grounded analysis.
    pub async fn route_think(&self, query: &str) -> String {
        let query = query.trim();
        if query.is_empty() {
            return "Usage: /think <question>".into();
        }

        let context = match self.store.context_for_query(query, 4000).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!("Context retrieval failed: {e}");
                String::new()
            }
        };

        if self.provider.is_available() {
            let prompt = prompts::security_analysis(query, Some(&context));
            match self.provider.generate(&prompt, &self.params).await {
                Ok(answer) => return answer,
                Err(e) => tracing::error!("Analysis generation failed: {e}"),
            }
        }

        // No model: hand back what the knowledge base knows.
        if context == "No relevant context found." || context.is_empty() {
            "No AI backend available and nothing relevant in the knowledge base.".into()
        } else {
            format!("No AI backend available. Closest knowledge-base material:\n\n{context}")
        }
    }

    /// Knowledge-base search with short previews.
    pub async fn route_search(&self, query: &str, collection: Option<&str>) -> String {
        let query = query.trim();
        if query.is_empty() {
            return "Usage: /search <query>".into();
        }
        let (query, collection) =
            resolve_search_scope(query, collection, &self.store.known_collections());

        match self
            .store
            .search_similar(&query, collection.as_deref(), None)
            .await
        {
            Ok(hits) if hits.is_empty() => "No matches in the knowledge base.".into(),
            Ok(hits) => {
                let mut reply = format!("*{} result(s)*\n", hits.len());
                for (i, hit) in hits.iter().enumerate() {
                    let preview: String = hit.content.chars().take(300).collect();
                    let source = hit
                        .metadata
                        .get("source")
                        .map(String::as_str)
                        .unwrap_or("unknown");
                    reply.push_str(&format!(
                        "\n{}. [{}] {} (score {:.2})\n{preview}...\n",
                        i + 1,
                        hit.collection,
                        source,
                        hit.similarity_score
                    ));
                }
                reply
            }
            Err(e) => {
                tracing::error!("Search failed: {e}");
                format!("Search failed: {e}")
            }
        }
    }

    /// Run the configured feeds now.
    pub async fn route_rss(&self) -> String {
        let summary = self.fetcher.fetch_all(self.provider.as_ref(), &self.store).await;
        if let Err(e) = self.reports.save_rss_summary(&summary) {
            tracing::error!("Saving RSS summary failed: {e}");
        }

        let mut reply = format!(
            "*Feed run*: {} feeds, {} new articles ({} vulnerability items, {} news, {} research)",
            summary.feeds_processed,
            summary.new_articles,
            summary.new_cves,
            summary.security_news,
            summary.research_items,
        );
        if summary.feeds_failed > 0 {
            reply.push_str(&format!("\n{} feed(s) failed, see logs.", summary.feeds_failed));
        }
        if !summary.highlights.is_empty() {
            reply.push_str("\n\n*Highlights*");
            for h in &summary.highlights {
                reply.push_str(&format!(
                    "\n- [{}] ({}/10) {}",
                    h.threat_level, h.security_score, h.title
                ));
            }
        }
        reply
    }

    /// Ingest a downloaded file.
    pub async fn route_file(&self, path: &Path) -> String {
        match self.parser.ingest(path, self.provider.as_ref(), &self.store).await {
            Ok(outcome) => format!(
                "Ingested *{}* into `{}` ({} chunk(s), score {}/10, {}).\n{}",
                outcome.filename,
                outcome.collection,
                outcome.chunks_stored,
                outcome.analysis.security_score,
                outcome.analysis.threat_level.as_str(),
                outcome.analysis.summary,
            ),
            Err(e) => {
                tracing::error!(file = %path.display(), "File ingestion failed: {e}");
                format!("Could not ingest file: {e}")
            }
        }
    }

    pub fn route_report(&self, kind: &str) -> String {
        let result = match kind {
            "weekly" => self.reports.weekly_report(&self.store).map(|(_, md)| md),
            "latest" => match self.reports.latest_report() {
                Ok(Some((_, md))) => Ok(md),
                Ok(None) => Ok("No reports generated yet.".into()),
                Err(e) => Err(e),
            },
            "summary" => self.reports.quick_summary(&self.store),
            _ => self.reports.daily_report(&self.store).map(|(_, md)| md),
        };
        match result {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Report generation failed: {e}");
                format!("Report generation failed: {e}")
            }
        }
    }

    pub async fn route_vpn(&self, action: &str, profile: Option<&str>) -> String {
        match (action, profile) {
            ("list", _) => match self.vpn.list_profiles() {
                Ok(profiles) if profiles.is_empty() => "No VPN profiles configured.".into(),
                Ok(profiles) => format!("Profiles: {}", profiles.join(", ")),
                Err(e) => format!("Could not list profiles: {e}"),
            },
            ("connect", Some(profile)) => match self.vpn.connect(profile).await {
                Ok(status) => format!(
                    "Connected `{}` ({:?}) on {}.",
                    status.profile, status.kind, status.interface
                ),
                Err(e) => format!("Connect failed: {e}"),
            },
            ("disconnect", Some(profile)) => match self.vpn.disconnect(profile).await {
                Ok(()) => format!("Disconnected `{profile}`."),
                Err(e) => format!("Disconnect failed: {e}"),
            },
            ("connect" | "disconnect", None) => "Usage: /vpn connect|disconnect <profile>".into(),
            _ => {
                let statuses = self.vpn.status().await;
                if statuses.is_empty() {
                    "No active VPN connections.".into()
                } else {
                    let mut reply = String::from("*Active VPN connections*");
                    for s in statuses {
                        reply.push_str(&format!(
                            "\n- {} ({:?}) on {} for {}",
                            s.profile, s.kind, s.interface, s.uptime
                        ));
                    }
                    reply
                }
            }
        }
    }

    pub async fn route_status(&self) -> String {
        let vpn_count = self.vpn.status().await.len();
        self.monitor.report(&self.store, vpn_count)
    }

    /// Resource warnings for the periodic health loop.
    pub fn health_check(&self) -> Vec<String> {
        self.monitor.health_warnings()
    }
}

/// Validate a parsed collection scope. "log in failures" parses as query
/// "log" scoped to "failures"; "failures" is not a collection, so the words
/// go back into the query and the search runs unscoped.
fn resolve_search_scope(
    query: &str,
    collection: Option<&str>,
    known: &[String],
) -> (String, Option<String>) {
    match collection {
        Some(c) if known.iter().any(|k| k == c) => (query.to_string(), Some(c.to_string())),
        Some(c) => (format!("{query} in {c}"), None),
        None => (query.to_string(), None),
    }
}

fn format_scan_outcome(outcome: &ScanOutcome) -> String {
    let mut text = format!(
        "\n*{}* ({:.0}s){}\n",
        outcome.tool,
        outcome.duration_secs,
        if outcome.timed_out { " — timed out" } else { "" },
    );

    match outcome.tool.as_str() {
        "nmap" => {
            if let Some(ports) = outcome.parsed["open_ports"].as_array() {
                if ports.is_empty() {
                    text.push_str("No open ports found.\n");
                }
                for p in ports {
                    text.push_str(&format!(
                        "- {}/{} {} {}\n",
                        p["port"],
                        p["protocol"].as_str().unwrap_or("?"),
                        p["service"].as_str().unwrap_or("?"),
                        p["version"].as_str().unwrap_or(""),
                    ));
                }
            }
        }
        "gobuster" => {
            if let Some(paths) = outcome.parsed["paths"].as_array() {
                for p in paths.iter().take(20) {
                    text.push_str(&format!(
                        "- {} ({})\n",
                        p["path"].as_str().unwrap_or("?"),
                        p["status"]
                    ));
                }
            }
        }
        "wpscan" => {
            if let Some(findings) = outcome.parsed["findings"].as_array() {
                for f in findings.iter().take(10) {
                    text.push_str(&format!("- {}\n", f.as_str().unwrap_or("?")));
                }
            }
        }
        _ => {}
    }

    if !outcome.succeeded() && !outcome.stderr.is_empty() {
        let err: String = outcome.stderr.chars().take(300).collect();
        text.push_str(&format!("stderr: {err}\n"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_task_kind() {
        assert_eq!(detect_task_kind("please scan 10.0.0.1"), TaskKind::Scan);
        assert_eq!(detect_task_kind("how to exploit this service"), TaskKind::Analysis);
        assert_eq!(detect_task_kind("show me recent sqli writeups"), TaskKind::Search);
        assert_eq!(detect_task_kind("any security news today?"), TaskKind::Rss);
        assert_eq!(detect_task_kind("tell me about kerberos"), TaskKind::Analysis);
    }

    #[test]
    fn test_detect_scan_wins_over_search() {
        // "scan" outranks the later keyword groups
        assert_eq!(detect_task_kind("search for nmap scan results"), TaskKind::Scan);
    }

    #[test]
    fn test_extract_target() {
        assert_eq!(extract_target("scan 192.168.1.10 please"), Some("192.168.1.10".into()));
        assert_eq!(extract_target("scan 10.10.0.0/24 now"), Some("10.10.0.0/24".into()));
        assert_eq!(
            extract_target("enumerate box.lab.example.com tonight"),
            Some("box.lab.example.com".into())
        );
        assert_eq!(extract_target("scan something"), None);
    }

    #[test]
    fn test_search_scope_kept_for_real_collection() {
        let known = vec!["web_security".to_string(), "general".to_string()];
        assert_eq!(
            resolve_search_scope("jwt bypass", Some("web_security"), &known),
            ("jwt bypass".to_string(), Some("web_security".to_string()))
        );
    }

    #[test]
    fn test_unknown_search_scope_folds_back_into_query() {
        let known = vec!["web_security".to_string()];
        assert_eq!(
            resolve_search_scope("log", Some("failures"), &known),
            ("log in failures".to_string(), None)
        );
        assert_eq!(
            resolve_search_scope("plain", None, &known),
            ("plain".to_string(), None)
        );
    }

    #[test]
    fn test_format_scan_outcome_nmap() {
        let outcome = ScanOutcome {
            tool: "nmap".into(),
            target: "192.168.1.10".into(),
            command: "nmap -sV 192.168.1.10".into(),
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration_secs: 12.0,
            timed_out: false,
            parsed: serde_json::json!({
                "open_ports": [
                    {"port": 80, "protocol": "tcp", "service": "http", "version": "Apache 2.4"}
                ]
            }),
        };
        let text = format_scan_outcome(&outcome);
        assert!(text.contains("*nmap*"));
        assert!(text.contains("80/tcp http Apache 2.4"));
    }

    #[test]
    fn test_format_scan_outcome_timeout() {
        let outcome = ScanOutcome {
            tool: "gobuster".into(),
            target: "t".into(),
            command: "gobuster".into(),
            exit_code: None,
            stdout: String::new(),
            stderr: "Timed out after 600s".into(),
            duration_secs: 600.0,
            timed_out: true,
            parsed: serde_json::Value::Null,
        };
        let text = format_scan_outcome(&outcome);
        assert!(text.contains("timed out"));
        assert!(text.contains("stderr: Timed out"));
    }
}
