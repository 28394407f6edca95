//! Markdown report generation.
//!
//! Scan results and RSS run summaries are persisted as JSON under the
//! report directory; reports aggregate those files plus live store
//! statistics into daily/weekly markdown.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::de::DeserializeOwned;

use redclaw_core::config::ReportConfig;
use redclaw_core::error::{RedClawError, Result};
use redclaw_core::types::ScanOutcome;
use redclaw_rag::RagStore;

use crate::rss::IngestSummary;

pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(config: &ReportConfig) -> Result<Self> {
        let output_dir = config.resolve_output_dir();
        std::fs::create_dir_all(output_dir.join("scans"))?;
        std::fs::create_dir_all(output_dir.join("rss"))?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persist a scan result for later reports.
    pub fn save_scan(&self, outcome: &ScanOutcome) -> Result<PathBuf> {
        let name = format!(
            "scan_{}_{}.json",
            sanitize(&outcome.target),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.output_dir.join("scans").join(name);
        std::fs::write(&path, serde_json::to_string_pretty(outcome)?)?;
        Ok(path)
    }

    /// Persist an RSS run summary for later reports.
    pub fn save_rss_summary(&self, summary: &IngestSummary) -> Result<PathBuf> {
        let name = format!("rss_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.output_dir.join("rss").join(name);
        std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        Ok(path)
    }

    /// Activity over the last 24 hours.
    pub fn daily_report(&self, store: &RagStore) -> Result<(PathBuf, String)> {
        self.period_report(store, "Daily", Duration::from_secs(24 * 3600))
    }

    /// Activity over the last 7 days.
    pub fn weekly_report(&self, store: &RagStore) -> Result<(PathBuf, String)> {
        self.period_report(store, "Weekly", Duration::from_secs(7 * 24 * 3600))
    }

    fn period_report(
        &self,
        store: &RagStore,
        label: &str,
        window: Duration,
    ) -> Result<(PathBuf, String)> {
        let since = SystemTime::now()
            .checked_sub(window)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let scans: Vec<ScanOutcome> = load_recent(&self.output_dir.join("scans"), since);
        let rss_runs: Vec<IngestSummary> = load_recent(&self.output_dir.join("rss"), since);
        let stats = store.collection_stats()?;

        let mut md = String::new();
        md.push_str(&format!(
            "# {label} Security Report\n\nGenerated: {}\n\n",
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        ));

        md.push_str("## Knowledge Base\n\n");
        md.push_str(&format!("Total documents: {}\n\n", stats.total_documents));
        md.push_str("| Collection | Documents |\n|---|---|\n");
        for (name, info) in &stats.collections {
            md.push_str(&format!("| {name} | {} |\n", info.document_count));
        }

        md.push_str(&format!("\n## Feed Activity ({} runs)\n\n", rss_runs.len()));
        let new_articles: usize = rss_runs.iter().map(|r| r.new_articles).sum();
        let new_cves: usize = rss_runs.iter().map(|r| r.new_cves).sum();
        md.push_str(&format!(
            "- New articles: {new_articles}\n- New vulnerability items: {new_cves}\n"
        ));
        let mut highlights: Vec<_> = rss_runs.iter().flat_map(|r| r.highlights.iter()).collect();
        highlights.sort_by(|a, b| b.security_score.cmp(&a.security_score));
        if !highlights.is_empty() {
            md.push_str("\n### Highlights\n\n");
            for h in highlights.iter().take(10) {
                md.push_str(&format!(
                    "- [{}] ({}/10) {} — {}\n",
                    h.threat_level, h.security_score, h.title, h.url
                ));
            }
        }

        md.push_str(&format!("\n## Scans ({})\n\n", scans.len()));
        for scan in &scans {
            md.push_str(&format!(
                "- `{}` against **{}**: {}{}\n",
                scan.tool,
                scan.target,
                if scan.succeeded() { "ok" } else { "failed" },
                if scan.timed_out { " (timed out)" } else { "" },
            ));
        }

        let path = self.output_dir.join(format!(
            "{}_report_{}.md",
            label.to_lowercase(),
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&path, &md)?;
        tracing::info!(report = %path.display(), "Report written");
        Ok((path, md))
    }

    /// The most recently written markdown report, if any.
    pub fn latest_report(&self) -> Result<Option<(PathBuf, String)>> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "md").unwrap_or(false) {
                let modified = entry.metadata()?.modified()?;
                if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                    newest = Some((modified, path));
                }
            }
        }
        match newest {
            Some((_, path)) => {
                let content = std::fs::read_to_string(&path)?;
                Ok(Some((path, content)))
            }
            None => Ok(None),
        }
    }

    /// One-paragraph status line for chat replies.
    pub fn quick_summary(&self, store: &RagStore) -> Result<String> {
        let stats = store.collection_stats()?;
        let busiest = stats
            .collections
            .iter()
            .max_by_key(|(_, info)| info.document_count)
            .map(|(name, info)| format!("{name} ({})", info.document_count))
            .unwrap_or_else(|| "none".to_string());
        Ok(format!(
            "Knowledge base holds {} documents across {} collections; busiest: {busiest}.",
            stats.total_documents,
            stats.collections.len()
        ))
    }
}

fn load_recent<T: DeserializeOwned>(dir: &Path, since: SystemTime) -> Vec<T> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return vec![];
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let recent = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|t| t >= since)
            .unwrap_or(false);
        if !recent {
            continue;
        }
        match std::fs::read_to_string(entry.path())
            .map_err(RedClawError::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(RedClawError::from))
        {
            Ok(value) => out.push(value),
            Err(e) => tracing::warn!(file = %entry.path().display(), "Skipping report input: {e}"),
        }
    }
    out
}

fn sanitize(target: &str) -> String {
    target
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use redclaw_core::config::RagConfig;
    use redclaw_rag::HashEmbedder;

    fn setup(dir: &tempfile::TempDir) -> (ReportGenerator, RagStore) {
        let generator = ReportGenerator::new(&ReportConfig {
            output_dir: dir.path().to_string_lossy().into_owned(),
        })
        .unwrap();
        let config = RagConfig {
            embedding_dim: 64,
            ..RagConfig::default()
        };
        let store = RagStore::open_in_memory(config, Box::new(HashEmbedder::new(64))).unwrap();
        (generator, store)
    }

    fn scan_outcome() -> ScanOutcome {
        ScanOutcome {
            tool: "nmap".into(),
            target: "192.168.1.10".into(),
            command: "nmap -sV 192.168.1.10".into(),
            exit_code: Some(0),
            stdout: "80/tcp open http".into(),
            stderr: String::new(),
            duration_secs: 4.2,
            timed_out: false,
            parsed: serde_json::json!({"open_ports": [80]}),
        }
    }

    #[test]
    fn test_save_and_aggregate_scan() {
        let dir = tempfile::tempdir().unwrap();
        let (generator, store) = setup(&dir);

        generator.save_scan(&scan_outcome()).unwrap();
        let (path, md) = generator.daily_report(&store).unwrap();
        assert!(path.exists());
        assert!(md.contains("`nmap` against **192.168.1.10**: ok"));
        assert!(md.contains("# Daily Security Report"));
    }

    #[test]
    fn test_rss_summary_in_report() {
        let dir = tempfile::tempdir().unwrap();
        let (generator, store) = setup(&dir);

        let mut summary = IngestSummary::default();
        summary.new_articles = 7;
        summary.new_cves = 3;
        generator.save_rss_summary(&summary).unwrap();

        let (_, md) = generator.weekly_report(&store).unwrap();
        assert!(md.contains("New articles: 7"));
        assert!(md.contains("New vulnerability items: 3"));
    }

    #[test]
    fn test_latest_report() {
        let dir = tempfile::tempdir().unwrap();
        let (generator, store) = setup(&dir);
        assert!(generator.latest_report().unwrap().is_none());

        generator.daily_report(&store).unwrap();
        let (_, content) = generator.latest_report().unwrap().unwrap();
        assert!(content.contains("Daily Security Report"));
    }

    #[test]
    fn test_quick_summary() {
        let dir = tempfile::tempdir().unwrap();
        let (generator, store) = setup(&dir);
        let s = generator.quick_summary(&store).unwrap();
        assert!(s.contains("0 documents"));
    }
}
