//! Platform health reporting for /status.

use std::time::Instant;

use sysinfo::{Disks, System};

use redclaw_rag::RagStore;

const MEMORY_WARN_PCT: f64 = 90.0;
const DISK_WARN_PCT: f64 = 95.0;

pub struct StatusMonitor {
    started_at: Instant,
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Resource warnings past the alert thresholds; empty when healthy.
    pub fn health_warnings(&self) -> Vec<String> {
        warnings_for(memory_usage_pct(), root_disk_usage_pct())
    }

    /// Uptime, resource usage, knowledge-base size and health warnings.
    pub fn report(&self, store: &RagStore, vpn_connections: usize) -> String {
        let mem_pct = memory_usage_pct();
        let disk_pct = root_disk_usage_pct();

        let mut reply = format!(
            "*RedClaw status*\nUptime: {}\nMemory: {:.1}%\nDisk: {:.1}%\nVPN connections: {vpn_connections}\n",
            format_uptime(self.started_at.elapsed().as_secs()),
            mem_pct,
            disk_pct,
        );

        match store.collection_stats() {
            Ok(stats) => {
                reply.push_str(&format!("Documents: {}\n", stats.total_documents));
                let mut busiest: Vec<_> = stats
                    .collections
                    .iter()
                    .filter(|(_, info)| info.document_count > 0)
                    .collect();
                busiest.sort_by(|a, b| b.1.document_count.cmp(&a.1.document_count));
                for (name, info) in busiest.iter().take(5) {
                    reply.push_str(&format!("- {name}: {}\n", info.document_count));
                }
            }
            Err(e) => reply.push_str(&format!("Knowledge base unavailable: {e}\n")),
        }

        let warnings = warnings_for(mem_pct, disk_pct);
        if warnings.is_empty() {
            reply.push_str("Health: OK");
        } else {
            reply.push_str(&format!("Health: WARNING ({})", warnings.join(", ")));
        }
        reply
    }
}

impl Default for StatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn memory_usage_pct() -> f64 {
    let mut sys = System::new();
    sys.refresh_memory();
    if sys.total_memory() > 0 {
        sys.used_memory() as f64 / sys.total_memory() as f64 * 100.0
    } else {
        0.0
    }
}

fn warnings_for(mem_pct: f64, disk_pct: f64) -> Vec<String> {
    let mut warnings = Vec::new();
    if mem_pct > MEMORY_WARN_PCT {
        warnings.push(format!("memory at {mem_pct:.1}%"));
    }
    if disk_pct > DISK_WARN_PCT {
        warnings.push(format!("disk at {disk_pct:.1}%"));
    }
    warnings
}

fn root_disk_usage_pct() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().next())
        .map(|d| {
            let total = d.total_space();
            if total == 0 {
                0.0
            } else {
                (total - d.available_space()) as f64 / total as f64 * 100.0
            }
        })
        .unwrap_or(0.0)
}

fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    if hours > 0 {
        format!("{hours}h{mins}m")
    } else {
        format!("{mins}m{}s", secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redclaw_core::config::RagConfig;
    use redclaw_rag::HashEmbedder;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(59), "0m59s");
        assert_eq!(format_uptime(3725), "1h2m");
    }

    #[test]
    fn test_warning_thresholds() {
        assert!(warnings_for(50.0, 50.0).is_empty());
        let warnings = warnings_for(95.0, 50.0);
        assert_eq!(warnings, vec!["memory at 95.0%"]);
        let warnings = warnings_for(95.0, 99.0);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("disk at 99.0%"));
    }

    #[test]
    fn test_report_contains_sections() {
        let config = RagConfig {
            embedding_dim: 32,
            ..RagConfig::default()
        };
        let store = RagStore::open_in_memory(config, Box::new(HashEmbedder::new(32))).unwrap();
        let monitor = StatusMonitor::new();
        let report = monitor.report(&store, 1);
        assert!(report.contains("Uptime:"));
        assert!(report.contains("Documents: 0"));
        assert!(report.contains("VPN connections: 1"));
        assert!(report.contains("Health:"));
    }
}
