//! VPN profile management.
//!
//! Profiles live in the configured directory: `.ovpn` files are started
//! with `openvpn`, `.conf` files with `wg-quick`. Connections are tracked
//! in-process; `verify` checks the interface actually exists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use redclaw_core::config::VpnConfig;
use redclaw_core::error::{RedClawError, Result};

const CONNECT_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VpnKind {
    OpenVpn,
    WireGuard,
}

#[derive(Debug, Clone, Serialize)]
pub struct VpnStatus {
    pub profile: String,
    pub kind: VpnKind,
    pub interface: String,
    pub pid: Option<u32>,
    pub connected_at: DateTime<Utc>,
    pub uptime: String,
}

struct Connection {
    kind: VpnKind,
    interface: String,
    config_path: PathBuf,
    child: Option<Child>,
    connected_at: DateTime<Utc>,
}

pub struct VpnManager {
    config_dir: PathBuf,
    connections: Mutex<HashMap<String, Connection>>,
}

impl VpnManager {
    pub fn new(config: &VpnConfig) -> Self {
        let raw = config.resolve_config_dir();
        let config_dir = PathBuf::from(
            shellexpand::tilde(&raw.to_string_lossy()).into_owned(),
        );
        Self {
            config_dir,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Profile names available in the config directory.
    pub fn list_profiles(&self) -> Result<Vec<String>> {
        let mut profiles = Vec::new();
        let entries = match std::fs::read_dir(&self.config_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(profiles),
            Err(e) => return Err(e.into()),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if profile_kind(&path).is_some()
                && let Some(stem) = path.file_stem()
            {
                profiles.push(stem.to_string_lossy().into_owned());
            }
        }
        profiles.sort();
        Ok(profiles)
    }

    fn profile_path(&self, profile: &str) -> Result<(PathBuf, VpnKind)> {
        if profile.contains('/') || profile.contains("..") {
            return Err(RedClawError::Vpn(format!("Invalid profile name: {profile}")));
        }
        for ext in ["ovpn", "conf"] {
            let path = self.config_dir.join(format!("{profile}.{ext}"));
            if path.exists()
                && let Some(kind) = profile_kind(&path)
            {
                return Ok((path, kind));
            }
        }
        Err(RedClawError::Vpn(format!("Profile not found: {profile}")))
    }

    /// Bring a profile up. Requires the matching binary on PATH and,
    /// in practice, root or the right capabilities.
    ///
    /// The connections lock is only held to reserve and fill the slot;
    /// status and disconnect stay responsive while the tunnel comes up.
    pub async fn connect(&self, profile: &str) -> Result<VpnStatus> {
        let (path, kind) = self.profile_path(profile)?;
        let interface = match kind {
            VpnKind::OpenVpn => "tun0".to_string(),
            VpnKind::WireGuard => profile.to_string(),
        };

        // Reserve the slot so a concurrent connect cannot double-spawn.
        {
            let mut connections = self.connections.lock().await;
            if connections.contains_key(profile) {
                return Err(RedClawError::Vpn(format!("Already connected: {profile}")));
            }
            connections.insert(
                profile.to_string(),
                Connection {
                    kind,
                    interface: interface.clone(),
                    config_path: path.clone(),
                    child: None,
                    connected_at: Utc::now(),
                },
            );
        }

        let child = match self.spawn_tunnel(kind, &path).await {
            Ok(child) => child,
            Err(e) => {
                // Release the slot so a retry is possible.
                self.connections.lock().await.remove(profile);
                return Err(e);
            }
        };

        let now = Utc::now();
        let pid = child.as_ref().and_then(|c| c.id());
        {
            let mut connections = self.connections.lock().await;
            if let Some(conn) = connections.get_mut(profile) {
                conn.child = child;
                conn.connected_at = now;
            }
        }

        tokio::time::sleep(CONNECT_WAIT).await;
        if !interface_exists(&interface).await {
            tracing::warn!(%profile, %interface, "Interface not up after connect");
        }

        tracing::info!(%profile, ?kind, "VPN connected");
        Ok(VpnStatus {
            profile: profile.to_string(),
            kind,
            interface,
            pid,
            connected_at: now,
            uptime: "0m".into(),
        })
    }

    async fn spawn_tunnel(&self, kind: VpnKind, path: &Path) -> Result<Option<Child>> {
        match kind {
            VpnKind::OpenVpn => {
                let child = Command::new("openvpn")
                    .arg("--config")
                    .arg(path)
                    .kill_on_drop(true)
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null())
                    .spawn()
                    .map_err(|e| RedClawError::Vpn(format!("openvpn spawn: {e}")))?;
                Ok(Some(child))
            }
            VpnKind::WireGuard => {
                let output = Command::new("wg-quick")
                    .arg("up")
                    .arg(path)
                    .output()
                    .await
                    .map_err(|e| RedClawError::Vpn(format!("wg-quick spawn: {e}")))?;
                if !output.status.success() {
                    return Err(RedClawError::Vpn(format!(
                        "wg-quick up failed: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }
                Ok(None)
            }
        }
    }

    /// Tear a profile down.
    pub async fn disconnect(&self, profile: &str) -> Result<()> {
        let mut connections = self.connections.lock().await;
        let mut conn = connections
            .remove(profile)
            .ok_or_else(|| RedClawError::Vpn(format!("Not connected: {profile}")))?;

        match conn.kind {
            VpnKind::OpenVpn => {
                if let Some(child) = conn.child.as_mut() {
                    child
                        .kill()
                        .await
                        .map_err(|e| RedClawError::Vpn(format!("Kill openvpn: {e}")))?;
                }
            }
            VpnKind::WireGuard => {
                let output = Command::new("wg-quick")
                    .arg("down")
                    .arg(&conn.config_path)
                    .output()
                    .await
                    .map_err(|e| RedClawError::Vpn(format!("wg-quick spawn: {e}")))?;
                if !output.status.success() {
                    tracing::warn!(
                        %profile,
                        "wg-quick down: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
            }
        }

        tracing::info!(%profile, "VPN disconnected");
        Ok(())
    }

    pub async fn disconnect_all(&self) -> Vec<String> {
        let profiles: Vec<String> = self.connections.lock().await.keys().cloned().collect();
        let mut closed = Vec::new();
        for profile in profiles {
            match self.disconnect(&profile).await {
                Ok(()) => closed.push(profile),
                Err(e) => tracing::error!(%profile, "Disconnect failed: {e}"),
            }
        }
        closed
    }

    /// Tracked connections with their interface liveness.
    pub async fn status(&self) -> Vec<VpnStatus> {
        let connections = self.connections.lock().await;
        let now = Utc::now();
        let mut out = Vec::new();
        for (profile, conn) in connections.iter() {
            out.push(VpnStatus {
                profile: profile.clone(),
                kind: conn.kind,
                interface: conn.interface.clone(),
                pid: conn.child.as_ref().and_then(|c| c.id()),
                connected_at: conn.connected_at,
                uptime: format_uptime(now - conn.connected_at),
            });
        }
        out.sort_by(|a, b| a.profile.cmp(&b.profile));
        out
    }

    /// Whether a tracked connection's interface is actually present.
    pub async fn verify(&self, profile: &str) -> Result<bool> {
        let interface = {
            let connections = self.connections.lock().await;
            connections
                .get(profile)
                .map(|c| c.interface.clone())
                .ok_or_else(|| RedClawError::Vpn(format!("Not connected: {profile}")))?
        };
        Ok(interface_exists(&interface).await)
    }
}

fn profile_kind(path: &Path) -> Option<VpnKind> {
    match path.extension()?.to_str()? {
        "ovpn" => Some(VpnKind::OpenVpn),
        "conf" => Some(VpnKind::WireGuard),
        _ => None,
    }
}

async fn interface_exists(interface: &str) -> bool {
    Command::new("ip")
        .args(["link", "show", interface])
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn format_uptime(elapsed: chrono::Duration) -> String {
    let mins = elapsed.num_minutes();
    if mins >= 60 {
        format!("{}h{}m", mins / 60, mins % 60)
    } else {
        format!("{mins}m")
    }
}
