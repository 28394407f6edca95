//! # RedClaw Recon
//!
//! External tool execution (nmap, gobuster, wpscan), the target allowlist
//! that gates every scan, and VPN profile management.

pub mod allowlist;
pub mod scanner;
pub mod vpn;

pub use allowlist::TargetAllowlist;
pub use scanner::Scanner;
pub use vpn::VpnManager;
