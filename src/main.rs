//! # RedClaw — Telegram-fronted security assistant platform
//!
//! Wires the platform together: Gemini provider, RAG knowledge base, feed
//! ingestion, scan tooling, VPN manager, report generator, and the Telegram
//! polling loop that drives them.
//!
//! Usage:
//!   redclaw                          # Start the bot
//!   redclaw --config ./redclaw.toml  # Custom config
//!   redclaw --init-config            # Write a default config and exit
//!   redclaw --rss-once               # One feed ingestion pass and exit

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use redclaw_channels::{Command, TelegramChannel};
use redclaw_core::RedClawConfig;
use redclaw_core::traits::{Channel, Provider};
use redclaw_core::types::GenerateParams;
use redclaw_ingest::{FileParser, ReportGenerator, RssFetcher};
use redclaw_rag::{ProviderEmbedder, RagStore};
use redclaw_recon::{Scanner, VpnManager};
use redclaw_router::TaskRouter;

const HEALTH_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

#[derive(Parser)]
#[command(
    name = "redclaw",
    version,
    about = "🐾 RedClaw — cybersecurity assistant with a Telegram front end"
)]
struct Cli {
    /// Config file (default: ~/.redclaw/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a default config to the default path and exit
    #[arg(long)]
    init_config: bool,

    /// Run one feed ingestion pass and exit
    #[arg(long)]
    rss_once: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "redclaw=debug"
    } else {
        "redclaw=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if cli.init_config {
        let config = RedClawConfig::default();
        config.save()?;
        println!("✅ Wrote default config to {}", RedClawConfig::default_path().display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => RedClawConfig::load_from(path)?,
        None => RedClawConfig::load()?,
    };

    let params = GenerateParams {
        temperature: config.gemini.temperature,
        max_output_tokens: config.gemini.max_output_tokens,
        top_p: config.gemini.top_p,
    };

    let provider: Arc<dyn Provider> = Arc::from(redclaw_providers::create_provider(&config)?);
    if !provider.is_available() {
        tracing::warn!("No Gemini API key configured — running on keyword fallbacks");
    }

    let embedder = ProviderEmbedder::new(provider.clone(), config.rag.embedding_dim);
    let store = Arc::new(RagStore::open(config.rag.clone(), Box::new(embedder))?);
    let fetcher = RssFetcher::new(config.rss.clone(), params.clone())?;
    let rss_interval = fetcher.poll_interval();
    let vpn = Arc::new(VpnManager::new(&config.vpn));

    let router = Arc::new(TaskRouter::new(
        provider.clone(),
        store.clone(),
        fetcher,
        FileParser::new(params.clone()),
        Scanner::new(config.scan.clone()),
        vpn.clone(),
        ReportGenerator::new(&config.report)?,
        params,
    ));

    if cli.rss_once {
        println!("{}", router.route_rss().await);
        return Ok(());
    }

    println!("🐾 RedClaw v{}", env!("CARGO_PKG_VERSION"));
    println!("   🧠 Provider:  {} (available: {})", provider.name(), provider.is_available());
    println!("   🗄️  Knowledge: {}", config.rag.resolve_db_path().display());
    println!("   📰 Feeds:     {} every {}m", config.rss.feeds.len(), config.rss.poll_interval_minutes);

    for profile in &config.vpn.startup_profiles {
        match vpn.connect(profile).await {
            Ok(status) => tracing::info!(profile = %status.profile, "Startup VPN up"),
            Err(e) => tracing::error!(%profile, "Startup VPN failed: {e}"),
        }
    }

    // Periodic feed ingestion in the background.
    {
        let router = router.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(rss_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reply = router.route_rss().await;
                tracing::info!("Scheduled feed run: {}", reply.lines().next().unwrap_or(""));
            }
        });
    }

    // Periodic resource health check.
    {
        let router = router.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                for warning in router.health_check() {
                    tracing::warn!("Health: {warning}");
                }
            }
        });
    }

    if config.telegram.enabled && !config.telegram.resolve_token().is_empty() {
        run_telegram(&config, router).await?;
    } else {
        tracing::warn!("Telegram disabled — running headless (feeds only)");
        tokio::signal::ctrl_c().await?;
    }

    println!("Shutting down...");
    for profile in vpn.disconnect_all().await {
        tracing::info!(%profile, "VPN closed on shutdown");
    }
    Ok(())
}

async fn run_telegram(config: &RedClawConfig, router: Arc<TaskRouter>) -> Result<()> {
    let mut poller = TelegramChannel::new(&config.telegram);
    poller.connect().await?;
    // The polling loop consumes its channel; a second instance sends replies.
    let sender = Arc::new(TelegramChannel::new(&config.telegram));
    let mut stream = poller.start_polling();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            message = stream.next() => {
                let Some(message) = message else { break };
                let router = router.clone();
                let sender = sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send_typing(message.chat_id).await;

                    let reply = if let Some(doc) = &message.document {
                        match sender.download_document(doc).await {
                            Ok(path) => {
                                let reply = router.route_file(&path).await;
                                let _ = tokio::fs::remove_file(&path).await;
                                reply
                            }
                            Err(e) => {
                                tracing::error!("Document download failed: {e}");
                                format!("Could not download {}: {e}", doc.file_name)
                            }
                        }
                    } else {
                        router.route(&Command::parse(&message.text)).await
                    };

                    if let Err(e) = sender.send_message(message.chat_id, &reply).await {
                        tracing::error!(chat_id = message.chat_id, "Reply failed: {e}");
                    }
                });
            }
        }
    }
    Ok(())
}
