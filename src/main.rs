use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use cadence::channels::{Channel, ChannelSender, ConsoleSender, GatewaySender};
use cadence::config::EngineConfig;
use cadence::engine::OutreachEngine;
use cadence::engine::tick::spawn_outreach_loop;
use cadence::error::ConfigError;
use cadence::leads::Lead;
use cadence::ops::ops_routes;
use cadence::rules::RuleSnapshot;
use cadence::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with a non-blocking writer
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_target(false)
        .init();

    let config = EngineConfig::from_env()?;

    eprintln!("📞 Cadence v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Ops API: http://0.0.0.0:{}/api/status", config.ops_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("CADENCE_DB_PATH").unwrap_or_else(|_| "./data/cadence.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .with_context(|| format!("failed to open database at {db_path}"))?,
    );
    eprintln!("   Database: {db_path}");

    // ── Seeding ──────────────────────────────────────────────────────────
    if let Ok(path) = std::env::var("CADENCE_RULES_PATH") {
        seed_rules(&db, &path).await?;
    }
    if let Ok(path) = std::env::var("CADENCE_LEADS_PATH") {
        seed_leads(&db, &path).await?;
    }

    // ── Channel senders ──────────────────────────────────────────────────
    let senders = build_senders()?;

    // ── Engine ───────────────────────────────────────────────────────────
    let engine = OutreachEngine::new(config.clone(), db, senders);
    let loop_handle = spawn_outreach_loop(Arc::clone(&engine));

    // ── Operator API ─────────────────────────────────────────────────────
    let router = ops_routes(Arc::clone(&engine));
    let addr = format!("0.0.0.0:{}", config.ops_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tokio::select! {
        result = axum::serve(listener, router) => {
            result.context("operator API server exited")?;
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nShutting down...");
        }
    }

    // Stop scheduling new work; let in-flight dispatches record their
    // outcomes before exit.
    loop_handle.abort();
    engine.drain().await;
    Ok(())
}

/// Import rules from a JSON file (RuleSnapshot format). Skipped when the
/// store already holds rules, so restarts don't duplicate them.
async fn seed_rules(db: &Arc<dyn Database>, path: &str) -> cadence::error::Result<()> {
    let existing = db.load_rule_snapshot().await?;
    if !existing.dialing.is_empty() || !existing.reengagement.is_empty() {
        eprintln!("   Rules: already present, seed file ignored");
        return Ok(());
    }

    let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let snapshot: RuleSnapshot = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("rules file {path}: {e}")))?;

    for id in &snapshot.catalog.courses {
        db.insert_segment("course", *id).await?;
    }
    for id in &snapshot.catalog.funnels {
        db.insert_segment("funnel", *id).await?;
    }
    for id in &snapshot.catalog.funnel_stages {
        db.insert_segment("funnel-stage", *id).await?;
    }
    for rule in &snapshot.dialing {
        db.insert_dialing_rule(rule).await?;
    }
    for rule in &snapshot.reengagement {
        db.insert_reengagement_rule(rule).await?;
    }

    eprintln!(
        "   Rules: seeded {} dialing, {} reengagement",
        snapshot.dialing.len(),
        snapshot.reengagement.len()
    );
    Ok(())
}

/// Import leads from a JSON file (array of Lead). Upserts are idempotent.
async fn seed_leads(db: &Arc<dyn Database>, path: &str) -> cadence::error::Result<()> {
    let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let leads: Vec<Lead> = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("leads file {path}: {e}")))?;

    for lead in &leads {
        db.upsert_lead(lead).await?;
    }
    eprintln!("   Leads: seeded {}", leads.len());
    Ok(())
}

/// One sender per channel: the HTTP gateway when configured, console
/// logging otherwise.
fn build_senders() -> Result<HashMap<Channel, Arc<dyn ChannelSender>>, ConfigError> {
    let gateway = match std::env::var("CADENCE_GATEWAY_URL") {
        Ok(url) => {
            let token = std::env::var("CADENCE_GATEWAY_TOKEN")
                .map_err(|_| ConfigError::MissingEnvVar("CADENCE_GATEWAY_TOKEN".to_string()))?;
            eprintln!("   Sender: gateway at {url}");
            Some(Arc::new(GatewaySender::new(url, token.into())) as Arc<dyn ChannelSender>)
        }
        Err(_) => {
            eprintln!("   Sender: console (no gateway configured)");
            None
        }
    };

    let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
    for channel in Channel::ALL {
        let sender = match &gateway {
            Some(g) => Arc::clone(g),
            None => Arc::new(ConsoleSender::new()) as Arc<dyn ChannelSender>,
        };
        senders.insert(channel, sender);
    }
    Ok(senders)
}
