// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Stigmergic Blackboard node
//!
//! The `sbp` binary runs a single-node blackboard: the pheromone engine,
//! the scent evaluation loop, and the streamable HTTP/SSE endpoint.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use sbp_core::application::blackboard::{Blackboard, BlackboardConfig};
use sbp_core::application::evaluation_loop::ScentEvaluator;
use sbp_core::infrastructure::http_dispatch::HttpTriggerDispatcher;
use sbp_core::presentation::http::{serve, ServerConfig};

/// Stigmergic Blackboard - indirect coordination for autonomous agents
#[derive(Parser)]
#[command(name = "sbp")]
#[command(version, about, long_about = None)]
struct Cli {
    /// HTTP port to listen on
    #[arg(long, env = "SBP_PORT", default_value = "3000")]
    port: u16,

    /// HTTP host to bind
    #[arg(long, env = "SBP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log", env = "SBP_LOG", default_value = "info")]
    log_level: String,

    /// Comma-separated API keys; enables the auth hook when set
    #[arg(long = "api-key", env = "SBP_API_KEYS", value_delimiter = ',')]
    api_keys: Vec<String>,

    /// Requests per minute per agent; enables the rate-limit hook
    #[arg(long = "rate-limit", env = "SBP_RATE_LIMIT")]
    rate_limit: Option<u32>,

    /// Scent evaluation cadence in milliseconds
    #[arg(long, env = "SBP_EVALUATION_INTERVAL_MS", default_value = "100")]
    evaluation_interval_ms: u64,

    /// Soft cap on stored pheromones before garbage collection
    #[arg(long, env = "SBP_MAX_PHEROMONES", default_value = "10000")]
    max_pheromones: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let config = BlackboardConfig {
        evaluation_interval_ms: cli.evaluation_interval_ms,
        max_pheromones: cli.max_pheromones,
        ..Default::default()
    };
    config.validate().context("invalid blackboard configuration")?;

    let server = ServerConfig {
        host: cli.host,
        port: cli.port,
        api_keys: cli.api_keys.into_iter().filter(|k| !k.is_empty()).collect(),
        rate_limit_per_minute: cli.rate_limit,
        ..Default::default()
    };

    if !server.api_keys.is_empty() {
        info!(keys = server.api_keys.len(), "api key auth enabled");
    }
    if let Some(limit) = server.rate_limit_per_minute {
        info!(limit, "rate limiting enabled");
    }

    let blackboard = Arc::new(Blackboard::new(config));

    let evaluator = Arc::new(ScentEvaluator::new(
        blackboard.clone(),
        Arc::new(HttpTriggerDispatcher::new()),
    ));
    let shutdown = evaluator.shutdown_token();
    let evaluator_handle = evaluator.start();

    // Ctrl-C cancels both the evaluator and the HTTP server.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let result = serve(blackboard, server, shutdown.clone()).await;
    if let Err(e) = &result {
        eprintln!("{} {e:#}", "error:".red().bold());
    }

    shutdown.cancel();
    let _ = evaluator_handle.await;

    result
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
