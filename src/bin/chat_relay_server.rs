//! chat-relay-server: HTTP relay in front of an OpenAI-compatible completions API
//!
//! Usage:
//!   chat-relay-server [--config <path>]

use anyhow::Context;
use chat_relay::{server, CompletionOrchestrator, RelayConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    println!(
        r#"chat-relay-server {}

USAGE:
    chat-relay-server [--config <path>]

OPTIONS:
    --config <path>     YAML configuration file
    -h, --help          Show this help message

ENVIRONMENT:
    CHAT_RELAY_CONFIG               Configuration file (when --config is absent)
    OPENAI_API_BASE_URL             Upstream API root
    OPENAI_API_KEY                  Upstream bearer credential
    OPENAI_MODEL                    Model identifier
    OPENAI_MAX_TOKENS               Max output tokens
    OPENAI_TEMPERATURE              Sampling temperature
    OPENAI_STREAM_ENABLED           Enable POST /chat/stream (true/false)
    RATELIMIT_REQUESTS_PER_MINUTE   Per-client request budget
    CHAT_RELAY_ALLOWED_ORIGIN       CORS origin ("*" for any)
    CHAT_RELAY_BIND                 Listen address
    RUST_LOG                        Log filter"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn resolve_config_path(args: &[String]) -> Option<PathBuf> {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--config" {
            if let Some(path) = args.get(i + 1) {
                return Some(PathBuf::from(path));
            }
        }
    }
    std::env::var("CHAT_RELAY_CONFIG").ok().map(PathBuf::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chat_relay=debug,tower_http=info,info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = resolve_config_path(&args);
    let cfg = RelayConfig::load(config_path.as_deref())
        .with_context(|| format!("loading configuration from {:?}", config_path))?;

    let orchestrator =
        CompletionOrchestrator::from_config(&cfg).context("building upstream client")?;

    server::serve(&cfg, Arc::new(orchestrator)).await?;
    Ok(())
}
