//! CLI entry point for threat-proxy.

use clap::Parser;
use threat_proxy::{
    start_proxy, ProxyOptions, RetryPolicy, DEFAULT_GATEWAY_URL, DEFAULT_MODEL,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "threat-proxy")]
#[command(about = "Classify emails for phishing and malware through an LLM gateway")]
struct Cli {
    /// HTTP port to listen on
    #[arg(short = 'p', long, default_value = "8787")]
    http_port: u16,

    /// Chat-completions endpoint of the LLM gateway
    #[arg(long, default_value = DEFAULT_GATEWAY_URL)]
    upstream_url: String,

    /// Model identifier sent upstream
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Bearer token for the gateway
    #[arg(long, env = "GATEWAY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Upstream request timeout in seconds (transport default when unset)
    #[arg(long)]
    upstream_timeout: Option<u64>,

    /// Retries for transient upstream failures (429, 5xx, unreachable)
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Max number of analyses to keep in history
    #[arg(short = 'm', long, default_value = "100")]
    max: usize,

    /// Persist analysis history to this SQLite file
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.api_key.is_none() {
        tracing::warn!("No gateway API key configured; analysis and chat requests will fail");
    }

    let opts = ProxyOptions {
        http_port: Some(cli.http_port),
        upstream_url: Some(cli.upstream_url),
        model: Some(cli.model),
        api_key: cli.api_key,
        upstream_timeout_secs: cli.upstream_timeout,
        retry: RetryPolicy {
            max_retries: cli.retries,
            ..RetryPolicy::default()
        },
        max_records: Some(cli.max),
        db_path: cli.db,
    };

    let server = start_proxy(opts).await?;

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    server.stop().await;

    Ok(())
}
