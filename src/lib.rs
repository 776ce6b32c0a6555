//! Email threat-analysis proxy in front of an LLM chat-completion gateway.
//!
//! Submissions are validated ([`validate`]), classified through an injected
//! [`CompletionBackend`] ([`Classifier`]) and optionally kept in an analysis
//! history ([`AnalysisStorage`]). A security-advice chat ([`ChatAssistant`])
//! shares the same backend.

mod chat;
mod classify;
mod completion;
mod error;
mod extract;
mod gateway;
mod http;
mod record;
mod sqlite_store;
mod store;
mod submission;

pub use chat::{ChatAssistant, APOLOGY, EMPTY_REPLY, HISTORY_WINDOW};
pub use classify::{
    build_prompt, parse_classification, Classifier, ThreatClassification, ThreatLevel,
};
pub use completion::{
    ChatMessage, ChatRole, CompletionBackend, CompletionRequest, RetryPolicy, RetryingBackend,
};
pub use error::{ClassificationError, ConfigurationError, Error, Result, ValidationError};
pub use extract::extract_json_object;
pub use gateway::{GatewayClient, GatewayConfig, DEFAULT_GATEWAY_URL, DEFAULT_MODEL};
pub use http::{router, AppState};
pub use record::AnalysisRecord;
pub use sqlite_store::SqliteStore;
pub use store::{AnalysisQuery, AnalysisStorage, AnalysisStore, ThreatStats};
pub use submission::{
    is_valid_address, validate, EmailSubmission, RawSubmission, MAX_ADDRESS_LEN, MAX_BODY_LEN,
    MAX_SUBJECT_LEN,
};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Configuration options for the proxy.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    pub http_port: Option<u16>,
    pub upstream_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub upstream_timeout_secs: Option<u64>,
    pub retry: RetryPolicy,
    pub max_records: Option<usize>,
    pub db_path: Option<String>,
}

impl ProxyOptions {
    fn gateway_config(&self) -> GatewayConfig {
        let defaults = GatewayConfig::default();
        GatewayConfig {
            url: self.upstream_url.clone().unwrap_or(defaults.url),
            model: self.model.clone().unwrap_or(defaults.model),
            api_key: self.api_key.clone(),
            timeout: self.upstream_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Running server handle.
pub struct RunningServer {
    pub http_addr: SocketAddr,
    http_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
    store: Arc<dyn AnalysisStorage>,
}

impl RunningServer {
    /// Stop the server gracefully and flush the store.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.http_handle.await;
        self.store.close();
    }
}

/// Start the proxy with the given options, talking to the configured gateway.
///
/// # Errors
/// Fails if the gateway client cannot be built, the database cannot be
/// opened, or the listener cannot bind.
pub async fn start_proxy(opts: ProxyOptions) -> std::io::Result<RunningServer> {
    let gateway = GatewayClient::new(opts.gateway_config())?;
    info!(
        "Using model {} at {}",
        gateway.config().model,
        gateway.config().url
    );
    let backend: Arc<dyn CompletionBackend> = if opts.retry.max_retries > 0 {
        Arc::new(RetryingBackend::new(gateway, opts.retry))
    } else {
        Arc::new(gateway)
    };
    start_proxy_with_backend(opts, backend).await
}

/// Start the proxy with an explicit completion backend.
///
/// # Errors
/// Fails if the database cannot be opened or the listener cannot bind.
pub async fn start_proxy_with_backend(
    opts: ProxyOptions,
    backend: Arc<dyn CompletionBackend>,
) -> std::io::Result<RunningServer> {
    let http_port = opts.http_port.unwrap_or(8787);
    let max = opts.max_records.unwrap_or(100);

    let store: Arc<dyn AnalysisStorage> = match opts.db_path.as_deref() {
        Some(path) => {
            info!("Persisting analyses to {path}");
            Arc::new(SqliteStore::open(path, max).map_err(Error::from)?)
        }
        None => Arc::new(AnalysisStore::new(max)),
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_listener = TcpListener::bind(("0.0.0.0", http_port)).await?;
    let http_addr = http_listener.local_addr()?;

    info!("HTTP server listening on port {}", http_addr.port());

    let state = AppState {
        store: Arc::clone(&store),
        classifier: Classifier::new(Arc::clone(&backend)),
        chat: ChatAssistant::new(backend),
    };

    let http_shutdown = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        http::run_http_server(http_listener, state, http_shutdown).await;
    });

    Ok(RunningServer {
        http_addr,
        http_handle,
        shutdown_tx,
        store,
    })
}
