use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sentiment_api::{start_server_with_auth, ApiAuth};
use sentiment_core::{Backend, CacheKeying, EngineConfig, Language, SentimentService};
use sentiment_history::HistoryStore;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sentiment-server", about = "Sentiment analysis HTTP service")]
struct Cli {
    /// HTTP listening address
    #[arg(long, env = "SENTIMENT_ADDR", default_value = "0.0.0.0:5000")]
    addr: SocketAddr,

    /// Directory holding the analysis history log
    #[arg(long, env = "SENTIMENT_HISTORY_DIR", default_value = "./data")]
    history_dir: PathBuf,

    /// Comma separated API keys accepted in X-API-Key
    #[arg(long, env = "SENTIMENT_API_KEYS", value_delimiter = ',')]
    api_keys: Vec<String>,

    /// Reject /api requests that carry no API key
    #[arg(long, env = "SENTIMENT_REQUIRE_KEYS")]
    require_keys: bool,

    /// Languages whose model is loaded before serving
    #[arg(long, env = "SENTIMENT_PRELOAD", value_delimiter = ',', default_value = "en")]
    preload: Vec<String>,

    /// Model cache keying: language-tag or model-id
    #[arg(long, env = "SENTIMENT_CACHE_KEYING", default_value = "language-tag")]
    cache_keying: CacheKeying,

    /// Largest accepted batch
    #[arg(long, env = "SENTIMENT_MAX_BATCH", default_value_t = 100)]
    max_batch: usize,

    /// Characters kept after text cleanup
    #[arg(long, env = "SENTIMENT_MAX_CHARS", default_value_t = 512)]
    max_chars: usize,

    /// Model backend: lexicon or candle
    #[arg(long, env = "SENTIMENT_BACKEND", default_value = "lexicon")]
    backend: Backend,

    /// Run batch items on the rayon pool
    #[arg(long, env = "SENTIMENT_PARALLEL_BATCHES")]
    parallel_batches: bool,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            backend: self.backend,
            max_chars: self.max_chars,
            cache_keying: self.cache_keying,
            parallel_batches: self.parallel_batches,
            max_batch_size: self.max_batch,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_observability();

    let cli = Cli::parse();
    info!("Starting sentiment server");
    info!("History directory: {:?}", cli.history_dir);

    let history = Arc::new(HistoryStore::open(&cli.history_dir)?);
    let service = SentimentService::from_config(&cli.engine_config())?;

    let preload: Vec<Language> = cli
        .preload
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(Language::from)
        .collect();
    let registry = Arc::clone(service.registry());
    let warmed = tokio::task::spawn_blocking(move || registry.preload(&preload)).await?;
    match warmed {
        Ok(()) => info!(models = ?service.models_loaded(), "models preloaded"),
        // The registry retries on first use.
        Err(err) => warn!(error = %err, "model preload failed"),
    }

    let mut auth = ApiAuth::with_keys(cli.api_keys.iter().filter(|k| !k.is_empty()).cloned());
    if cli.require_keys {
        auth = auth.require_keys();
    }
    info!(keys = auth.key_count(), required = cli.require_keys, "api key auth configured");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    info!("Listening on http://{}", cli.addr);
    start_server_with_auth(listener, service, history, auth, shutdown)
        .await
        .await??;

    info!("Server stopped successfully");
    Ok(())
}

fn init_observability() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .json();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sentiment_api=debug,sentiment_core=debug".into());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();
}
