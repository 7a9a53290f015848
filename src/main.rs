use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use bordereau::api::{start_server, AppState, ServerConfig};
use bordereau::contracts::RecordStore;
use bordereau::mail::{SmtpConfig, SmtpMailer};
use bordereau::metrics::MetricsRegistry;
use bordereau::render::DocumentRenderer;
use bordereau::storage::{AllocatorConfig, CounterAllocator, MemoryStore, RocksDbStore};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bordereau=info".parse()?))
        .init();

    tracing::info!("Bordereau starting...");

    let in_memory = std::env::var("BORDEREAU_STORE")
        .map(|v| v.eq_ignore_ascii_case("memory"))
        .unwrap_or(false);

    if in_memory {
        tracing::warn!("Using in-memory store; data is lost on shutdown");
        run(Arc::new(MemoryStore::new())).await
    } else {
        let data_dir = std::env::var("BORDEREAU_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let store = Arc::new(RocksDbStore::open(&data_dir)?);
        tracing::info!("Opened RocksDB at {}", data_dir);
        run(store).await
    }
}

async fn run<S: RecordStore + 'static>(store: Arc<S>) -> Result<(), BoxError> {
    let allocator_config = AllocatorConfig::from_env();
    tracing::info!(
        max_retries = allocator_config.max_retries,
        initial_delay_ms = allocator_config.initial_delay_ms,
        max_delay_ms = allocator_config.max_delay_ms,
        "Slip number allocator configured"
    );
    let allocator = CounterAllocator::new(Arc::clone(&store)).with_config(allocator_config);

    // The relay stays uninitialized without SMTP settings
    let mailer = match SmtpConfig::from_env() {
        Some(config) if config.is_complete() => match SmtpMailer::new(&config) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                tracing::error!(error = %e, "Error initializing SMTP transporter");
                None
            }
        },
        Some(config) => {
            tracing::error!(host = %config.host, "Incomplete SMTP settings; email sending disabled");
            None
        }
        None => {
            tracing::info!("No SMTP settings found; email sending disabled");
            None
        }
    };

    let renderer = DocumentRenderer::from_env();
    tracing::info!(template_dir = %renderer.template_dir().display(), "Bordereau templates");

    let state = Arc::new(AppState::<S, SmtpMailer>::new(
        store,
        allocator,
        mailer,
        renderer,
        Arc::new(MetricsRegistry::new()),
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
    };

    start_server(ServerConfig::from_env(), state, shutdown).await?;

    tracing::info!("Bordereau stopped");
    Ok(())
}
