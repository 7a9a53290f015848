mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::contracts::{MailTransport, RecordStore};

pub use handlers::{
    AccountingContactRequest, AllocateResponse, ApiError, AppState, ErrorResponse,
    ListPartiesQuery, ListSlipsQuery, PartyRequest, ResetSequenceRequest, SetStatusRequest,
    StoreAllocator, SuccessResponse,
};

/// Creates the API router.
pub fn create_router<S: RecordStore + 'static, M: MailTransport + 'static>(
    state: Arc<AppState<S, M>>,
) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics::<S, M>))
        // Slip number sequences
        .route(
            "/sequences/:kind",
            get(handlers::get_sequence::<S, M>).put(handlers::reset_sequence::<S, M>),
        )
        .route(
            "/sequences/:kind/allocate",
            post(handlers::allocate_number::<S, M>),
        )
        // Slips
        .route(
            "/slips/:kind",
            post(handlers::create_slip::<S, M>).get(handlers::list_slips::<S, M>),
        )
        .route(
            "/slips/:kind/:id",
            get(handlers::get_slip::<S, M>).patch(handlers::update_slip::<S, M>),
        )
        .route(
            "/slips/:kind/:id/status",
            put(handlers::set_slip_status::<S, M>),
        )
        .route(
            "/slips/:kind/:id/document",
            get(handlers::render_document::<S, M>),
        )
        .route(
            "/slips/:kind/:id/email-draft",
            get(handlers::email_draft::<S, M>),
        )
        .route("/summary", get(handlers::activity_summary::<S, M>))
        // Clients and suppliers
        .route("/parties", get(handlers::list_parties::<S, M>))
        .route(
            "/parties/:id",
            get(handlers::get_party::<S, M>).put(handlers::put_party::<S, M>),
        )
        .route(
            "/parties/:id/contacts",
            get(handlers::party_contacts::<S, M>).post(handlers::add_contact::<S, M>),
        )
        .route(
            "/parties/:id/contacts/:contact_id",
            put(handlers::update_contact::<S, M>).delete(handlers::delete_contact::<S, M>),
        )
        .route(
            "/parties/:id/accounting-contact",
            put(handlers::put_accounting_contact::<S, M>),
        )
        // Mail relay
        .route("/api/send-email", post(handlers::send_email::<S, M>))
        .route("/api/test-smtp", post(handlers::test_smtp))
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// Reads `BORDEREAU_HOST` and `BORDEREAU_PORT`, keeping defaults for
    /// unset or unparseable values.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("BORDEREAU_HOST").unwrap_or(default.host),
            port: std::env::var("BORDEREAU_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Starts the HTTP server.
pub async fn start_server<S, M, F>(
    config: ServerConfig,
    state: Arc<AppState<S, M>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: RecordStore + 'static,
    M: MailTransport + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
