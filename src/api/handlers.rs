use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::Json;
use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contracts::{
    AccountingContact, ActivitySummary, AllocationError, BordereauError, Contact, ContactDetails,
    MailError, MailTransport, OutgoingMail, Party, RecordStore, RenderError, Slip, SlipFields,
    SlipKind, SlipNumber, SlipNumberAllocator, SlipNumberConfig, SlipStatus, SlipUpdate,
    StorageError,
};
use crate::mail::{self, classify_smtp_error, draft_for_slip, EmailDraft, SmtpConfig, SmtpMailer};
use crate::metrics::{MeteredAllocator, MetricsRegistry};
use crate::render::{BordereauContext, DocumentRenderer};
use crate::storage::{CounterAllocator, PartyContacts, SlipService};

/// Allocator stack used by the HTTP surface: CAS counter plus metrics.
pub type StoreAllocator<S> = MeteredAllocator<CounterAllocator<Arc<S>>>;

/// Application state shared across handlers.
pub struct AppState<S: RecordStore, M: MailTransport = SmtpMailer> {
    pub slips: SlipService<Arc<S>, StoreAllocator<S>>,
    /// `None` when SMTP is not configured; the relay then refuses to send.
    pub mailer: Option<Arc<M>>,
    pub renderer: DocumentRenderer,
    pub metrics: Arc<MetricsRegistry>,
}

impl<S: RecordStore, M: MailTransport> AppState<S, M> {
    pub fn new(
        store: Arc<S>,
        allocator: CounterAllocator<Arc<S>>,
        mailer: Option<Arc<M>>,
        renderer: DocumentRenderer,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let allocator = Arc::new(MeteredAllocator::new(allocator, Arc::clone(&metrics)));
        Self {
            slips: SlipService::new(store, allocator),
            mailer,
            renderer,
            metrics,
        }
    }

    fn allocator(&self) -> &StoreAllocator<S> {
        self.slips.allocator()
    }
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    Storage(StorageError),
    Allocation(AllocationError),
    Mail(MailError),
    Render(RenderError),
    SequenceNotFound(SlipKind),
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    fn parts(self) -> (StatusCode, ErrorResponse) {
        let simple = |status: StatusCode, error: String, code: &str| {
            (
                status,
                ErrorResponse {
                    error,
                    code: code.into(),
                    details: None,
                },
            )
        };

        match self {
            ApiError::Storage(e @ StorageError::SlipNotFound { .. }) => {
                simple(StatusCode::NOT_FOUND, e.to_string(), "SLIP_NOT_FOUND")
            }
            ApiError::Storage(e @ StorageError::PartyNotFound(_)) => {
                simple(StatusCode::NOT_FOUND, e.to_string(), "PARTY_NOT_FOUND")
            }
            ApiError::Storage(e @ StorageError::ContactNotFound(_)) => {
                simple(StatusCode::NOT_FOUND, e.to_string(), "CONTACT_NOT_FOUND")
            }
            ApiError::Storage(StorageError::InvalidInput(msg)) => {
                simple(StatusCode::BAD_REQUEST, msg, "INVALID_INPUT")
            }
            ApiError::Storage(e @ StorageError::Duplicate(_)) => {
                simple(StatusCode::CONFLICT, e.to_string(), "DUPLICATE")
            }
            ApiError::Storage(e) => {
                simple(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "STORAGE_ERROR")
            }
            ApiError::Allocation(e @ AllocationError::Contention { .. }) => {
                simple(StatusCode::SERVICE_UNAVAILABLE, e.to_string(), "SEQUENCE_CONTENDED")
            }
            ApiError::Allocation(e @ AllocationError::Rewind { .. }) => {
                simple(StatusCode::BAD_REQUEST, e.to_string(), "SEQUENCE_REWIND")
            }
            ApiError::Allocation(e) => simple(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "ALLOCATION_FAILED",
            ),
            ApiError::Mail(MailError::NotConfigured) => simple(
                StatusCode::SERVICE_UNAVAILABLE,
                MailError::NotConfigured.to_string(),
                "SMTP_NOT_CONFIGURED",
            ),
            ApiError::Mail(MailError::Smtp(details)) => {
                let failure = classify_smtp_error(&details);
                let (status, code) = match failure {
                    mail::SmtpFailure::ConnectionRefused => {
                        (StatusCode::BAD_REQUEST, "SMTP_CONNECTION_REFUSED")
                    }
                    mail::SmtpFailure::Authentication => {
                        (StatusCode::UNAUTHORIZED, "SMTP_AUTHENTICATION_FAILED")
                    }
                    mail::SmtpFailure::Certificate => {
                        (StatusCode::BAD_REQUEST, "SMTP_CERTIFICATE_ERROR")
                    }
                    mail::SmtpFailure::Timeout => (StatusCode::REQUEST_TIMEOUT, "SMTP_TIMEOUT"),
                    mail::SmtpFailure::Other => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "SMTP_ERROR")
                    }
                };
                (
                    status,
                    ErrorResponse {
                        error: failure.summary().into(),
                        code: code.into(),
                        details: Some(details),
                    },
                )
            }
            ApiError::Mail(e) => simple(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_EMAIL"),
            ApiError::Render(e @ RenderError::TemplateNotFound(_)) => simple(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "TEMPLATE_NOT_FOUND",
            ),
            ApiError::Render(e) => {
                simple(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "RENDER_ERROR")
            }
            ApiError::SequenceNotFound(kind) => simple(
                StatusCode::NOT_FOUND,
                format!("No sequence initialized for {}", kind),
                "SEQUENCE_NOT_FOUND",
            ),
            ApiError::BadRequest(msg) => simple(StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            ApiError::Internal(msg) => {
                simple(StatusCode::INTERNAL_SERVER_ERROR, msg, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_response) = self.parts();
        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                code = %error_response.code,
                error = %error_response.error,
                details = ?error_response.details,
                "Request failed"
            );
        }
        (status, Json(error_response)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Storage(e)
    }
}

impl From<AllocationError> for ApiError {
    fn from(e: AllocationError) -> Self {
        ApiError::Allocation(e)
    }
}

impl From<MailError> for ApiError {
    fn from(e: MailError) -> Self {
        ApiError::Mail(e)
    }
}

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        ApiError::Render(e)
    }
}

impl From<BordereauError> for ApiError {
    fn from(e: BordereauError) -> Self {
        match e {
            BordereauError::Storage(e) => ApiError::Storage(e),
            BordereauError::Allocation(e) => ApiError::Allocation(e),
            BordereauError::Mail(e) => ApiError::Mail(e),
            BordereauError::Render(e) => ApiError::Render(e),
        }
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))
}

fn parse_kind(kind: &str) -> Result<SlipKind, ApiError> {
    Ok(SlipKind::from_str(kind)?)
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid slip id '{}': {}", id, e)))
}

fn parse_contact_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid contact id '{}': {}", id, e)))
}

/// Runs a counter operation on the blocking pool. Counter retries sleep the
/// thread they run on, which must not be an async worker.
async fn run_blocking<S, M, T, E, F>(state: &Arc<AppState<S, M>>, f: F) -> Result<T, ApiError>
where
    S: RecordStore + 'static,
    M: MailTransport + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
    F: FnOnce(&AppState<S, M>) -> Result<T, E> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| ApiError::Internal(format!("Blocking task failed: {}", e)))?
        .map_err(Into::into)
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

/// GET /metrics
/// Prometheus text exposition.
pub async fn get_metrics<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
) -> impl IntoResponse {
    let conflicts = state.allocator().inner().conflict_count();
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.format_prometheus(conflicts),
    )
}

/// GET /sequences/{kind}
/// Returns the counter row without allocating.
pub async fn get_sequence<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(kind): Path<String>,
) -> Result<Json<SlipNumberConfig>, ApiError> {
    let kind = parse_kind(&kind)?;
    state
        .allocator()
        .current(kind)?
        .map(Json)
        .ok_or(ApiError::SequenceNotFound(kind))
}

/// Body of a manual sequence reset.
#[derive(Debug, Deserialize)]
pub struct ResetSequenceRequest {
    pub prefix: String,
    pub current_number: u64,
}

/// PUT /sequences/{kind}
/// Replaces the counter row. The only way the prefix changes; the number may
/// not go backwards under an unchanged prefix.
pub async fn reset_sequence<S: RecordStore + 'static, M: MailTransport + 'static>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(kind): Path<String>,
    body: Bytes,
) -> Result<Json<SlipNumberConfig>, ApiError> {
    let kind = parse_kind(&kind)?;
    let request: ResetSequenceRequest = parse_json(&body)?;
    let prefix = request.prefix.trim();
    if prefix.is_empty() || prefix.contains(char::is_whitespace) {
        return Err(ApiError::BadRequest(
            "prefix must be non-empty and contain no whitespace".into(),
        ));
    }

    let config = SlipNumberConfig {
        kind,
        prefix: prefix.to_string(),
        current_number: request.current_number,
    };
    let row = config.clone();
    run_blocking(&state, move |s| s.allocator().reset(row)).await?;
    Ok(Json(config))
}

/// Response for an allocation.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateResponse {
    #[serde(rename = "type")]
    pub kind: SlipKind,
    pub number: SlipNumber,
    pub prefix: String,
    pub sequence: u64,
}

/// POST /sequences/{kind}/allocate
pub async fn allocate_number<S: RecordStore + 'static, M: MailTransport + 'static>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(kind): Path<String>,
) -> Result<(StatusCode, Json<AllocateResponse>), ApiError> {
    let kind = parse_kind(&kind)?;
    let number = run_blocking(&state, move |s| s.allocator().allocate(kind)).await?;
    Ok((
        StatusCode::CREATED,
        Json(AllocateResponse {
            kind,
            prefix: number.prefix.clone(),
            sequence: number.sequence,
            number,
        }),
    ))
}

/// POST /slips/{kind}
pub async fn create_slip<S: RecordStore + 'static, M: MailTransport + 'static>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(kind): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Slip>), ApiError> {
    let kind = parse_kind(&kind)?;
    let fields: SlipFields = parse_json(&body)?;

    match run_blocking(&state, move |s| s.slips.create(kind, fields)).await {
        Ok(slip) => {
            state.metrics.slips.created_total.fetch_add(1, Ordering::Relaxed);
            Ok((StatusCode::CREATED, Json(slip)))
        }
        Err(e) => {
            state.metrics.slips.errors_total.fetch_add(1, Ordering::Relaxed);
            Err(e)
        }
    }
}

/// Query parameters for listing slips.
#[derive(Debug, Default, Deserialize)]
pub struct ListSlipsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// GET /slips/{kind}?start_date=&end_date=
pub async fn list_slips<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(kind): Path<String>,
    Query(query): Query<ListSlipsQuery>,
) -> Result<Json<Vec<Slip>>, ApiError> {
    let kind = parse_kind(&kind)?;
    let slips = state.slips.list(kind, query.start_date, query.end_date)?;
    Ok(Json(slips))
}

/// GET /slips/{kind}/{id}
pub async fn get_slip<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Slip>, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    Ok(Json(state.slips.get(kind, id)?))
}

/// PATCH /slips/{kind}/{id}
/// Any `number` in the body is ignored.
pub async fn update_slip<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path((kind, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Slip>, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    let update: SlipUpdate = parse_json(&body)?;

    let slip = state.slips.update(kind, id, update).inspect_err(|_| {
        state.metrics.slips.errors_total.fetch_add(1, Ordering::Relaxed);
    })?;
    state.metrics.slips.updated_total.fetch_add(1, Ordering::Relaxed);
    Ok(Json(slip))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: SlipStatus,
}

/// PUT /slips/{kind}/{id}/status
pub async fn set_slip_status<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path((kind, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Slip>, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    let request: SetStatusRequest = parse_json(&body)?;

    let slip = state.slips.set_status(kind, id, request.status)?;
    state.metrics.slips.updated_total.fetch_add(1, Ordering::Relaxed);
    Ok(Json(slip))
}

/// Loads a slip together with the parties its bordereau refers to.
fn load_with_parties<S: RecordStore, M: MailTransport>(
    state: &AppState<S, M>,
    kind: SlipKind,
    id: Uuid,
) -> Result<(Slip, Option<Party>, Option<Party>), ApiError> {
    let slip = state.slips.get(kind, id)?;
    let client = state.slips.resolve_party(slip.fields.client_id.as_deref())?;
    let supplier = state.slips.resolve_party(slip.fields.supplier_id.as_deref())?;
    Ok((slip, client, supplier))
}

/// GET /slips/{kind}/{id}/document
/// Bordereau HTML ready for rasterization.
pub async fn render_document<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Html<String>, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    let (slip, client, supplier) = load_with_parties(&state, kind, id)?;

    let html = state.renderer.render_html(&BordereauContext {
        slip: &slip,
        client: client.as_ref(),
        supplier: supplier.as_ref(),
        today: Local::now().date_naive(),
    })?;
    Ok(Html(html))
}

/// GET /slips/{kind}/{id}/email-draft
pub async fn email_draft<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<EmailDraft>, ApiError> {
    let kind = parse_kind(&kind)?;
    let id = parse_id(&id)?;
    let (slip, client, _) = load_with_parties(&state, kind, id)?;
    Ok(Json(draft_for_slip(&slip, client.as_ref())))
}

/// Body of a party upsert. The id comes from the path.
#[derive(Debug, Deserialize)]
pub struct PartyRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
}

/// PUT /parties/{id}
pub async fn put_party<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Party>, ApiError> {
    let request: PartyRequest = parse_json(&body)?;
    let party = Party {
        id,
        name: request.name,
        email: request.email,
        phone: request.phone,
        contact_name: request.contact_name,
    };
    state.slips.put_party(&party)?;
    Ok(Json(party))
}

/// GET /parties/{id}
pub async fn get_party<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(id): Path<String>,
) -> Result<Json<Party>, ApiError> {
    Ok(Json(state.slips.get_party(&id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPartiesQuery {
    pub search: Option<String>,
}

/// GET /parties?search=
pub async fn list_parties<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Query(query): Query<ListPartiesQuery>,
) -> Result<Json<Vec<Party>>, ApiError> {
    Ok(Json(state.slips.list_parties(query.search.as_deref())?))
}

/// GET /parties/{id}/contacts
pub async fn party_contacts<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(id): Path<String>,
) -> Result<Json<PartyContacts>, ApiError> {
    Ok(Json(state.slips.party_contacts(&id)?))
}

/// POST /parties/{id}/contacts
pub async fn add_contact<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let details: ContactDetails = parse_json(&body)?;
    let contact = state.slips.add_contact(&id, details)?;
    Ok((StatusCode::CREATED, Json(contact)))
}

/// PUT /parties/{id}/contacts/{contact_id}
pub async fn update_contact<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path((id, contact_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Contact>, ApiError> {
    let contact_id = parse_contact_id(&contact_id)?;
    let details: ContactDetails = parse_json(&body)?;
    Ok(Json(state.slips.update_contact(&id, contact_id, details)?))
}

/// DELETE /parties/{id}/contacts/{contact_id}
pub async fn delete_contact<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path((id, contact_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let contact_id = parse_contact_id(&contact_id)?;
    state.slips.delete_contact(&id, contact_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body of an accounting contact upsert. The party comes from the path.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AccountingContactRequest {
    pub last_name: String,
    pub first_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// PUT /parties/{id}/accounting-contact
pub async fn put_accounting_contact<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<AccountingContact>, ApiError> {
    let request: AccountingContactRequest = parse_json(&body)?;
    let contact = AccountingContact {
        party_id: id,
        last_name: request.last_name,
        first_name: request.first_name,
        email: request.email,
        phone: request.phone,
    };
    state.slips.put_accounting_contact(&contact)?;
    Ok(Json(contact))
}

/// GET /summary?start_date=&end_date=
/// Slip counts and freight totals over a loading-date range.
pub async fn activity_summary<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    Query(query): Query<ListSlipsQuery>,
) -> Result<Json<ActivitySummary>, ApiError> {
    Ok(Json(state.slips.summary(query.start_date, query.end_date)?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// POST /api/send-email
/// Relays one message. Failures are not retried.
pub async fn send_email<S: RecordStore, M: MailTransport>(
    State(state): State<Arc<AppState<S, M>>>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mail: OutgoingMail = parse_json(&body)?;

    let start = Instant::now();
    let result = mail::relay(state.mailer.as_deref(), &mail).await;
    let latency_us = start.elapsed().as_micros() as u64;

    match result {
        Ok(()) => {
            state.metrics.mail.record_sent(latency_us);
            Ok(Json(SuccessResponse { success: true }))
        }
        Err(e) => {
            if let MailError::Smtp(msg) = &e {
                state
                    .metrics
                    .mail
                    .record_failure(classify_smtp_error(msg), latency_us);
            }
            Err(e.into())
        }
    }
}

const INCOMPLETE_SMTP_CONFIG: &str =
    "Configuration SMTP incomplète. Veuillez remplir tous les champs.";

/// POST /api/test-smtp
/// Verifies the submitted settings and sends a test message to the user.
pub async fn test_smtp(body: Bytes) -> Result<Json<SuccessResponse>, ApiError> {
    let config: SmtpConfig = parse_json(&body)?;
    if !config.is_complete() {
        return Err(ApiError::BadRequest(INCOMPLETE_SMTP_CONFIG.into()));
    }

    let mailer = SmtpMailer::new(&config)?;
    tracing::info!(target_server = %mailer.describe(), "Testing SMTP connection");

    let outcome = async {
        mailer.verify().await?;
        mailer.send_test_message().await
    }
    .await;

    match outcome {
        Ok(()) => {
            tracing::info!(target_server = %mailer.describe(), "SMTP test succeeded");
            Ok(Json(SuccessResponse { success: true }))
        }
        Err(e) => {
            tracing::warn!(target_server = %mailer.describe(), error = %e, "SMTP test failed");
            Err(e.into())
        }
    }
}
