use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use bordereau::api::{create_router, AppState};
use bordereau::contracts::{
    AccountingContact, Contact, FixedYear, MailError, MailTransport, OutgoingMail, Party,
    RecordStore, Slip, SlipKind, SlipNumberConfig, StorageError,
};
use bordereau::metrics::MetricsRegistry;
use bordereau::render::DocumentRenderer;
use bordereau::storage::{AllocatorConfig, CounterAllocator, MemoryStore};
use uuid::Uuid;

/// Mail transport that records what it is asked to send.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMail>>,
    failure: Option<String>,
}

impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail.clone());
        match &self.failure {
            Some(msg) => Err(MailError::Smtp(msg.clone())),
            None => Ok(()),
        }
    }

    async fn verify(&self) -> Result<(), MailError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".into()
    }
}

struct TestApp {
    router: Router,
    mailer: Option<Arc<RecordingTransport>>,
    _templates: TempDir,
}

fn build_app(mailer: Option<RecordingTransport>) -> TestApp {
    let templates = TempDir::new().unwrap();
    std::fs::write(
        templates.path().join("cmr.html"),
        "<h1>CMR {{number}}</h1><p>{{donneur_ordre}}</p><p>{{date_heure_livraison}}</p>",
    )
    .unwrap();
    std::fs::write(
        templates.path().join("affretement.html"),
        "<h1>Affrètement {{number}}</h1><p>{{transporteur}} {{price}}</p>",
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let allocator = CounterAllocator::with_clock(Arc::clone(&store), Arc::new(FixedYear(2025)));
    let mailer = mailer.map(Arc::new);
    let state = Arc::new(AppState::new(
        store,
        allocator,
        mailer.clone(),
        DocumentRenderer::new(templates.path()),
        Arc::new(MetricsRegistry::new()),
    ));

    TestApp {
        router: create_router(state),
        mailer,
        _templates: templates,
    }
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn call_json(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = call(router, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn email_body() -> Value {
    json!({
        "to": "client@example.com",
        "subject": "Bordereau de transport - Primeurs SA - 2025 0001",
        "body": "Bonjour,\n\nVeuillez trouver ci-joint le bordereau.",
        "attachments": [{
            "filename": "bordereau_2025 0001.pdf",
            "content": "JVBERi0xLjQK",
            "contentType": "application/pdf"
        }]
    })
}

// =============================================================================
// Health and metrics
// =============================================================================

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let app = build_app(None);
    let (status, body) = call_json(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn metrics_endpoint_counts_allocations() {
    let app = build_app(None);
    for _ in 0..3 {
        call_json(&app.router, "POST", "/sequences/transport/allocate", None).await;
    }

    let (status, bytes) = call(&app.router, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("bordereau_allocations_total{type=\"transport\"} 3"));
    assert!(text.contains("bordereau_allocations_total{type=\"freight\"} 0"));
    assert!(text.contains("bordereau_allocation_conflicts_total 0"));
}

// =============================================================================
// Sequences
// =============================================================================

#[tokio::test]
async fn allocation_starts_at_one_with_year_prefix() {
    let app = build_app(None);

    let (status, first) = call_json(&app.router, "POST", "/sequences/freight/allocate", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["number"], "2025 0001");
    assert_eq!(first["type"], "freight");

    let (_, second) = call_json(&app.router, "POST", "/sequences/freight/allocate", None).await;
    assert_eq!(second["number"], "2025 0002");

    let (status, row) = call_json(&app.router, "GET", "/sequences/freight", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["prefix"], "2025");
    assert_eq!(row["current_number"], 2);
}

#[tokio::test]
async fn sequence_not_found_before_first_use() {
    let app = build_app(None);
    let (status, body) = call_json(&app.router, "GET", "/sequences/transport", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SEQUENCE_NOT_FOUND");
}

#[tokio::test]
async fn reset_changes_prefix_and_continues_from_value() {
    let app = build_app(None);
    call_json(&app.router, "POST", "/sequences/transport/allocate", None).await;

    let (status, _) = call_json(
        &app.router,
        "PUT",
        "/sequences/transport",
        Some(json!({"prefix": "2026", "current_number": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, next) = call_json(&app.router, "POST", "/sequences/transport/allocate", None).await;
    assert_eq!(next["number"], "2026 0001");
}

#[tokio::test]
async fn reset_cannot_rewind_under_the_same_prefix() {
    let app = build_app(None);
    for _ in 0..2 {
        call_json(&app.router, "POST", "/sequences/transport/allocate", None).await;
    }

    let (status, body) = call_json(
        &app.router,
        "PUT",
        "/sequences/transport",
        Some(json!({"prefix": "2025", "current_number": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SEQUENCE_REWIND");

    let (_, next) = call_json(&app.router, "POST", "/sequences/transport/allocate", None).await;
    assert_eq!(next["number"], "2025 0003");
}

#[tokio::test]
async fn reset_rejects_blank_prefix() {
    let app = build_app(None);
    let (status, body) = call_json(
        &app.router,
        "PUT",
        "/sequences/transport",
        Some(json!({"prefix": "  ", "current_number": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
    let app = build_app(None);
    let (status, body) = call_json(&app.router, "POST", "/sequences/boat/allocate", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

// =============================================================================
// Slips
// =============================================================================

#[tokio::test]
async fn create_get_update_slip() {
    let app = build_app(None);

    let (status, slip) = call_json(
        &app.router,
        "POST",
        "/slips/transport",
        Some(json!({
            "loading_date": "2025-03-04",
            "loading_address": "Rungis",
            "goods_description": "Palettes",
            "number": "9999 9999"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(slip["number"], "2025 0001");
    assert_eq!(slip["status"], "pending");
    let id = slip["id"].as_str().unwrap().to_string();

    let (status, fetched) = call_json(&app.router, "GET", &format!("/slips/transport/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["loading_address"], "Rungis");

    let (status, updated) = call_json(
        &app.router,
        "PATCH",
        &format!("/slips/transport/{}", id),
        Some(json!({"delivery_address": "Lyon", "number": "2025 0042"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["delivery_address"], "Lyon");
    assert_eq!(updated["loading_address"], "Rungis");
    assert_eq!(updated["number"], "2025 0001");
}

#[tokio::test]
async fn freight_slip_margin_is_computed() {
    let app = build_app(None);
    let (status, slip) = call_json(
        &app.router,
        "POST",
        "/slips/freight",
        Some(json!({"purchase_price": 600.0, "selling_price": 800.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(slip["margin"], 200.0);
    assert_eq!(slip["margin_rate"], 25.0);
}

#[tokio::test]
async fn status_change_and_not_found() {
    let app = build_app(None);
    let (_, slip) = call_json(&app.router, "POST", "/slips/freight", Some(json!({}))).await;
    let id = slip["id"].as_str().unwrap().to_string();

    let (status, changed) = call_json(
        &app.router,
        "PUT",
        &format!("/slips/freight/{}/status", id),
        Some(json!({"status": "in_progress"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(changed["status"], "in_progress");

    // Same id under the other sequence does not exist
    let (status, body) = call_json(&app.router, "GET", &format!("/slips/transport/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SLIP_NOT_FOUND");

    let (status, _) = call_json(&app.router, "GET", "/slips/freight/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_filters_on_loading_date() {
    let app = build_app(None);
    for date in ["2025-01-10", "2025-02-10", "2025-03-10"] {
        call_json(
            &app.router,
            "POST",
            "/slips/transport",
            Some(json!({"loading_date": date})),
        )
        .await;
    }

    let (status, all) = call_json(&app.router, "GET", "/slips/transport", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, february) = call_json(
        &app.router,
        "GET",
        "/slips/transport?start_date=2025-02-01&end_date=2025-02-28",
        None,
    )
    .await;
    let february = february.as_array().unwrap();
    assert_eq!(february.len(), 1);
    assert_eq!(february[0]["loading_date"], "2025-02-10");
}

#[tokio::test]
async fn invalid_json_is_bad_request() {
    let app = build_app(None);
    let request = Request::builder()
        .method("POST")
        .uri("/slips/transport")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was allocated
    let (status, _) = call_json(&app.router, "GET", "/sequences/transport", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Parties, documents and drafts
// =============================================================================

#[tokio::test]
async fn document_and_draft_use_parties() {
    let app = build_app(None);

    let (status, _) = call_json(
        &app.router,
        "PUT",
        "/parties/client-1",
        Some(json!({"name": "Primeurs SA", "email": "compta@primeurs.example"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, party) = call_json(&app.router, "GET", "/parties/client-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(party["name"], "Primeurs SA");

    let (_, slip) = call_json(
        &app.router,
        "POST",
        "/slips/transport",
        Some(json!({"client_id": "client-1", "delivery_date": "2025-03-05"})),
    )
    .await;
    let id = slip["id"].as_str().unwrap().to_string();

    let (status, html) = call(&app.router, "GET", &format!("/slips/transport/{}/document", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(html).unwrap();
    assert!(html.contains("<h1>CMR 2025 0001</h1>"));
    assert!(html.contains("<p>Primeurs SA</p>"));
    assert!(html.contains("05/03/2025 Livraison foulée"));

    let (status, draft) = call_json(
        &app.router,
        "GET",
        &format!("/slips/transport/{}/email-draft", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["to"], json!(["compta@primeurs.example"]));
    assert_eq!(draft["subject"], "Bordereau de transport - Primeurs SA - 2025 0001");
    assert_eq!(draft["attachment_filename"], "bordereau_2025 0001.pdf");
}

#[tokio::test]
async fn missing_party_is_not_found() {
    let app = build_app(None);
    let (status, body) = call_json(&app.router, "GET", "/parties/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PARTY_NOT_FOUND");
}

// =============================================================================
// Mail relay
// =============================================================================

#[tokio::test]
async fn send_email_relays_once() {
    let app = build_app(Some(RecordingTransport::default()));
    let (status, body) = call_json(&app.router, "POST", "/api/send-email", Some(email_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let sent = app.mailer.as_ref().unwrap().sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["client@example.com".to_string()]);
    assert_eq!(sent[0].attachments[0].content_type, "application/pdf");
}

#[tokio::test]
async fn send_email_without_smtp_is_not_configured() {
    let app = build_app(None);
    let (status, body) = call_json(&app.router, "POST", "/api/send-email", Some(email_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "SMTP transporter not initialized");
}

#[tokio::test]
async fn send_email_auth_failure_is_unauthorized_with_details() {
    let app = build_app(Some(RecordingTransport {
        sent: Mutex::new(Vec::new()),
        failure: Some("permanent error (535): 5.7.8 Authentication failed".into()),
    }));
    let (status, body) = call_json(&app.router, "POST", "/api/send-email", Some(email_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "SMTP_AUTHENTICATION_FAILED");
    assert!(body["details"].as_str().unwrap().contains("535"));

    // Failures are not retried
    assert_eq!(app.mailer.as_ref().unwrap().sent.lock().unwrap().len(), 1);

    let (_, metrics) = call(&app.router, "GET", "/metrics", None).await;
    let metrics = String::from_utf8(metrics).unwrap();
    assert!(metrics.contains("bordereau_mail_failures_total{cause=\"authentication\"} 1"));
}

#[tokio::test]
async fn send_email_rejects_bad_recipient_before_sending() {
    let app = build_app(Some(RecordingTransport::default()));
    let mut body = email_body();
    body["to"] = json!(["not an address"]);

    let (status, response) = call_json(&app.router, "POST", "/api/send-email", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "INVALID_EMAIL");
    assert!(app.mailer.as_ref().unwrap().sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_smtp_requires_every_field() {
    let app = build_app(None);
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/api/test-smtp",
        Some(json!({"smtp_host": "smtp.example.com", "smtp_port": "587", "smtp_user": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Configuration SMTP incomplète. Veuillez remplir tous les champs."
    );
}

#[tokio::test]
async fn test_smtp_reports_connection_refused() {
    let app = build_app(None);
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/api/test-smtp",
        Some(json!({
            "smtp_host": "127.0.0.1",
            "smtp_port": 1,
            "smtp_user": "ops@example.com",
            "smtp_pass": "secret",
            "timeout_secs": 2
        })),
    )
    .await;
    assert_ne!(status, StatusCode::OK);
    assert!(!body["details"].as_str().unwrap_or_default().is_empty());
}

// =============================================================================
// Contacts, client listing and activity summary
// =============================================================================

async fn put_party(router: &Router, id: &str, name: &str) {
    let (status, _) = call_json(
        router,
        "PUT",
        &format!("/parties/{}", id),
        Some(json!({"name": name})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn parties_are_listed_and_searchable() {
    let app = build_app(None);
    put_party(&app.router, "c-2", "Transports Martin").await;
    put_party(&app.router, "c-1", "Primeurs SA").await;

    let (status, all) = call_json(&app.router, "GET", "/parties", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Primeurs SA", "Transports Martin"]);

    let (_, found) = call_json(&app.router, "GET", "/parties?search=martin", None).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["id"], "c-2");
}

#[tokio::test]
async fn contact_sheet_round_trip() {
    let app = build_app(None);
    put_party(&app.router, "c-1", "Primeurs SA").await;

    let (status, contact) = call_json(
        &app.router,
        "POST",
        "/parties/c-1/contacts",
        Some(json!({"service": "Réception", "last_name": "Durand", "first_name": "Paul"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let contact_id = contact["id"].as_str().unwrap().to_string();
    assert_eq!(contact["party_id"], "c-1");

    let (status, updated) = call_json(
        &app.router,
        "PUT",
        &format!("/parties/c-1/contacts/{}", contact_id),
        Some(json!({
            "service": "Réception",
            "last_name": "Durand",
            "first_name": "Paul",
            "phone": "0102030405"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["phone"], "0102030405");

    let (status, _) = call_json(
        &app.router,
        "PUT",
        "/parties/c-1/accounting-contact",
        Some(json!({"last_name": "Leroy", "first_name": "Anne", "email": "compta@primeurs.example"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, sheet) = call_json(&app.router, "GET", "/parties/c-1/contacts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sheet["party"]["name"], "Primeurs SA");
    assert_eq!(sheet["contacts"].as_array().unwrap().len(), 1);
    assert_eq!(sheet["accounting_contact"]["email"], "compta@primeurs.example");

    let (status, _) = call(
        &app.router,
        "DELETE",
        &format!("/parties/c-1/contacts/{}", contact_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call_json(
        &app.router,
        "DELETE",
        &format!("/parties/c-1/contacts/{}", contact_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CONTACT_NOT_FOUND");
}

#[tokio::test]
async fn contacts_of_unknown_party_are_not_found() {
    let app = build_app(None);
    let (status, body) = call_json(
        &app.router,
        "POST",
        "/parties/nobody/contacts",
        Some(json!({"last_name": "Durand"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PARTY_NOT_FOUND");

    let (status, _) = call_json(&app.router, "PUT", "/parties/nobody/contacts/not-a-uuid", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_counts_slips_and_sums_freight() {
    let app = build_app(None);
    for date in ["2025-03-03", "2025-04-01"] {
        call_json(&app.router, "POST", "/slips/transport", Some(json!({"loading_date": date}))).await;
    }
    for (date, purchase, selling) in [("2025-03-04", 400.0, 500.0), ("2025-03-05", 700.0, 1000.0)] {
        call_json(
            &app.router,
            "POST",
            "/slips/freight",
            Some(json!({
                "loading_date": date,
                "purchase_price": purchase,
                "selling_price": selling
            })),
        )
        .await;
    }

    let (status, summary) = call_json(
        &app.router,
        "GET",
        "/summary?start_date=2025-03-01&end_date=2025-03-31",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["transport_count"], 1);
    assert_eq!(summary["freight_count"], 2);
    assert_eq!(summary["freight_margin"], 400.0);
    assert_eq!(summary["freight_revenue"], 1500.0);
}

// =============================================================================
// Runtime under counter contention
// =============================================================================

/// Memory store whose counter compare-and-swap never succeeds.
struct ContendedStore(MemoryStore);

impl RecordStore for ContendedStore {
    fn get_counter(&self, kind: SlipKind) -> Result<Option<SlipNumberConfig>, StorageError> {
        self.0.get_counter(kind)
    }
    fn insert_counter_if_absent(&self, config: &SlipNumberConfig) -> Result<bool, StorageError> {
        self.0.insert_counter_if_absent(config)
    }
    fn compare_and_swap_counter(
        &self,
        _: &SlipNumberConfig,
        _: &SlipNumberConfig,
    ) -> Result<bool, StorageError> {
        Ok(false)
    }
    fn put_counter(&self, config: &SlipNumberConfig) -> Result<(), StorageError> {
        self.0.put_counter(config)
    }
    fn insert_slip(&self, slip: &Slip) -> Result<(), StorageError> {
        self.0.insert_slip(slip)
    }
    fn get_slip(&self, kind: SlipKind, id: Uuid) -> Result<Option<Slip>, StorageError> {
        self.0.get_slip(kind, id)
    }
    fn update_slip(&self, slip: &Slip) -> Result<(), StorageError> {
        self.0.update_slip(slip)
    }
    fn list_slips(&self, kind: SlipKind) -> Result<Vec<Slip>, StorageError> {
        self.0.list_slips(kind)
    }
    fn put_party(&self, party: &Party) -> Result<(), StorageError> {
        self.0.put_party(party)
    }
    fn get_party(&self, id: &str) -> Result<Option<Party>, StorageError> {
        self.0.get_party(id)
    }
    fn list_parties(&self) -> Result<Vec<Party>, StorageError> {
        self.0.list_parties()
    }
    fn put_contact(&self, contact: &Contact) -> Result<(), StorageError> {
        self.0.put_contact(contact)
    }
    fn delete_contact(&self, party_id: &str, id: Uuid) -> Result<bool, StorageError> {
        self.0.delete_contact(party_id, id)
    }
    fn list_contacts(&self, party_id: &str) -> Result<Vec<Contact>, StorageError> {
        self.0.list_contacts(party_id)
    }
    fn put_accounting_contact(&self, contact: &AccountingContact) -> Result<(), StorageError> {
        self.0.put_accounting_contact(contact)
    }
    fn get_accounting_contact(
        &self,
        party_id: &str,
    ) -> Result<Option<AccountingContact>, StorageError> {
        self.0.get_accounting_contact(party_id)
    }
}

/// Backoff sleeps between counter retries must not block the async worker:
/// on a single-threaded runtime another task keeps running meanwhile.
#[tokio::test]
async fn contended_allocation_does_not_stall_other_tasks() {
    let store = Arc::new(ContendedStore(MemoryStore::new()));
    let allocator = CounterAllocator::with_clock(Arc::clone(&store), Arc::new(FixedYear(2025)))
        .with_config(AllocatorConfig {
            max_retries: 4,
            initial_delay_ms: 40,
            max_delay_ms: 40,
        });
    let state = Arc::new(AppState::<ContendedStore, RecordingTransport>::new(
        store,
        allocator,
        None,
        DocumentRenderer::new("./templates"),
        Arc::new(MetricsRegistry::new()),
    ));
    let router = create_router(state);

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = Arc::clone(&ticks);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                ticks.fetch_add(1, Ordering::Relaxed);
            }
        })
    };
    tokio::task::yield_now().await;
    let before = ticks.load(Ordering::Relaxed);

    let (status, body) = call_json(&router, "POST", "/sequences/transport/allocate", None).await;
    let during = ticks.load(Ordering::Relaxed) - before;
    ticker.abort();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SEQUENCE_CONTENDED");
    assert!(
        during >= 5,
        "Only {} ticks ran while the allocation was retrying",
        during
    );
}
