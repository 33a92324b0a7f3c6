//! Local HTTP servers standing in for the Arweave gateway and the AO units.
//!
//! Each server binds 127.0.0.1:0 and serves on the current runtime; the
//! returned base URL is plugged into the client config under test.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Arweave gateway
// ---------------------------------------------------------------------------

/// What the mock gateway answers with.
#[derive(Clone)]
pub struct Ledger {
    /// Transaction ids returned by the GraphQL index, newest first.
    pub transactions: Vec<String>,
    /// Body served for every transaction id; `None` answers 500.
    pub payload: Option<Value>,
}

#[derive(Default)]
pub struct LedgerLog {
    pub queries: Mutex<Vec<String>>,
    pub fetched: Mutex<Vec<String>>,
}

struct LedgerState {
    ledger: Ledger,
    log: Arc<LedgerLog>,
}

async fn graphql(State(state): State<Arc<LedgerState>>, Json(body): Json<Value>) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default().to_string();
    state.log.queries.lock().unwrap().push(query);

    let edges: Vec<Value> = state
        .ledger
        .transactions
        .iter()
        .map(|id| json!({ "node": { "id": id, "tags": [] } }))
        .collect();
    Json(json!({ "data": { "transactions": { "edges": edges } } }))
}

async fn transaction(
    State(state): State<Arc<LedgerState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.log.fetched.lock().unwrap().push(id);
    match &state.ledger.payload {
        Some(payload) => (StatusCode::OK, Json(payload.clone())).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "gateway exploded").into_response(),
    }
}

/// Start a gateway. Returns `(graphql_endpoint, data_endpoint, log)`.
pub async fn spawn_ledger(ledger: Ledger) -> (String, String, Arc<LedgerLog>) {
    let log = Arc::new(LedgerLog::default());
    let state = Arc::new(LedgerState { ledger, log: Arc::clone(&log) });
    let app = Router::new()
        .route("/graphql", post(graphql))
        .route("/tx/:id", get(transaction))
        .with_state(state);

    let base = serve(app).await;
    (format!("{base}/graphql"), format!("{base}/tx"), log)
}

// ---------------------------------------------------------------------------
// AO messenger + compute unit
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct AoLog {
    /// Raw data items posted to the MU.
    pub posted: Mutex<Vec<Bytes>>,
    /// `(message_id, process_id)` pairs looked up on the CU.
    pub lookups: Mutex<Vec<(String, String)>>,
}

struct AoState {
    result: Value,
    log: Arc<AoLog>,
}

#[derive(Deserialize)]
struct ResultQuery {
    #[serde(rename = "process-id")]
    process_id: String,
}

async fn mu_post(State(state): State<Arc<AoState>>, body: Bytes) -> Json<Value> {
    state.log.posted.lock().unwrap().push(body);
    Json(json!({ "message": "Processing DataItem" }))
}

async fn cu_result(
    State(state): State<Arc<AoState>>,
    Path(id): Path<String>,
    Query(query): Query<ResultQuery>,
) -> Json<Value> {
    state.log.lookups.lock().unwrap().push((id, query.process_id));
    Json(state.result.clone())
}

/// Start a combined MU/CU answering every lookup with `result`.
/// Returns the base URL used for both units.
pub async fn spawn_ao(result: Value) -> (String, Arc<AoLog>) {
    let log = Arc::new(AoLog::default());
    let state = Arc::new(AoState { result, log: Arc::clone(&log) });
    let app = Router::new()
        .route("/", post(mu_post))
        .route("/result/:id", get(cu_result))
        .with_state(state);

    (serve(app).await, log)
}
