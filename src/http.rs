//! HTTP server: analysis and chat endpoints plus analysis history.

use crate::chat::ChatAssistant;
use crate::classify::{Classifier, ThreatClassification};
use crate::completion::ChatMessage;
use crate::error::Error;
use crate::record::AnalysisRecord;
use crate::store::{AnalysisQuery, AnalysisStorage, ThreatStats};
use crate::submission::{validate, EmailSubmission, RawSubmission};
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

const MISSING_FIELDS: &str = "Missing required fields";
const MESSAGES_REQUIRED: &str = "Messages array required";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AnalysisStorage>,
    pub classifier: Classifier,
    pub chat: ChatAssistant,
}

/// Run the HTTP server until `shutdown` fires.
pub async fn run_http_server(
    listener: TcpListener,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) {
    let app = router(state);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
    {
        error!("HTTP server error: {e}");
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    Router::new()
        .route("/health", get(health_check))
        .route("/analyze-email", post(analyze_email).options(preflight))
        .route("/ai-chat", post(ai_chat).options(preflight))
        .route(
            "/analyses",
            get(list_analyses)
                .post(create_analysis)
                .delete(delete_all_analyses)
                .options(preflight),
        )
        .route(
            "/analyses/{id}",
            get(get_analysis).delete(delete_analysis).options(preflight),
        )
        .route("/stats", get(get_stats))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(e) => error_json(StatusCode::BAD_REQUEST, &e.to_string()),
            Self::Classification(ref e) => {
                error!("Classification failed: {e:?}");
                error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
            Self::Config(ref e) => {
                error!("Configuration error: {e:?}");
                error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
            Self::Io(_) | Self::Database(_) => {
                error!("Internal error: {self}");
                error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

/// Decode, presence-check and validate a submission body.
fn parse_submission(body: &[u8]) -> Result<EmailSubmission, Response> {
    let raw: RawSubmission = serde_json::from_slice(body)
        .map_err(|_| error_json(StatusCode::BAD_REQUEST, "Invalid JSON body"))?;

    if !raw.has_required_fields() {
        return Err(error_json(StatusCode::BAD_REQUEST, MISSING_FIELDS));
    }

    validate(&raw).map_err(|e| {
        debug!("Rejected submission: {} failed validation", e.field());
        Error::from(e).into_response()
    })
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "analysis_count": state.store.stats().total
    }))
}

async fn analyze_email(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ThreatClassification>, Response> {
    let submission = parse_submission(&body)?;
    let classification = state
        .classifier
        .classify(&submission)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(classification))
}

async fn ai_chat(State(state): State<AppState>, body: Bytes) -> Response {
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return error_json(StatusCode::BAD_REQUEST, "Invalid JSON body");
    };
    let Some(messages) = payload.get("messages").filter(|m| m.is_array()) else {
        return error_json(StatusCode::BAD_REQUEST, MESSAGES_REQUIRED);
    };
    let Ok(turns) = serde_json::from_value::<Vec<ChatMessage>>(messages.clone()) else {
        return error_json(StatusCode::BAD_REQUEST, "Invalid message format");
    };

    match state.chat.reply(&turns).await {
        Ok(reply) => Json(json!({ "reply": reply })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_analysis(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<AnalysisRecord>), Response> {
    let submission = parse_submission(&body)?;
    let classification = state
        .classifier
        .classify(&submission)
        .await
        .map_err(IntoResponse::into_response)?;

    let record = AnalysisRecord::new(&submission, classification);
    state.store.push(record.clone());
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_analyses(
    State(state): State<AppState>,
    query: Result<Query<AnalysisQuery>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(query)) => Json(state.store.query(&query)).into_response(),
        Err(e) => {
            debug!("Rejected history query: {e}");
            error_json(StatusCode::BAD_REQUEST, "Invalid query parameters")
        }
    }
}

async fn get_analysis(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    state.store.get_by_id(&id).map_or_else(
        || error_json(StatusCode::NOT_FOUND, "Analysis not found"),
        |record| Json(record).into_response(),
    )
}

async fn delete_all_analyses(State(state): State<AppState>) -> StatusCode {
    state.store.clear();
    StatusCode::NO_CONTENT
}

async fn delete_analysis(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.store.remove(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_json(StatusCode::NOT_FOUND, "Analysis not found")
    }
}

async fn get_stats(State(state): State<AppState>) -> Json<ThreatStats> {
    Json(state.store.stats())
}

async fn not_found() -> Response {
    error_json(StatusCode::NOT_FOUND, "Not found")
}
