/**
 * API HTTP VISTA COLLECTOR
 *
 * RÔLE :
 * Point d'entrée des rapports réseau envoyés par les hôtes, et lecture du snapshot courant.
 *
 * ROUTES :
 * - POST /upload : rapport JSON (champ `hostname` requis) -> snapshot mémoire + fichier + historique
 * - GET /latest  : snapshot complet hostname -> dernier rapport
 * - GET /history : nombre d'enregistrements archivés
 * - GET /history/{hostname}?limit=N : dernières soumissions d'un hôte (sans `_id`)
 * - GET /health  : "ok"
 *
 * ERREURS :
 * - 400 corps invalide ou `hostname` absent/null/tableau/objet (aucun effet de bord)
 * - 400 paramètres de requête invalides (/history/{hostname}?limit=abc)
 * - 413 corps au-delà de `max_body_bytes` (pas de limite par défaut)
 * - 500 écriture du fichier snapshot impossible (la mémoire, elle, est déjà à jour)
 * - l'historique est best-effort : un échec d'archivage est loggé, jamais renvoyé au client
 * - 503 si l'historique est indisponible en lecture (/history uniquement)
 */

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::{get, post}, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use time::OffsetDateTime;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::history::{HistoryError, HistoryStore, RECORD_ID_FIELD};
use crate::models::{strip_fields, HostsMap, Report, Upload};
use crate::state::SnapshotStore;

pub type SharedHistory = Arc<dyn HistoryStore + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub history: SharedHistory,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid or missing hostname")]
    InvalidInput,
    #[error("failed to write data file")]
    SnapshotWrite,
    #[error("history store unavailable")]
    HistoryUnavailable,
    #[error("invalid query parameters")]
    InvalidQuery,
    #[error("payload too large")]
    PayloadTooLarge,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self {
            ApiError::InvalidInput => StatusCode::BAD_REQUEST,
            ApiError::SnapshotWrite => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::HistoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidQuery => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        };
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `max_body_bytes = None` : aucune limite sur le corps de POST /upload
/// (les rapports bruts d'interfaces/connexions dépassent facilement les 2 MiB d'axum).
pub fn build_router(app_state: AppState, max_body_bytes: Option<usize>) -> Router {
    let body_limit = match max_body_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/upload", post(upload))
        .route("/latest", get(latest))
        .route("/history", get(history_summary))
        .route("/history/{hostname}", get(host_history))
        .with_state(app_state)
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// POST /upload
async fn upload(
    State(app): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map_err(|e| {
        debug!(error = %e, "upload body rejected");
        match e.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
            _ => ApiError::InvalidInput,
        }
    })?;
    let Some(mut upload) = Upload::parse(&body) else {
        debug!(len = body.len(), "rejected upload without usable hostname");
        return Err(ApiError::InvalidInput);
    };
    upload.stamp(OffsetDateTime::now_utc());

    let hostname = upload.hostname.clone();
    let record = upload.report.clone(); // copie indépendante pour l'historique

    if let Err(e) = app.store.upsert_and_persist(upload).await {
        error!(%hostname, error = %e, "error writing snapshot file");
        return Err(ApiError::SnapshotWrite);
    }

    let history = app.history.clone();
    match tokio::task::spawn_blocking(move || history.append(&record)).await {
        Ok(Ok(id)) => debug!(%hostname, record_id = %id, "history record stored"),
        Ok(Err(e)) => error!(%hostname, error = %e, "failed to insert history record"),
        Err(e) => error!(%hostname, error = %e, "history task aborted"),
    }

    info!(%hostname, hosts = app.store.len(), "upload accepted");
    Ok(Json(json!({ "status": "ok" })))
}

// GET /latest
async fn latest(State(app): State<AppState>) -> Json<HostsMap> {
    Json(app.store.snapshot())
}

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

// GET /history
async fn history_summary(State(app): State<AppState>) -> Result<Json<Value>, ApiError> {
    let history = app.history.clone();
    let count = run_history(move || history.count()).await?;
    Ok(Json(json!({ "records": count })))
}

// GET /history/{hostname}
async fn host_history(
    State(app): State<AppState>,
    Path(hostname): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let Query(params) = params.map_err(|e| {
        debug!(error = %e, "invalid history query");
        ApiError::InvalidQuery
    })?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
    let history = app.history.clone();
    let records = run_history(move || history.recent_for(&hostname, limit)).await?;

    // l'identifiant interne du store ne sort jamais
    let id_field = [RECORD_ID_FIELD.to_string()];
    Ok(Json(records.iter().map(|r| strip_fields(r, &id_field)).collect()))
}

async fn run_history<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, HistoryError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => {
            error!(error = %e, "history query failed");
            Err(ApiError::HistoryUnavailable)
        }
        Err(e) => {
            error!(error = %e, "history task aborted");
            Err(ApiError::HistoryUnavailable)
        }
    }
}
