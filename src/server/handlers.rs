use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Html,
    Json,
};

use super::error::AppError;
use super::AppState;
use crate::model::{Kind, Metric, MetricPayload, MetricQuery};

type JsonBody<T> = Result<Json<T>, JsonRejection>;

// ─── GET / ───────────────────────────────────────────────────────

pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let metrics = state.storage.get_all().await.map_err(AppError::Path)?;

    let mut rows = String::new();
    for m in &metrics {
        let _ = writeln!(
            rows,
            "      <tr><td>{}</td><td>{}</td></tr>",
            escape(&m.id),
            m.value
        );
    }

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html>\n  <head>\n    <title>Metrics</title>\n  </head>\n  <body>\n    \
         <p>List of metrics.</p>\n    <table>\n      <tr><td>Name</td><td>Value</td></tr>\n{rows}    \
         </table>\n  </body>\n</html>\n"
    )))
}

// ─── GET /ping ───────────────────────────────────────────────────

pub async fn ping(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.storage.ping().await {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

// ─── Plain-text routes ───────────────────────────────────────────

/// `GET /value/:type/:id`: the stored value as plain text.
pub async fn value_path(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<String, AppError> {
    let kind: Kind = kind.parse().map_err(AppError::Path)?;
    let metric = state.storage.get_one(&id, kind).await.map_err(AppError::Path)?;
    Ok(metric.value.to_string())
}

/// `POST /update/:type/:id/:value`
pub async fn update_path(
    State(state): State<Arc<AppState>>,
    Path((kind, id, raw)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    let metric = Metric::parse(&kind, &id, &raw).map_err(AppError::Path)?;
    state.storage.update_one(metric).await.map_err(AppError::Path)?;
    Ok(StatusCode::OK)
}

// ─── JSON routes ─────────────────────────────────────────────────

/// `POST /update/`: one metric in, the stored metric (re-signed) out.
pub async fn update_json(
    State(state): State<Arc<AppState>>,
    body: JsonBody<MetricPayload>,
) -> Result<Json<MetricPayload>, AppError> {
    let Json(payload) = body?;
    let metric = payload.validate(&state.hash_key).map_err(AppError::Json)?;
    let stored = state.storage.update_one(metric).await.map_err(AppError::Json)?;
    Ok(Json(stored.signed(&state.hash_key).into()))
}

/// `POST /updates/`: every metric is validated before any is applied, so
/// one bad entry rejects the whole batch.
pub async fn updates_json(
    State(state): State<Arc<AppState>>,
    body: JsonBody<Vec<MetricPayload>>,
) -> Result<Json<Vec<MetricPayload>>, AppError> {
    let Json(payloads) = body?;
    let metrics = payloads
        .into_iter()
        .map(|p| p.validate(&state.hash_key))
        .collect::<crate::Result<Vec<_>>>()
        .map_err(AppError::Json)?;

    let stored = state.storage.update_batch(metrics).await.map_err(AppError::Json)?;
    Ok(Json(
        stored
            .into_iter()
            .map(|m| m.signed(&state.hash_key).into())
            .collect(),
    ))
}

/// `POST /value/`: `{"id","type"}` in, the stored metric (signed) out.
pub async fn value_json(
    State(state): State<Arc<AppState>>,
    body: JsonBody<MetricQuery>,
) -> Result<Json<MetricPayload>, AppError> {
    let Json(query) = body?;
    let kind: Kind = query.kind.parse().map_err(AppError::Json)?;
    let metric = state.storage.get_one(&query.id, kind).await.map_err(AppError::Json)?;
    Ok(Json(metric.signed(&state.hash_key).into()))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
