//! HTTP surface: a single `POST /snap` route that validates raw parameters,
//! hands the job to the render pipeline, and streams the artifact back.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::logo::LogoRegistry;
use crate::render::RenderPipeline;
use crate::request::{RenderRequest, SnapParams, BOTH_SOURCES_MSG, EITHER_SOURCE_MSG};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RenderPipeline>,
    pub logos: Arc<LogoRegistry>,
}

/// Urlencoded body. Only `html` is read; anything else a client posts is
/// ignored, matching the querystring behavior.
#[derive(Debug, Default, Deserialize)]
pub struct SnapBody {
    pub html: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new().route("/snap", post(snap)).with_state(state)
}

async fn snap(
    State(state): State<AppState>,
    Query(params): Query<SnapParams>,
    body: String,
) -> Response {
    // The body is urlencoded when present; anything unparseable acts like
    // an absent `html` field and the source check reports it.
    let html = serde_urlencoded::from_str::<SnapBody>(&body)
        .ok()
        .and_then(|body| body.html);
    let log_params = redacted_params(&params, html.as_deref());

    let request = match RenderRequest::from_params(params, html, &state.logos) {
        Ok(request) => request,
        Err(errors) => {
            // A missing or doubled source is the caller holding the API
            // wrong; everything else is a bad value in an otherwise
            // well-formed request.
            let status = if errors
                .iter()
                .any(|e| e.msg == EITHER_SOURCE_MSG || e.msg == BOTH_SOURCES_MSG)
            {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            warn!(status = %status, params = %log_params, "rejected snap request");
            return (status, Json(json!({ "errors": errors }))).into_response();
        }
    };

    match state.pipeline.render(&request).await {
        Ok(outcome) => {
            for line in &outcome.debug_log {
                info!(target: "hardcopy::page", "{line}");
            }
            info!(
                params = %log_params,
                output = %request.output,
                bytes = outcome.bytes,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                tmpfile = %outcome.artifact.path().display(),
                "snap rendered"
            );

            let content_type = outcome.content_type;
            let artifact = outcome.artifact;
            let bytes = match tokio::fs::read(artifact.path()).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(error = %err, path = %artifact.path().display(), "artifact vanished before send");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": { "kind": "io", "message": err.to_string() } })),
                    )
                        .into_response();
                }
            };
            if let Err(err) = artifact.remove().await {
                warn!(error = %err, "failed to remove temp artifact");
            }

            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(failure) => {
            for line in &failure.debug_log {
                info!(target: "hardcopy::page", "{line}");
            }
            let err = &failure.error;
            warn!(
                kind = err.kind(),
                params = %log_params,
                elapsed_ms = failure.elapsed.as_millis() as u64,
                error = %err,
                "snap failed"
            );
            (
                err.status_code(),
                Json(json!({ "error": { "kind": err.kind(), "message": err.to_string() } })),
            )
                .into_response()
        }
    }
}

/// Parameters as a loggable JSON blob: unset fields dropped, `pass` masked,
/// inline documents reduced to their byte length.
fn redacted_params(params: &SnapParams, html: Option<&str>) -> serde_json::Value {
    let mut blob = match serde_json::to_value(params) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    blob.retain(|_, value| !value.is_null());
    if blob.contains_key("pass") {
        blob.insert("pass".to_string(), json!("*****"));
    }
    if let Some(html) = html {
        blob.insert("html_bytes".to_string(), json!(html.len()));
    }
    serde_json::Value::Object(blob)
}
