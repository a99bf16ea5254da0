//! Board, make-real and surface document handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use makereal_agent::{MakeRealOutcome, make_real};
use makereal_canvas::export::to_exportable_image;
use makereal_canvas::shape::embedded_document;
use makereal_canvas::{CodeEditorProps, Shape, ShapeUpdate, SnapshotResult};
use makereal_core::error::MakeRealError;
use makereal_core::types::ShapeId;

use crate::error::ApiResult;
use crate::state::GatewayState;

/// GET /api/shapes: every shape plus the current selection.
pub async fn list_shapes(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    let board = state.board.read().await;
    Json(json!({
        "shapes": board.shapes(),
        "selection": board.selection(),
    }))
}

/// POST /api/shapes: add a shape. A missing id is generated.
pub async fn create_shape(
    State(state): State<Arc<GatewayState>>,
    Json(shape): Json<Shape>,
) -> impl IntoResponse {
    let mut board = state.board.write().await;
    let id = board.create_shape(shape);
    let created = board.shape(&id).cloned();
    (StatusCode::CREATED, Json(created))
}

/// PATCH /api/shapes/{id}: partial update. New code is pushed to the
/// shape's surface.
pub async fn update_shape(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    Json(update): Json<ShapeUpdate>,
) -> ApiResult<Json<Shape>> {
    let id = ShapeId::from(id);
    let code_changed = update
        .props
        .as_ref()
        .is_some_and(|p| p.contains_key("code"));

    let shape = state.board.write().await.update_shape(&id, update)?.clone();

    if let (true, Some(props)) = (code_changed, shape.as_code_editor()) {
        state.surfaces.push_code(&id, &props.code);
    }
    Ok(Json(shape))
}

/// DELETE /api/shapes/{id}
pub async fn delete_shape(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = ShapeId::from(id);
    state
        .board
        .write()
        .await
        .delete_shape(&id)
        .ok_or(MakeRealError::ShapeNotFound(id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    #[serde(default)]
    pub ids: Vec<ShapeId>,
    #[serde(default)]
    pub all: bool,
}

/// PUT /api/selection: select the given ids, or everything with `all`.
pub async fn put_selection(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<SelectionRequest>,
) -> ApiResult<Json<Value>> {
    let mut board = state.board.write().await;
    if req.all {
        board.select_all();
    } else {
        board.select(&req.ids)?;
    }
    Ok(Json(json!({ "selection": board.selection() })))
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// PUT /api/credentials: hold an API key in memory for this process. An
/// empty or missing key clears it.
pub async fn put_credentials(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<CredentialsRequest>,
) -> StatusCode {
    let key = req.api_key.filter(|k| !k.trim().is_empty());
    info!(set = key.is_some(), "Session API key updated");
    *state.session_api_key.write().await = key;
    StatusCode::NO_CONTENT
}

/// POST /api/make-real: run the pipeline on the current selection.
///
/// The run is spawned so a client that disconnects does not cancel it
/// halfway.
pub async fn post_make_real(
    State(state): State<Arc<GatewayState>>,
) -> ApiResult<Json<MakeRealOutcome>> {
    let outcome = tokio::spawn(async move {
        let credentials = state.credentials().await;
        let outcome = make_real(
            &state.board,
            &state.snapshots,
            &state.surfaces,
            state.provider.as_ref(),
            &credentials,
            &state.config,
        )
        .await?;
        state.surfaces.push_code(&outcome.shape_id, &outcome.code);
        Ok::<_, MakeRealError>(outcome)
    })
    .await
    .map_err(|e| MakeRealError::Other(anyhow::anyhow!("Make real task failed: {e}")))??;
    Ok(Json(outcome))
}

async fn code_editor(state: &GatewayState, id: &ShapeId) -> ApiResult<CodeEditorProps> {
    let board = state.board.read().await;
    board
        .shape(id)
        .and_then(Shape::as_code_editor)
        .cloned()
        .ok_or_else(|| MakeRealError::ShapeNotFound(id.clone()).into())
}

/// GET /api/shapes/{id}/snapshot: ask the shape's surface for a screenshot.
pub async fn get_snapshot(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = ShapeId::from(id);
    code_editor(&state, &id).await?;

    let body = match state.snapshots.request_snapshot(&state.surfaces, &id).await {
        SnapshotResult::Captured(screenshot) => {
            json!({ "status": "captured", "screenshot": screenshot })
        }
        SnapshotResult::TimedOut => json!({ "status": "timed_out" }),
        SnapshotResult::NotAvailable => json!({ "status": "not_available" }),
    };
    Ok(Json(body))
}

/// GET /api/shapes/{id}/export.svg: the shape's exportable image.
pub async fn get_export_svg(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = ShapeId::from(id);
    let props = code_editor(&state, &id).await?;
    let group = to_exportable_image(&state.snapshots, &state.surfaces, &id, &props).await;
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">{group}</svg>"#,
        w = props.w,
        h = props.h
    );
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

/// GET /surfaces/{id}: the document a code-editor surface loads.
pub async fn get_surface_document(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Html<String>> {
    let id = ShapeId::from(id);
    let props = code_editor(&state, &id).await?;
    let socket_url = format!("{}/surfaces/{id}/ws", ws_base_url(&state, &headers));
    debug!(surface_id = %id, socket_url = %socket_url, "Serving surface document");
    Ok(Html(embedded_document(&id, &props, &socket_url)))
}

/// WebSocket base URL surfaces connect back to.
fn ws_base_url(state: &GatewayState, headers: &HeaderMap) -> String {
    if let Some(public) = state.config.gateway.as_ref().and_then(|g| g.public_url.as_deref()) {
        let public = public.trim_end_matches('/');
        return match public.split_once("://") {
            Some(("https", rest)) => format!("wss://{rest}"),
            Some((_, rest)) => format!("ws://{rest}"),
            None => format!("ws://{public}"),
        };
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "{}:{}",
                state.config.gateway_bind(),
                state.config.gateway_port()
            )
        });
    format!("ws://{host}")
}
