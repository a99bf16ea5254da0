//! Embedded surface connections.
//!
//! Each code-editor shape's surface connects to `/surfaces/{id}/ws`. Host
//! messages go out as JSON text frames; capture responses come back and are
//! handed to the snapshot registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use makereal_canvas::{CaptureRequest, CaptureResponse, Delivery, HostMessage, SurfaceHost};
use makereal_core::types::ShapeId;

use crate::state::GatewayState;

struct SurfaceClient {
    client_id: u64,
    tx: mpsc::UnboundedSender<String>,
}

/// Live surface connections, keyed by the shape they render.
#[derive(Default)]
pub struct SurfaceManager {
    surfaces: RwLock<HashMap<ShapeId, Vec<SurfaceClient>>>,
    next_client_id: AtomicU64,
}

impl SurfaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `id` and return its client id and outbox.
    pub fn attach(&self, id: &ShapeId) -> (u64, mpsc::UnboundedReceiver<String>) {
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.write()
            .entry(id.clone())
            .or_default()
            .push(SurfaceClient { client_id, tx });
        (client_id, rx)
    }

    /// Remove a connection. Returns `true` when it was the surface's last one.
    pub fn detach(&self, id: &ShapeId, client_id: u64) -> bool {
        let mut surfaces = self.write();
        let Some(clients) = surfaces.get_mut(id) else {
            return true;
        };
        clients.retain(|c| c.client_id != client_id);
        if clients.is_empty() {
            surfaces.remove(id);
            true
        } else {
            false
        }
    }

    pub fn is_attached(&self, id: &ShapeId) -> bool {
        self.read().get(id).is_some_and(|c| !c.is_empty())
    }

    /// Number of surfaces with at least one connection.
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Send a message to every connection of a surface.
    ///
    /// Returns `false` when nothing received it.
    pub fn send(&self, id: &ShapeId, message: &HostMessage) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(t) => t,
            Err(e) => {
                warn!(surface_id = %id, error = %e, "Failed to encode host message");
                return false;
            }
        };
        let mut surfaces = self.write();
        let Some(clients) = surfaces.get_mut(id) else {
            return false;
        };
        clients.retain(|c| c.tx.send(text.clone()).is_ok());
        if clients.is_empty() {
            surfaces.remove(id);
            return false;
        }
        true
    }

    /// Tell a surface its shape's code changed.
    pub fn push_code(&self, id: &ShapeId, code: &str) -> bool {
        self.send(
            id,
            &HostMessage::SetCode {
                shapeid: id.clone(),
                code: code.to_string(),
            },
        )
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ShapeId, Vec<SurfaceClient>>> {
        self.surfaces.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ShapeId, Vec<SurfaceClient>>> {
        self.surfaces.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SurfaceHost for SurfaceManager {
    fn send_capture_request(&self, request: CaptureRequest) -> bool {
        let id = request.shapeid.clone();
        self.send(&id, &HostMessage::TakeScreenshot(request))
    }
}

/// WebSocket upgrade handler for surface connections.
pub async fn surface_ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_surface_connection(state, ShapeId::from(id), socket))
}

async fn handle_surface_connection(state: Arc<GatewayState>, id: ShapeId, ws: WebSocket) {
    let (client_id, mut rx) = state.surfaces.attach(&id);
    info!(surface_id = %id, client_id, "Surface connected");

    let (mut ws_tx, mut ws_rx) = ws.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_surface_message(&state, &id, text.as_str()),
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    if state.surfaces.detach(&id, client_id) {
        let dropped = state.snapshots.detach_surface(&id);
        debug!(surface_id = %id, dropped, "Last surface connection closed");
    }
    info!(surface_id = %id, client_id, "Surface disconnected");
}

fn handle_surface_message(state: &GatewayState, id: &ShapeId, text: &str) {
    let response: CaptureResponse = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            debug!(surface_id = %id, error = %e, "Ignoring unrecognized surface message");
            return;
        }
    };
    if &response.shapeid != id {
        warn!(surface_id = %id, claimed = %response.shapeid, "Dropping response for another shape");
        return;
    }
    match state.snapshots.deliver(response) {
        Delivery::Accepted => debug!(surface_id = %id, "Snapshot delivered"),
        Delivery::Ignored => debug!(surface_id = %id, "Snapshot response had no pending request"),
    }
}
