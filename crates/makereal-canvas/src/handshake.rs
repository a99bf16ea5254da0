//! Screenshot handshake between the host and embedded surfaces.
//!
//! Every in-flight request owns one single-shot handler in the registry,
//! keyed by the surface id and a per-request nonce. The handler is
//! registered before the request is sent and released exactly once: by the
//! matching response, by the surface detaching, or by the request's drop
//! guard when the timer wins.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use makereal_core::types::ShapeId;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::protocol::{CaptureRequest, CaptureResponse};

/// How long a surface gets to answer before the request resolves empty.
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Transport used to reach embedded surfaces.
pub trait SurfaceHost: Send + Sync {
    /// Send a capture request to the surface addressed by `request.shapeid`.
    ///
    /// Returns `false` when no surface is attached under that id.
    fn send_capture_request(&self, request: CaptureRequest) -> bool;
}

/// Outcome of a snapshot request. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotResult {
    /// The surface answered with an encoded image.
    Captured(String),
    /// The surface did not answer in time.
    TimedOut,
    /// No surface could be reached under that id.
    NotAvailable,
}

impl SnapshotResult {
    pub fn into_payload(self) -> Option<String> {
        match self {
            Self::Captured(payload) => Some(payload),
            Self::TimedOut | Self::NotAvailable => None,
        }
    }
}

/// What happened to an inbound [`CaptureResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    Ignored,
}

struct Waiter {
    nonce: u64,
    tx: oneshot::Sender<String>,
}

/// Registry of pending snapshot requests.
pub struct SnapshotRegistry {
    timeout: Duration,
    next_nonce: AtomicU64,
    /// Waiters per surface, in issue order.
    pending: Mutex<HashMap<ShapeId, Vec<Waiter>>>,
}

impl Default for SnapshotRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TIMEOUT)
    }
}

impl SnapshotRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            next_nonce: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the surface `surface_id` for a fresh snapshot.
    ///
    /// Resolves immediately with [`SnapshotResult::NotAvailable`] when the host
    /// cannot reach the surface, otherwise within the configured timeout.
    pub async fn request_snapshot(
        &self,
        host: &dyn SurfaceHost,
        surface_id: &ShapeId,
    ) -> SnapshotResult {
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        // Register before sending so a fast response always finds its handler.
        self.lock().entry(surface_id.clone()).or_default().push(Waiter { nonce, tx });
        let _guard = PendingGuard {
            registry: self,
            surface_id,
            nonce,
        };

        let request = CaptureRequest {
            shapeid: surface_id.clone(),
            nonce,
        };
        if !host.send_capture_request(request) {
            debug!(surface_id = %surface_id, "Surface not attached, no snapshot available");
            return SnapshotResult::NotAvailable;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(payload)) => {
                debug!(surface_id = %surface_id, nonce, bytes = payload.len(), "Snapshot captured");
                SnapshotResult::Captured(payload)
            }
            Ok(Err(_)) => {
                debug!(surface_id = %surface_id, nonce, "Surface detached while capturing");
                SnapshotResult::NotAvailable
            }
            Err(_) => {
                debug!(surface_id = %surface_id, nonce, timeout_ms = self.timeout.as_millis() as u64, "Snapshot timed out");
                SnapshotResult::TimedOut
            }
        }
    }

    /// Route an inbound response to the request it answers.
    ///
    /// A response carrying a nonce only matches that exact request. A response
    /// without one matches the most recent pending request for its surface.
    pub fn deliver(&self, response: CaptureResponse) -> Delivery {
        let waiter = {
            let mut pending = self.lock();
            let Some(waiters) = pending.get_mut(&response.shapeid) else {
                trace!(surface_id = %response.shapeid, "No pending snapshot for surface");
                return Delivery::Ignored;
            };
            let index = match response.nonce {
                Some(nonce) => waiters.iter().position(|w| w.nonce == nonce),
                None => waiters.len().checked_sub(1),
            };
            let Some(index) = index else {
                trace!(surface_id = %response.shapeid, nonce = ?response.nonce, "Stale snapshot response");
                return Delivery::Ignored;
            };
            let waiter = waiters.remove(index);
            if waiters.is_empty() {
                pending.remove(&response.shapeid);
            }
            waiter
        };

        // The receiver is gone if the timer fired between removal and send.
        match waiter.tx.send(response.screenshot) {
            Ok(()) => Delivery::Accepted,
            Err(_) => Delivery::Ignored,
        }
    }

    /// Drop every handler for a surface that went away.
    ///
    /// Their requests resolve with [`SnapshotResult::NotAvailable`].
    pub fn detach_surface(&self, surface_id: &ShapeId) -> usize {
        let removed = self.lock().remove(surface_id).map(|w| w.len()).unwrap_or(0);
        if removed > 0 {
            debug!(surface_id = %surface_id, removed, "Released pending snapshots for detached surface");
        }
        removed
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ShapeId, Vec<Waiter>>> {
        // A poisoned map still holds valid waiters.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove_waiter(&self, surface_id: &ShapeId, nonce: u64) {
        let mut pending = self.lock();
        if let Some(waiters) = pending.get_mut(surface_id) {
            waiters.retain(|w| w.nonce != nonce);
            if waiters.is_empty() {
                pending.remove(surface_id);
            }
        }
    }
}

/// Releases a request's handler when the request settles or is dropped.
struct PendingGuard<'a> {
    registry: &'a SnapshotRegistry,
    surface_id: &'a ShapeId,
    nonce: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove_waiter(self.surface_id, self.nonce);
    }
}
