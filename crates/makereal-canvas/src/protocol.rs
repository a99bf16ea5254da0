//! Messages exchanged between the host and embedded surfaces.

use makereal_core::types::ShapeId;
use serde::{Deserialize, Serialize};

/// Ask a surface to render its current state to an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub shapeid: ShapeId,
    /// Correlates the response with this request.
    pub nonce: u64,
}

/// A surface's answer to a [`CaptureRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResponse {
    /// Encoded image, typically a `data:image/png;base64,...` URL.
    pub screenshot: String,
    pub shapeid: ShapeId,
    /// Echo of the request nonce. Surfaces that predate nonces omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
}

/// Messages sent from the host to a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum HostMessage {
    /// Produce a snapshot now.
    TakeScreenshot(CaptureRequest),
    /// Replace the editor contents after the shape's code changed.
    SetCode { shapeid: ShapeId, code: String },
}
