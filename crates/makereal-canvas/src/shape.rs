//! The code-editor shape and the document its embedded surface runs.

use makereal_core::types::{ShapeId, Vec2};
use serde::{Deserialize, Serialize};

use crate::export::escape_xml;

/// Props of a code-editor shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEditorProps {
    pub w: f64,
    pub h: f64,
    /// Contents shown in the editor.
    pub html: String,
    pub code: String,
}

impl Default for CodeEditorProps {
    fn default() -> Self {
        Self {
            w: 400.0,
            h: 300.0,
            html: "<html><body><h1>Hello, World!</h1></body></html>".into(),
            code: "code".into(),
        }
    }
}

/// What the host lets a user do with a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShapeCapabilities {
    pub can_edit: bool,
    pub can_resize: bool,
    pub aspect_ratio_locked: bool,
    pub can_bind: bool,
    pub can_unmount: bool,
}

impl CodeEditorProps {
    pub const CAPABILITIES: ShapeCapabilities = ShapeCapabilities {
        can_edit: true,
        can_resize: true,
        aspect_ratio_locked: false,
        can_bind: false,
        can_unmount: false,
    };

    /// Resize the box, keeping it at least one unit in each direction.
    pub fn resize(&mut self, w: f64, h: f64) {
        self.w = w.max(1.0);
        self.h = h.max(1.0);
    }
}

/// Selection indicator drawn around the shape.
pub fn indicator(props: &CodeEditorProps) -> String {
    format!(r#"<rect width="{}" height="{}"/>"#, props.w, props.h)
}

struct BoxShadow {
    offset_x: f64,
    offset_y: f64,
    blur: f64,
    spread: f64,
    color: &'static str,
}

const ROTATING_BOX_SHADOWS: [BoxShadow; 2] = [
    BoxShadow {
        offset_x: 0.0,
        offset_y: 2.0,
        blur: 4.0,
        spread: -1.0,
        color: "#0000003a",
    },
    BoxShadow {
        offset_x: 0.0,
        offset_y: 3.0,
        blur: 12.0,
        spread: -2.0,
        color: "#0000001f",
    },
];

/// CSS `box-shadow` that keeps the light source fixed while the shape rotates.
pub fn rotated_box_shadow(rotation: f64) -> String {
    ROTATING_BOX_SHADOWS
        .iter()
        .map(|s| {
            let v = Vec2::new(s.offset_x, s.offset_y).rot(-rotation);
            format!(
                "{}px {}px {}px {}px {}",
                round_px(v.x),
                round_px(v.y),
                s.blur,
                s.spread,
                s.color
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn round_px(v: f64) -> f64 {
    let r = (v * 1000.0).round() / 1000.0;
    // Avoid printing "-0px".
    if r == 0.0 { 0.0 } else { r }
}

/// Serialize a value for inclusion inside an inline `<script>` element.
fn script_literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".into())
        .replace("</", "<\\/")
}

/// The document loaded into a code-editor shape's embedded surface.
///
/// It mounts the editor with the shape's contents, connects to `socket_url`
/// and answers capture requests addressed to `id` with an html2canvas
/// rendering of itself.
pub fn embedded_document(id: &ShapeId, props: &CodeEditorProps, socket_url: &str) -> String {
    let mount_id = escape_xml(&format!("editor-{id}"));
    let id_js = script_literal(id.as_str());
    let mount_js = script_literal(&format!("editor-{id}"));
    let socket_js = script_literal(socket_url);
    let contents_js = script_literal(&props.html);

    format!(
        r#"<html><body><div id="{mount_id}"></div><script src="https://unpkg.com/html2canvas"></script><script src="/js/cm6.bundle.min.js"></script><script>
const shapeId = {id_js};
const socket = new WebSocket({socket_js});
const initialState = cm6.createEditorState({contents_js});
const view = cm6.createEditorView(initialState, document.getElementById({mount_js}));
view.setState(initialState);
socket.addEventListener('message', function(event) {{
    const msg = JSON.parse(event.data);
    if (msg.shapeid !== shapeId) return;
    if (msg.action === 'take-screenshot') {{
        html2canvas(document.body, {{useCORS: true}}).then(function(canvas) {{
            const data = canvas.toDataURL('image/png');
            socket.send(JSON.stringify({{screenshot: data, shapeid: shapeId, nonce: msg.nonce}}));
        }});
    }} else if (msg.action === 'set-code') {{
        view.setState(cm6.createEditorState(msg.code));
    }}
}});
document.body.addEventListener('wheel', e => {{ if (!e.ctrlKey) return; e.preventDefault(); }}, {{ passive: false }});
document.body.addEventListener('touchmove', e => {{ e.preventDefault(); }}, {{ passive: false }});
</script></body></html>"#
    )
}
