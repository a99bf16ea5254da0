//! Export shapes to SVG and rasterize them to PNG.
//!
//! Code-editor shapes have no vector form of their own; their exportable
//! image is a live snapshot obtained through the screenshot handshake.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use base64::Engine;
use makereal_core::error::{MakeRealError, Result};
use makereal_core::types::ShapeId;
use resvg::{tiny_skia, usvg};
use tracing::{debug, warn};

use crate::board::{GeoKind, LINE_HEIGHT, Shape, ShapeKind};
use crate::handshake::{SnapshotRegistry, SurfaceHost};
use crate::shape::CodeEditorProps;

/// Options for [`selection_to_svg`].
#[derive(Debug, Clone, Copy)]
pub struct SvgExportOptions {
    pub scale: f64,
    /// Paint a white background behind the shapes.
    pub background: bool,
    /// Space around the shapes, in page units.
    pub padding: f64,
}

impl Default for SvgExportOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            background: true,
            padding: 32.0,
        }
    }
}

/// Overlay grid drawn on top of an exported image.
#[derive(Debug, Clone)]
pub struct Grid {
    pub color: String,
    pub size: f64,
    pub labels: bool,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            color: "red".into(),
            size: 100.0,
            labels: true,
        }
    }
}

/// An exported SVG document.
#[derive(Debug, Clone)]
pub struct Svg {
    pub width: f64,
    pub height: f64,
    body: String,
}

impl Svg {
    /// Serialize as a standalone SVG document.
    pub fn to_document(&self) -> String {
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">{body}</svg>"#,
            w = self.width,
            h = self.height,
            body = self.body
        )
    }
}

/// Exportable image of a code-editor shape.
///
/// Returns an SVG group holding the surface's snapshot sized to the shape, or
/// an empty group when the surface does not answer or is not attached.
pub async fn to_exportable_image(
    registry: &SnapshotRegistry,
    host: &dyn SurfaceHost,
    id: &ShapeId,
    props: &CodeEditorProps,
) -> String {
    match registry.request_snapshot(host, id).await.into_payload() {
        Some(href) => format!(
            r#"<g><image xlink:href="{}" href="{}" width="{}" height="{}"/></g>"#,
            escape_xml(&href),
            escape_xml(&href),
            props.w,
            props.h
        ),
        None => "<g/>".to_string(),
    }
}

/// Export shapes to SVG, capturing code-editor surfaces concurrently.
///
/// Returns `None` when `shapes` is empty.
pub async fn selection_to_svg(
    shapes: &[Shape],
    registry: &SnapshotRegistry,
    host: &dyn SurfaceHost,
    options: SvgExportOptions,
) -> Option<Svg> {
    let captures = shapes.iter().filter_map(|s| {
        s.as_code_editor().map(|props| async move {
            let image = to_exportable_image(registry, host, &s.id, props).await;
            (s.id.clone(), image)
        })
    });
    let images: HashMap<ShapeId, String> = futures::future::join_all(captures)
        .await
        .into_iter()
        .collect();
    debug!(shapes = shapes.len(), captured = images.len(), "Exporting selection to SVG");
    render_svg(shapes, &images, options)
}

/// Render shapes to SVG using pre-captured images for code-editor shapes.
pub fn render_svg(
    shapes: &[Shape],
    images: &HashMap<ShapeId, String>,
    options: SvgExportOptions,
) -> Option<Svg> {
    let bounds = shapes
        .iter()
        .map(Shape::page_bounds)
        .reduce(|acc, b| acc.union(&b))?;

    let scale = options.scale;
    let pad = options.padding;
    let width = (bounds.width() + pad * 2.0) * scale;
    let height = (bounds.height() + pad * 2.0) * scale;

    let mut body = String::new();
    if options.background {
        let _ = write!(body, r#"<rect width="{width}" height="{height}" fill="white"/>"#);
    }
    let _ = write!(
        body,
        r#"<g transform="scale({scale}) translate({}, {})">"#,
        pad - bounds.min_x,
        pad - bounds.min_y
    );
    for shape in shapes {
        render_shape(&mut body, shape, images);
    }
    body.push_str("</g>");

    Some(Svg {
        width,
        height,
        body,
    })
}

fn render_shape(out: &mut String, shape: &Shape, images: &HashMap<ShapeId, String>) {
    let _ = write!(
        out,
        r#"<g transform="translate({}, {}) rotate({})">"#,
        shape.x,
        shape.y,
        shape.rotation.to_degrees()
    );
    match &shape.kind {
        ShapeKind::Geo(p) => {
            let stroke = r#"fill="none" stroke="black" stroke-width="2""#;
            match p.geo {
                GeoKind::Rectangle => {
                    let _ = write!(out, r#"<rect width="{}" height="{}" {stroke}/>"#, p.w, p.h);
                }
                GeoKind::Ellipse => {
                    let _ = write!(
                        out,
                        r#"<ellipse cx="{}" cy="{}" rx="{}" ry="{}" {stroke}/>"#,
                        p.w / 2.0,
                        p.h / 2.0,
                        p.w / 2.0,
                        p.h / 2.0
                    );
                }
                GeoKind::Diamond => {
                    let _ = write!(
                        out,
                        r#"<polygon points="{},0 {},{} {},{} 0,{}" {stroke}/>"#,
                        p.w / 2.0,
                        p.w,
                        p.h / 2.0,
                        p.w / 2.0,
                        p.h,
                        p.h / 2.0
                    );
                }
            }
            if !p.text.trim().is_empty() {
                write_text(out, &p.text, p.w / 2.0, p.h / 2.0, 22.0, "middle");
            }
        }
        ShapeKind::Text(p) => {
            write_text(out, &p.text, 0.0, 0.0, p.font_size, "start");
        }
        ShapeKind::CodeEditorShape(_) => {
            out.push_str(images.get(&shape.id).map(String::as_str).unwrap_or("<g/>"));
        }
    }
    out.push_str("</g>");
}

/// Multi-line text. `anchor == "middle"` centers the block on `(x, y)`,
/// otherwise it hangs from `(x, y)`.
fn write_text(out: &mut String, text: &str, x: f64, y: f64, font_size: f64, anchor: &str) {
    let lines: Vec<&str> = text.lines().collect();
    let line_height = font_size * LINE_HEIGHT;
    let top = if anchor == "middle" {
        y - line_height * lines.len() as f64 / 2.0
    } else {
        y
    };
    let _ = write!(
        out,
        r#"<text font-family="sans-serif" font-size="{font_size}" text-anchor="{anchor}">"#
    );
    for (i, line) in lines.iter().enumerate() {
        let baseline = top + line_height * (i as f64 + 0.8);
        let _ = write!(out, r#"<tspan x="{x}" y="{baseline}">{}</tspan>"#, escape_xml(line));
    }
    out.push_str("</text>");
}

/// Overlay grid lines every `grid.size` units, with optional coordinate labels.
pub fn add_grid_to_svg(svg: &mut Svg, grid: &Grid) {
    if grid.size <= 0.0 {
        warn!(size = grid.size, "Ignoring grid with non-positive size");
        return;
    }
    let color = escape_xml(&grid.color);
    let mut overlay = format!(r#"<g class="grid" stroke="{color}" stroke-width="1">"#);

    let mut x = grid.size;
    while x < svg.width {
        let _ = write!(overlay, r#"<line x1="{x}" y1="0" x2="{x}" y2="{}"/>"#, svg.height);
        x += grid.size;
    }
    let mut y = grid.size;
    while y < svg.height {
        let _ = write!(overlay, r#"<line x1="0" y1="{y}" x2="{}" y2="{y}"/>"#, svg.width);
        y += grid.size;
    }
    overlay.push_str("</g>");

    if grid.labels {
        let _ = write!(
            overlay,
            r#"<g class="grid-labels" fill="{color}" font-family="sans-serif" font-size="12">"#
        );
        let mut x = grid.size;
        while x < svg.width {
            let _ = write!(overlay, r#"<text x="{}" y="12">{x}</text>"#, x + 2.0);
            x += grid.size;
        }
        let mut y = grid.size;
        while y < svg.height {
            let _ = write!(overlay, r#"<text x="2" y="{}">{y}</text>"#, y - 2.0);
            y += grid.size;
        }
        overlay.push_str("</g>");
    }

    svg.body.push_str(&overlay);
}

static FONT_DB: LazyLock<Arc<usvg::fontdb::Database>> = LazyLock::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    Arc::new(db)
});

/// Rasterize an SVG document to PNG bytes.
pub fn svg_to_png(svg: &str) -> Result<Vec<u8>> {
    let mut opt = usvg::Options::default();
    opt.fontdb = FONT_DB.clone();

    let tree = usvg::Tree::from_str(svg, &opt)
        .map_err(|e| MakeRealError::Export(format!("Failed to parse SVG: {e}")))?;

    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height()).ok_or_else(|| {
        MakeRealError::Export(format!(
            "Failed to create pixmap {}x{}",
            size.width(),
            size.height()
        ))
    })?;

    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| MakeRealError::Export(format!("Failed to encode PNG: {e}")))
}

/// Encode PNG bytes as a `data:` URL.
pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

/// Escape text for XML and HTML content and attribute values.
pub(crate) fn escape_xml(input: &str) -> String {
    let mut s = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => s.push_str("&amp;"),
            '<' => s.push_str("&lt;"),
            '>' => s.push_str("&gt;"),
            '"' => s.push_str("&quot;"),
            '\'' => s.push_str("&#39;"),
            _ => s.push(ch),
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::board::{GeoProps, TextProps};
    use crate::protocol::{CaptureRequest, CaptureResponse};

    struct NoSurfaces;

    impl SurfaceHost for NoSurfaces {
        fn send_capture_request(&self, _request: CaptureRequest) -> bool {
            false
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
        assert_eq!(escape_xml("plain"), "plain");
    }

    /// Answers synchronously from inside `send_capture_request`.
    struct InstantSurface {
        registry: Arc<SnapshotRegistry>,
    }

    impl SurfaceHost for InstantSurface {
        fn send_capture_request(&self, request: CaptureRequest) -> bool {
            self.registry.deliver(CaptureResponse {
                screenshot: "data:image/png;base64,QUJD".into(),
                shapeid: request.shapeid,
                nonce: Some(request.nonce),
            });
            true
        }
    }

    fn rect(x: f64, y: f64, text: &str) -> Shape {
        Shape::new(
            x,
            y,
            ShapeKind::Geo(GeoProps {
                w: 100.0,
                h: 50.0,
                geo: GeoKind::Rectangle,
                text: text.into(),
            }),
        )
    }

    fn editor(x: f64, y: f64) -> Shape {
        Shape::new(
            x,
            y,
            ShapeKind::CodeEditorShape(CodeEditorProps {
                w: 200.0,
                h: 100.0,
                ..CodeEditorProps::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_exportable_image_with_snapshot() {
        let registry = Arc::new(SnapshotRegistry::new(Duration::from_secs(1)));
        let host = InstantSurface {
            registry: registry.clone(),
        };
        let shape = editor(0.0, 0.0);
        let g = to_exportable_image(
            &registry,
            &host,
            &shape.id,
            shape.as_code_editor().unwrap(),
        )
        .await;
        assert_eq!(
            g,
            r#"<g><image xlink:href="data:image/png;base64,QUJD" href="data:image/png;base64,QUJD" width="200" height="100"/></g>"#
        );
    }

    #[tokio::test]
    async fn test_exportable_image_without_surface_is_empty() {
        let registry = SnapshotRegistry::new(Duration::from_secs(2));
        let shape = editor(0.0, 0.0);
        let g = to_exportable_image(&registry, &NoSurfaces, &shape.id, shape.as_code_editor().unwrap())
            .await;
        assert_eq!(g, "<g/>");
    }

    #[tokio::test]
    async fn test_selection_to_svg_size_and_content() {
        let registry = SnapshotRegistry::new(Duration::from_secs(2));
        let shapes = vec![rect(0.0, 0.0, "Login & go"), editor(200.0, 100.0)];
        let svg = selection_to_svg(&shapes, &registry, &NoSurfaces, SvgExportOptions::default())
            .await
            .unwrap();
        // bounds 400 x 200 plus 32 padding on each side
        assert_eq!(svg.width, 464.0);
        assert_eq!(svg.height, 264.0);
        let doc = svg.to_document();
        assert!(doc.starts_with("<svg"));
        assert!(doc.contains(r#"fill="white""#));
        assert!(doc.contains("Login &amp; go"));
        assert!(doc.contains("<g/>"));
    }

    #[tokio::test]
    async fn test_empty_selection_exports_nothing() {
        let registry = SnapshotRegistry::default();
        assert!(
            selection_to_svg(&[], &registry, &NoSurfaces, SvgExportOptions::default())
                .await
                .is_none()
        );
    }

    #[test]
    fn test_grid_lines_and_labels() {
        let shapes = vec![rect(0.0, 0.0, "")];
        let options = SvgExportOptions {
            padding: 100.0,
            background: false,
            ..SvgExportOptions::default()
        };
        let mut svg = render_svg(&shapes, &HashMap::new(), options).unwrap();
        assert_eq!((svg.width, svg.height), (300.0, 250.0));

        add_grid_to_svg(&mut svg, &Grid::default());
        let doc = svg.to_document();
        // vertical at 100, 200; horizontal at 100, 200
        assert_eq!(doc.matches("<line").count(), 4);
        assert!(doc.contains(r#"stroke="red""#));
        assert!(doc.contains(r#"<text x="102" y="12">100</text>"#));
        assert!(doc.contains(r#"<text x="2" y="198">200</text>"#));
    }

    #[test]
    fn test_grid_without_labels() {
        let shapes = vec![rect(0.0, 0.0, "")];
        let mut svg = render_svg(&shapes, &HashMap::new(), SvgExportOptions::default()).unwrap();
        add_grid_to_svg(
            &mut svg,
            &Grid {
                labels: false,
                ..Grid::default()
            },
        );
        assert!(!svg.to_document().contains("grid-labels"));
    }

    #[test]
    fn test_text_shape_renders_lines() {
        let shapes = vec![Shape::new(
            0.0,
            0.0,
            ShapeKind::Text(TextProps {
                text: "one\ntwo".into(),
                font_size: 20.0,
            }),
        )];
        let svg = render_svg(&shapes, &HashMap::new(), SvgExportOptions::default()).unwrap();
        assert_eq!(svg.to_document().matches("<tspan").count(), 2);
    }

    #[test]
    fn test_rasterize_to_png_data_url() {
        let shapes = vec![rect(0.0, 0.0, "")];
        let svg = render_svg(&shapes, &HashMap::new(), SvgExportOptions::default()).unwrap();
        let png = svg_to_png(&svg.to_document()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        assert!(png_data_url(&png).starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn test_rasterize_rejects_garbage() {
        assert!(svg_to_png("not an svg").is_err());
    }
}
