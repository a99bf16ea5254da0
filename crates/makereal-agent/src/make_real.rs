//! Selection to code, end to end.

use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use makereal_canvas::export::{self, Grid, SvgExportOptions};
use makereal_canvas::{Board, CodeEditorProps, Shape, ShapeKind, ShapeUpdate, SnapshotRegistry, SurfaceHost};
use makereal_core::config::Config;
use makereal_core::error::{MakeRealError, Result};
use makereal_core::types::ShapeId;
use makereal_providers::prompt::SYSTEM_PROMPT;
use makereal_providers::{CompletionRequest, Credentials, LlmProvider, MIN_CODE_LEN, build_messages, extract_code};

/// Horizontal gap between the selection and the generated shape.
const PLACEHOLDER_GAP: f64 = 60.0;
/// Half the height of a 540-unit preview scaled to two thirds.
const PLACEHOLDER_HALF_HEIGHT: f64 = 540.0 * 2.0 / 3.0 / 2.0;
const PLACEHOLDER_TEXT: &str = "generating code...";

const EDITOR_WIDTH: f64 = 400.0;
const EDITOR_MAX_HEIGHT: f64 = 300.0;
const EDITOR_LINE_HEIGHT: f64 = 1.4;
const EDITOR_FONT_SIZE: f64 = 16.0;

/// Provider error messages are cut to this many characters.
const ERROR_MESSAGE_LIMIT: usize = 128;

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct MakeRealOutcome {
    pub shape_id: ShapeId,
    pub code: String,
    pub width: f64,
    pub height: f64,
    pub duration_ms: u64,
}

/// Turn the current selection into code.
///
/// A placeholder code-editor shape is created to the right of the selection
/// before anything slow happens. It is filled with the generated code on
/// success and removed again on any failure.
pub async fn make_real(
    board: &RwLock<Board>,
    snapshots: &SnapshotRegistry,
    host: &dyn SurfaceHost,
    provider: &dyn LlmProvider,
    credentials: &Credentials,
    config: &Config,
) -> Result<MakeRealOutcome> {
    let start = Instant::now();

    let (selected, text, placeholder_id) = {
        let mut board = board.write().await;
        let selected: Vec<Shape> = board.selected_shapes().into_iter().cloned().collect();
        let bounds = board
            .selection_page_bounds()
            .ok_or(MakeRealError::NothingSelected)?;
        let text = board.selection_as_text();

        let placeholder = Shape::new(
            bounds.max_x + PLACEHOLDER_GAP,
            bounds.mid_y() - PLACEHOLDER_HALF_HEIGHT,
            ShapeKind::CodeEditorShape(CodeEditorProps {
                html: PLACEHOLDER_TEXT.into(),
                w: 200.0,
                h: 300.0,
                code: String::new(),
            }),
        );
        let id = board.create_shape(placeholder);
        (selected, text, id)
    };

    info!(
        shape_id = %placeholder_id,
        selected = selected.len(),
        provider = provider.id(),
        "Making selection real"
    );

    let mut placeholder = PlaceholderGuard {
        board,
        id: Some(placeholder_id.clone()),
    };

    let result = generate(
        board,
        &placeholder_id,
        &selected,
        &text,
        snapshots,
        host,
        provider,
        credentials,
        config,
    )
    .await;

    placeholder.disarm();
    match result {
        Ok((code, width, height)) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            info!(shape_id = %placeholder_id, lines = code.split('\n').count(), duration_ms, "Generated code");
            Ok(MakeRealOutcome {
                shape_id: placeholder_id,
                code,
                width,
                height,
                duration_ms,
            })
        }
        Err(e) => {
            warn!(shape_id = %placeholder_id, error = %e, "Make real failed, removing placeholder");
            board.write().await.delete_shape(&placeholder_id);
            Err(e)
        }
    }
}

/// Removes the placeholder if the run is dropped before it settles.
struct PlaceholderGuard<'a> {
    board: &'a RwLock<Board>,
    id: Option<ShapeId>,
}

impl PlaceholderGuard<'_> {
    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for PlaceholderGuard<'_> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match self.board.try_write() {
            Ok(mut board) => {
                board.delete_shape(&id);
                warn!(shape_id = %id, "Make real cancelled, removed placeholder");
            }
            Err(_) => warn!(shape_id = %id, "Make real cancelled while the board was busy, placeholder left behind"),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn generate(
    board: &RwLock<Board>,
    placeholder_id: &ShapeId,
    selected: &[Shape],
    text: &str,
    snapshots: &SnapshotRegistry,
    host: &dyn SurfaceHost,
    provider: &dyn LlmProvider,
    credentials: &Credentials,
    config: &Config,
) -> Result<(String, f64, f64)> {
    let options = SvgExportOptions {
        scale: 1.0,
        background: true,
        ..SvgExportOptions::default()
    };
    let mut svg = export::selection_to_svg(selected, snapshots, host, options)
        .await
        .ok_or_else(|| MakeRealError::Export("Could not get the SVG.".into()))?;
    export::add_grid_to_svg(&mut svg, &Grid::default());

    let document = svg.to_document();
    let png = tokio::task::spawn_blocking(move || export::svg_to_png(&document))
        .await
        .map_err(|e| MakeRealError::Export(format!("Rasterizer task failed: {e}")))??;
    let image = export::png_data_url(&png);
    debug!(png_bytes = png.len(), width = svg.width, height = svg.height, "Selection rasterized");

    let previous_code: Vec<&str> = selected
        .iter()
        .filter_map(Shape::as_code_editor)
        .map(|p| p.code.as_str())
        .collect();

    let request = CompletionRequest {
        model: config.make_real_model(),
        messages: build_messages(
            config.system_prompt().unwrap_or(SYSTEM_PROMPT),
            &image,
            text,
            &previous_code,
        ),
        max_tokens: config.max_tokens(),
        temperature: config.temperature(),
    };

    let completion = provider
        .complete(&request, credentials)
        .await
        .map_err(MakeRealError::ProviderUnavailable)?;

    if let Some(error) = completion.error {
        let message: String = error
            .message
            .unwrap_or_default()
            .chars()
            .take(ERROR_MESSAGE_LIMIT)
            .collect();
        return Err(MakeRealError::Provider(format!("{message}...")));
    }

    let message = completion.message();
    let code = extract_code(message);
    if code.chars().count() < MIN_CODE_LEN {
        warn!(reply = %message, "Model reply too short to be code");
        return Err(MakeRealError::GenerationFailed);
    }

    let lines = code.split('\n').count();
    let height = (lines as f64 * EDITOR_LINE_HEIGHT * EDITOR_FONT_SIZE).min(EDITOR_MAX_HEIGHT);

    board.write().await.update_shape(
        placeholder_id,
        ShapeUpdate::props(json!({
            "html": code,
            "code": code,
            "w": EDITOR_WIDTH,
            "h": height,
        })),
    )?;

    Ok((code.to_string(), EDITOR_WIDTH, height))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use makereal_canvas::{CaptureRequest, GeoKind, GeoProps};
    use makereal_providers::ChatCompletion;

    use super::*;

    struct NoSurfaces;

    impl SurfaceHost for NoSurfaces {
        fn send_capture_request(&self, _request: CaptureRequest) -> bool {
            false
        }
    }

    enum Reply {
        Text(String),
        ApiError(String),
        Unreachable,
        Slow(Duration),
    }

    struct MockProvider {
        reply: Reply,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockProvider {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn id(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
            _credentials: &Credentials,
        ) -> anyhow::Result<ChatCompletion> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.reply {
                Reply::Text(t) => Ok(ChatCompletion::from_text(t.clone())),
                Reply::ApiError(m) => Ok(ChatCompletion::from_error(m.clone())),
                Reply::Unreachable => anyhow::bail!("connection refused"),
                Reply::Slow(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(ChatCompletion::from_text(python_block(3)))
                }
            }
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

    /// Two rectangles spanning (0,0)-(300,150), both selected.
    fn wireframe() -> RwLock<Board> {
        let mut board = Board::new();
        board.create_shape(rect(0.0, 0.0, "Login"));
        board.create_shape(rect(200.0, 100.0, "Submit"));
        board.select_all();
        RwLock::new(board)
    }

    async fn run(board: &RwLock<Board>, provider: &MockProvider) -> Result<MakeRealOutcome> {
        let snapshots = SnapshotRegistry::new(Duration::from_millis(50));
        make_real(
            board,
            &snapshots,
            &NoSurfaces,
            provider,
            &Credentials::api_key("sk-test"),
            &Config::default(),
        )
        .await
    }

    fn python_block(lines: usize) -> String {
        let body: Vec<String> = (0..lines).map(|i| format!("print('line {i}')")).collect();
        format!("Sure!\n```python\n{}\n```", body.join("\n"))
    }

    #[tokio::test]
    async fn test_empty_selection_has_no_side_effects() {
        let board = RwLock::new(Board::new());
        board.write().await.create_shape(rect(0.0, 0.0, ""));
        let provider = MockProvider::new(Reply::Text(python_block(3)));

        let err = run(&board, &provider).await.unwrap_err();
        assert!(matches!(err, MakeRealError::NothingSelected));
        assert_eq!(err.to_string(), "First select something to make real.");
        assert_eq!(board.read().await.shapes().len(), 1);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_success_places_and_fills_editor() {
        let board = wireframe();
        // 8 code lines plus the newlines around them
        let provider = MockProvider::new(Reply::Text(python_block(8)));

        let outcome = run(&board, &provider).await.unwrap();
        assert_eq!(outcome.width, 400.0);
        assert_eq!(outcome.height, 224.0);
        assert!(outcome.code.starts_with("\nprint('line 0')"));

        let board = board.read().await;
        assert_eq!(board.shapes().len(), 3);
        let shape = board.shape(&outcome.shape_id).unwrap();
        assert_eq!(shape.x, 360.0);
        assert_eq!(shape.y, 75.0 - 180.0);
        let props = shape.as_code_editor().unwrap();
        assert_eq!(props.code, outcome.code);
        assert_eq!(props.html, outcome.code);
        assert_eq!((props.w, props.h), (400.0, 224.0));
    }

    #[tokio::test]
    async fn test_height_is_capped() {
        let board = wireframe();
        let provider = MockProvider::new(Reply::Text(python_block(40)));
        let outcome = run(&board, &provider).await.unwrap();
        assert_eq!(outcome.height, 300.0);
    }

    #[tokio::test]
    async fn test_request_carries_image_text_and_previous_code() {
        let board = wireframe();
        let previous = Shape::new(
            0.0,
            300.0,
            ShapeKind::CodeEditorShape(CodeEditorProps {
                code: "print('previous attempt')".into(),
                ..CodeEditorProps::default()
            }),
        );
        {
            let mut b = board.write().await;
            b.create_shape(previous);
            b.select_all();
        }
        let provider = MockProvider::new(Reply::Text(python_block(3)));
        run(&board, &provider).await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.max_tokens, 4096);
        let parts = req.messages[1]["content"].as_array().unwrap();
        assert!(
            parts[0]["image_url"]["url"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );
        let all_text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(all_text.contains("Login\nSubmit"));
        assert!(all_text.contains("print('previous attempt')"));
    }

    #[tokio::test]
    async fn test_short_code_removes_placeholder() {
        let board = wireframe();
        let provider = MockProvider::new(Reply::Text("x".repeat(29)));

        let err = run(&board, &provider).await.unwrap_err();
        assert!(matches!(err, MakeRealError::GenerationFailed));
        assert_eq!(
            err.to_string(),
            "Could not generate a design from those wireframes."
        );
        assert_eq!(board.read().await.shapes().len(), 2);
    }

    #[tokio::test]
    async fn test_minimum_length_code_is_accepted() {
        let board = wireframe();
        let provider = MockProvider::new(Reply::Text("x".repeat(30)));
        let outcome = run(&board, &provider).await.unwrap();
        assert_eq!(outcome.code.len(), 30);
        // one line
        assert_eq!(outcome.height, 1.0 * 1.4 * 16.0);
    }

    #[tokio::test]
    async fn test_error_payload_is_truncated() {
        let board = wireframe();
        let provider = MockProvider::new(Reply::ApiError("e".repeat(200)));

        let err = run(&board, &provider).await.unwrap_err();
        let expected = format!("{}...", "e".repeat(128));
        assert!(matches!(&err, MakeRealError::Provider(m) if *m == expected));
        assert_eq!(err.to_string(), expected);
        assert_eq!(board.read().await.shapes().len(), 2);
    }

    #[tokio::test]
    async fn test_short_error_payload_keeps_ellipsis() {
        let board = wireframe();
        let provider = MockProvider::new(Reply::ApiError("Invalid key".into()));
        let err = run(&board, &provider).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid key...");
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let board = wireframe();
        let provider = MockProvider::new(Reply::Unreachable);

        let err = run(&board, &provider).await.unwrap_err();
        assert!(matches!(err, MakeRealError::ProviderUnavailable(_)));
        assert_eq!(err.to_string(), "Could not contact OpenAI.");
        assert_eq!(board.read().await.shapes().len(), 2);
    }

    #[tokio::test]
    async fn test_selection_is_kept() {
        let board = wireframe();
        let provider = MockProvider::new(Reply::Text(python_block(3)));
        run(&board, &provider).await.unwrap();
        assert_eq!(board.read().await.selection().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_removes_placeholder() {
        let board = wireframe();
        let provider = MockProvider::new(Reply::Slow(Duration::from_secs(5)));

        let res = tokio::time::timeout(Duration::from_millis(300), run(&board, &provider)).await;
        assert!(res.is_err());
        assert_eq!(provider.calls(), 1);

        let board = board.read().await;
        assert_eq!(board.shapes().len(), 2);
        assert!(board.shapes().iter().all(|s| s.as_code_editor().is_none()));
    }
}
