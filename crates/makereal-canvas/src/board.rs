//! In-memory board: shapes and the current selection.

use std::collections::HashSet;

use makereal_core::error::{MakeRealError, Result};
use makereal_core::types::{Bounds, ShapeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::shape::CodeEditorProps;

/// Outline of a geo shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeoKind {
    #[default]
    Rectangle,
    Ellipse,
    Diamond,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoProps {
    pub w: f64,
    pub h: f64,
    #[serde(default)]
    pub geo: GeoKind,
    /// Label drawn inside the shape.
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextProps {
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

fn default_font_size() -> f64 {
    24.0
}

pub(crate) const LINE_HEIGHT: f64 = 1.35;
const CHAR_WIDTH: f64 = 0.6;

impl TextProps {
    /// Approximate rendered size of the text block.
    pub fn size(&self) -> (f64, f64) {
        let lines: Vec<&str> = self.text.lines().collect();
        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let w = longest as f64 * self.font_size * CHAR_WIDTH;
        let h = lines.len().max(1) as f64 * self.font_size * LINE_HEIGHT;
        (w, h)
    }
}

/// Shape type and its props.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "props", rename_all = "kebab-case")]
pub enum ShapeKind {
    Geo(GeoProps),
    Text(TextProps),
    CodeEditorShape(CodeEditorProps),
}

/// A shape placed on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    #[serde(default)]
    pub id: ShapeId,
    pub x: f64,
    pub y: f64,
    /// Rotation in radians around the top-left corner.
    #[serde(default)]
    pub rotation: f64,
    #[serde(flatten)]
    pub kind: ShapeKind,
}

impl Shape {
    pub fn new(x: f64, y: f64, kind: ShapeKind) -> Self {
        Self {
            id: ShapeId::new(),
            x,
            y,
            rotation: 0.0,
            kind,
        }
    }

    /// Unrotated width and height.
    pub fn size(&self) -> (f64, f64) {
        match &self.kind {
            ShapeKind::Geo(p) => (p.w, p.h),
            ShapeKind::Text(p) => p.size(),
            ShapeKind::CodeEditorShape(p) => (p.w, p.h),
        }
    }

    /// Axis-aligned bounds in page space.
    pub fn page_bounds(&self) -> Bounds {
        let (w, h) = self.size();
        Bounds::rotated(self.x, self.y, w, h, self.rotation)
    }

    pub fn as_code_editor(&self) -> Option<&CodeEditorProps> {
        match &self.kind {
            ShapeKind::CodeEditorShape(p) => Some(p),
            _ => None,
        }
    }

    /// Text a reader would see on the shape, if any.
    pub fn text(&self) -> Option<&str> {
        let text = match &self.kind {
            ShapeKind::Geo(p) => p.text.as_str(),
            ShapeKind::Text(p) => p.text.as_str(),
            ShapeKind::CodeEditorShape(_) => return None,
        };
        let trimmed = text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Partial update of a shape. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    /// Props to merge into the shape's current props.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ShapeUpdate {
    pub fn props(props: serde_json::Value) -> Self {
        Self {
            props: match props {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            },
            ..Self::default()
        }
    }
}

/// Shapes in paint order plus the current selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Board {
    shapes: Vec<Shape>,
    #[serde(default)]
    selection: Vec<ShapeId>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape on top of the others. An existing shape with the same id is replaced.
    pub fn create_shape(&mut self, shape: Shape) -> ShapeId {
        let id = shape.id.clone();
        match self.shapes.iter_mut().find(|s| s.id == id) {
            Some(existing) => *existing = shape,
            None => self.shapes.push(shape),
        }
        debug!(shape_id = %id, "Shape created");
        id
    }

    /// Apply a partial update and return the updated shape.
    pub fn update_shape(&mut self, id: &ShapeId, update: ShapeUpdate) -> Result<&Shape> {
        let shape = self
            .shapes
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| MakeRealError::ShapeNotFound(id.clone()))?;

        if let Some(props) = update.props {
            // Merge through JSON so any subset of props can be patched.
            let mut value = serde_json::to_value(&shape.kind)?;
            if let Some(current) = value.get_mut("props").and_then(|p| p.as_object_mut()) {
                current.extend(props);
            }
            shape.kind = serde_json::from_value(value)?;
        }
        if let Some(x) = update.x {
            shape.x = x;
        }
        if let Some(y) = update.y {
            shape.y = y;
        }
        if let Some(rotation) = update.rotation {
            shape.rotation = rotation;
        }
        debug!(shape_id = %id, "Shape updated");
        Ok(shape)
    }

    /// Remove a shape, dropping it from the selection too.
    pub fn delete_shape(&mut self, id: &ShapeId) -> Option<Shape> {
        let index = self.shapes.iter().position(|s| &s.id == id)?;
        self.selection.retain(|s| s != id);
        debug!(shape_id = %id, "Shape deleted");
        Some(self.shapes.remove(index))
    }

    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.iter().find(|s| &s.id == id)
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Replace the selection. Fails without changing it if any id is unknown.
    pub fn select(&mut self, ids: &[ShapeId]) -> Result<()> {
        if let Some(missing) = ids.iter().find(|id| self.shape(id).is_none()) {
            return Err(MakeRealError::ShapeNotFound(missing.clone()));
        }
        let mut seen = HashSet::new();
        self.selection = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.selection = self.shapes.iter().map(|s| s.id.clone()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &[ShapeId] {
        &self.selection
    }

    /// Selected shapes in paint order.
    pub fn selected_shapes(&self) -> Vec<&Shape> {
        self.shapes
            .iter()
            .filter(|s| self.selection.contains(&s.id))
            .collect()
    }

    /// Union of the selected shapes' page bounds.
    pub fn selection_page_bounds(&self) -> Option<Bounds> {
        self.selected_shapes()
            .iter()
            .map(|s| s.page_bounds())
            .reduce(|acc, b| acc.union(&b))
    }

    /// Text of the selected shapes, top to bottom then left to right.
    pub fn selection_as_text(&self) -> String {
        let mut shapes: Vec<&Shape> = self
            .selected_shapes()
            .into_iter()
            .filter(|s| s.text().is_some())
            .collect();
        shapes.sort_by(|a, b| {
            let (ba, bb) = (a.page_bounds(), b.page_bounds());
            ba.min_y
                .total_cmp(&bb.min_y)
                .then(ba.min_x.total_cmp(&bb.min_x))
        });
        shapes
            .iter()
            .filter_map(|s| s.text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
