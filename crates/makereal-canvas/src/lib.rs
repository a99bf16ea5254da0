//! Board model and embedded rendering surfaces.
//!
//! Code-editor shapes on the board are rendered by embedded surfaces (browser
//! documents hosting a live editor) that connect back to the host. The host can
//! ask a surface for a screenshot of its current state through the
//! [`SnapshotRegistry`] handshake.

pub mod board;
pub mod export;
pub mod handshake;
pub mod protocol;
pub mod shape;

pub use board::{Board, GeoKind, GeoProps, Shape, ShapeKind, ShapeUpdate, TextProps};
pub use export::{Grid, Svg, SvgExportOptions, add_grid_to_svg, png_data_url, selection_to_svg, svg_to_png};
pub use handshake::{Delivery, SnapshotRegistry, SnapshotResult, SurfaceHost};
pub use protocol::{CaptureRequest, CaptureResponse, HostMessage};
pub use shape::CodeEditorProps;
