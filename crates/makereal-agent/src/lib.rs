//! The make-real pipeline.
//!
//! Takes the current selection on a [`Board`](makereal_canvas::Board),
//! renders it to an image, asks a vision model for code and places the result
//! in a new code-editor shape next to the selection.

pub mod make_real;

pub use make_real::{MakeRealOutcome, make_real};
