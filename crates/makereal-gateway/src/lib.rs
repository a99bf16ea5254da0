//! HTTP and WebSocket gateway.
//!
//! The gateway owns the board, serves the document each code-editor surface
//! runs, accepts the surfaces' WebSocket connections and exposes the board and
//! the make-real pipeline over a small JSON API.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod surfaces;

pub use server::{router, start_gateway};
pub use state::GatewayState;
pub use surfaces::SurfaceManager;
