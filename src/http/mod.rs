//! HTTP and downstream WebSocket handling.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, upgrade detection)
//!     → websocket.rs (register subscriber, writer/reader tasks)
//!     or
//!     → status.rs (/health JSON, /status HTML)
//! ```

pub mod server;
pub mod status;
pub mod websocket;

pub use server::{AppState, RelayServer};
