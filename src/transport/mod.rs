//! The `transport` module is responsible for network communication with
//! clients over WebSockets.
//!
//! It routes upgrade requests to channels, runs the accept loop and
//! supervises each connection's reader and writer tasks. Payloads are passed
//! to and from the relay untouched.

pub mod route;
pub mod supervisor;
pub mod websocket;

pub use route::Admission;
pub use supervisor::{ConnectionReport, ConnectionState, ConnectionSupervisor, Side, TaskExit};
pub use websocket::{serve, serve_with_gate, start_websocket_server};
