//! Tool host: research operations exposed over a newline-delimited JSON
//! command protocol.

pub mod contract;
pub mod handler;
pub mod stdio;

pub use handler::ToolHandler;
pub use stdio::{run_bridge, run_stdio_bridge};
