//! # Courier HTTP
//!
//! Production [`Transport`](courier_core::environment::Transport) for the
//! Courier request execution engine, built on `reqwest`.
//!
//! ## Example
//!
//! ```no_run
//! use courier_http::ReqwestTransport;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads COURIER_HTTP_* variables, falling back to defaults
//!     let transport = ReqwestTransport::from_env()?;
//!     println!("{:?}", transport.config());
//!     Ok(())
//! }
//! ```
//!
//! Every call runs in its own tokio task. The handle returned by `send`
//! aborts that task, which drops the in-flight connection.

pub mod config;
pub mod error;
pub mod transport;

// Re-export main types for convenience
pub use config::HttpTransportConfig;
pub use error::HttpError;
pub use transport::ReqwestTransport;
