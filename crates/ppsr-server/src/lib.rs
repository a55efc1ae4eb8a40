//! PPSR lookup service: HTTP routes and logging setup.
//!
//! The `ppsr-server` binary wires these together with configuration
//! loading and a Chrome launcher.

pub mod http;
pub mod logging;

pub use http::{router, serve, AppState, ErrorBody, COMPLETED_MESSAGE, RUNNING_MESSAGE};
