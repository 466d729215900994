//! certwatch monitors a configured set of TLS certificates (local files or
//! live `host:port` endpoints), computes days-to-expiry for each, and delivers
//! a webhook notification when a certificate enters its warning window.
//!
//! The long-running entry point is [`daemon::MonitorDaemon`]; everything else
//! is the per-certificate pipeline it drives: [`reader`] retrieves a
//! certificate, [`evaluator`] classifies its urgency, [`tracker`] decides
//! whether a notification is due, and [`dispatcher`] delivers it.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod inventory;
pub mod reader;
pub mod tracker;

// Re-export commonly used types
pub use crate::config::Config;
pub use crate::daemon::MonitorDaemon;
pub use crate::evaluator::UrgencyState;

/// Result type for certwatch operations
pub type Result<T> = anyhow::Result<T>;
