//! Server startup: logging and shutdown plumbing

pub mod logging;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, default_log_dir, init_logging};
