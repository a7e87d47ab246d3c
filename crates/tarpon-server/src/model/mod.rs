//! Server-side models

pub mod config;

pub use config::*;
