//! Tarpon Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Tarpon components:
//! - Error types and error codes
//! - Identifier helpers shared by the transport and core layers

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{ErrorCode, TarponError};
pub use utils::channel_id;
