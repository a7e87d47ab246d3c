//! Tarpon API - Wire protocol definitions
//!
//! This crate provides:
//! - Single-byte message header codes and frame helpers
//! - Request/response and notification payload models
//! - The pluggable payload codec seam and its JSON default

pub mod codec;
pub mod model;
pub mod protocol;

// Re-export commonly used types
pub use codec::{JsonPayloadCodec, PayloadCodec, WireError};
pub use model::*;
