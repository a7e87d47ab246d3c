//! Tarpon server library
//!
//! Wires the core dispatch machinery to a length-prefixed TCP transport and
//! provides the default collaborator implementations, configuration loading,
//! logging, and metrics.

pub mod metrics;
pub mod model;
pub mod service;
pub mod startup;
pub mod transport;

pub use transport::{ServerState, serve};
