//! Component invocation collaborator seam
//!
//! Session-open and invocation request payloads are handed off to an
//! implementation of [`ComponentInvoker`]; the dispatcher never inspects
//! them beyond the header byte. The invoker owns writing any responses back
//! through the channel writer.

use async_trait::async_trait;
use bytes::Bytes;
use tarpon_common::error::TarponError;

use crate::channel::ChannelWriter;

/// Handles component-level requests arriving on a channel.
///
/// Called from a spawned worker, never from the channel read loop, so an
/// implementation is free to block on application logic.
#[async_trait]
pub trait ComponentInvoker: Send + Sync {
    /// A peer asks to open a session against a deployed component.
    async fn open_session(
        &self,
        payload: Bytes,
        writer: &ChannelWriter,
    ) -> Result<(), TarponError>;

    /// A peer invokes a method on a deployed component.
    async fn invoke(&self, payload: Bytes, writer: &ChannelWriter) -> Result<(), TarponError>;
}
