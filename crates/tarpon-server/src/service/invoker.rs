//! Placeholder component invoker
//!
//! The server distribution carries no deployed components, so session-open
//! and invocation payloads are logged and dropped. Embedders supply a real
//! invoker.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use tarpon_common::TarponError;
use tarpon_core::channel::ChannelWriter;
use tarpon_core::invocation::ComponentInvoker;

#[derive(Default)]
pub struct NoopComponentInvoker;

#[async_trait]
impl ComponentInvoker for NoopComponentInvoker {
    async fn open_session(
        &self,
        payload: Bytes,
        writer: &ChannelWriter,
    ) -> Result<(), TarponError> {
        warn!(
            channel = %writer.id(),
            bytes = payload.len(),
            "no components deployed; dropping session-open request"
        );
        Ok(())
    }

    async fn invoke(&self, payload: Bytes, writer: &ChannelWriter) -> Result<(), TarponError> {
        warn!(
            channel = %writer.id(),
            bytes = payload.len(),
            "no components deployed; dropping invocation request"
        );
        Ok(())
    }
}
