//! Component-availability push
//!
//! One notifier per channel. On subscription it replays the currently
//! deployed modules in a single components-available message (only if any
//! exist); afterwards every feed event becomes a single-element message.
//! Delivery is best-effort: a send failure is logged and swallowed, it never
//! affects the subscription itself.

use std::sync::Arc;

use tracing::{debug, warn};

use tarpon_api::PayloadCodec;
use tarpon_api::model::{ModuleAvailability, ModuleId};
use tarpon_api::protocol::{self, HEADER_MODULE_AVAILABLE, HEADER_MODULE_UNAVAILABLE};

use crate::channel::ChannelWriter;
use crate::deployment::DeploymentListener;

pub struct AvailabilityNotifier {
    writer: ChannelWriter,
    codec: Arc<dyn PayloadCodec>,
}

impl AvailabilityNotifier {
    pub fn new(writer: ChannelWriter, codec: Arc<dyn PayloadCodec>) -> Self {
        Self { writer, codec }
    }

    async fn send_availability(&self, header: u8, modules: Vec<ModuleId>) {
        let payload = ModuleAvailability { modules };
        let body = match self.codec.encode_module_availability(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(channel = %self.writer.id(), "could not encode module availability: {e}");
                return;
            }
        };
        if let Err(e) = self.writer.send(protocol::frame(header, body)).await {
            warn!(
                channel = %self.writer.id(),
                "could not send module availability update: {e}"
            );
        }
    }
}

#[async_trait::async_trait]
impl DeploymentListener for AvailabilityNotifier {
    async fn listener_registered(&self, current: &[ModuleId]) {
        if current.is_empty() {
            return;
        }
        debug!(
            channel = %self.writer.id(),
            modules = current.len(),
            "sending initial module availability"
        );
        self.send_availability(HEADER_MODULE_AVAILABLE, current.to_vec())
            .await;
    }

    async fn module_deployed(&self, module: &ModuleId) {
        self.send_availability(HEADER_MODULE_AVAILABLE, vec![module.clone()])
            .await;
    }

    async fn module_undeployed(&self, module: &ModuleId) {
        self.send_availability(HEADER_MODULE_UNAVAILABLE, vec![module.clone()])
            .await;
    }
}
