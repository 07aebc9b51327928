/*!
Stub supervisor answering `start_stop` calls in-process.
*/

use async_trait::async_trait;
use fleetwatch_core::{ChannelError, CommandChannel, StartStopRequest};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// `CommandChannel` with a fixed answer per service. Services that were
/// never registered are unreachable.
#[derive(Clone, Default)]
pub struct StubResponder {
    services: Arc<Mutex<HashMap<String, bool>>>,
    calls: Arc<Mutex<Vec<(String, StartStopRequest)>>>,
}

impl StubResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service`; `ack` is what it answers.
    pub fn with_service(self, service: &str, ack: bool) -> Self {
        self.services.lock().insert(service.to_string(), ack);
        self
    }

    pub fn remove_service(&self, service: &str) {
        self.services.lock().remove(service);
    }

    /// Every call received, reachable or not.
    pub fn calls(&self) -> Vec<(String, StartStopRequest)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandChannel for StubResponder {
    async fn call(&self, service: &str, request: &StartStopRequest) -> Result<bool, ChannelError> {
        self.calls.lock().push((service.to_string(), request.clone()));
        self.services
            .lock()
            .get(service)
            .copied()
            .ok_or_else(|| ChannelError::Unreachable(service.to_string()))
    }
}
