/**
 * COMMAND CHANNEL - Request/response call towards the supervisor
 *
 * ROLE:
 * `CommandChannel` is the seam the dispatcher talks to. The transport behind
 * it is injected by the host (MQTT in the monitor, a stub in tests).
 *
 * OPERATION (`RequestReplyChannel`):
 * - Each call gets a request_id and a oneshot sender stored in `pending`
 * - The envelope is published on the service topic with our `reply_to`
 * - The transport listener hands replies to `handle_response`, which
 *   completes the matching call
 * - The call gives up after the channel timeout and forgets the request
 */

use crate::messages::{CommandEnvelope, CommandReply, StartStopRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("service {0} is unreachable")]
    Unreachable(String),
    #[error("no response from {service} within {timeout:?}")]
    Timeout { service: String, timeout: Duration },
    #[error("service {0} rejected the request")]
    Rejected(String),
    #[error("request to {0} was dropped before a response arrived")]
    Dropped(String),
    #[error("failed to encode request: {0}")]
    Encode(String),
}

/// Synchronous request/response call addressed by service name.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Returns the responder's acknowledgement, or a transport error.
    async fn call(&self, service: &str, request: &StartStopRequest) -> Result<bool, ChannelError>;
}

/// Fire-and-forget publication on a topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ChannelError>;
}

/// `CommandChannel` built on a publish/subscribe transport.
pub struct RequestReplyChannel<P> {
    publisher: P,
    reply_to: String,
    call_timeout: Duration,
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<bool>>>>,
}

impl<P: Publisher> RequestReplyChannel<P> {
    pub fn new(publisher: P, reply_to: impl Into<String>) -> Self {
        Self {
            publisher,
            reply_to: reply_to.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Topic the transport must subscribe to and route to `handle_response`.
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Completes the call waiting for `reply`. Unknown ids are ignored.
    pub fn handle_response(&self, reply: CommandReply) {
        let sender = self.pending.lock().remove(&reply.request_id);
        match sender {
            Some(sender) => {
                if sender.send(reply.success).is_err() {
                    debug!("caller for request {} is gone", reply.request_id);
                }
            }
            None => warn!("received response for unknown request {}", reply.request_id),
        }
    }

    /// Decodes and routes a raw reply payload.
    pub fn handle_payload(&self, payload: &[u8]) {
        match serde_json::from_slice::<CommandReply>(payload) {
            Ok(reply) => self.handle_response(reply),
            Err(e) => warn!("invalid command reply: {e}"),
        }
    }
}

#[async_trait]
impl<P: Publisher> CommandChannel for RequestReplyChannel<P> {
    async fn call(&self, service: &str, request: &StartStopRequest) -> Result<bool, ChannelError> {
        let request_id = Uuid::new_v4().to_string();
        let envelope = CommandEnvelope {
            request_id: request_id.clone(),
            reply_to: self.reply_to.clone(),
            request: request.clone(),
        };
        let payload =
            serde_json::to_vec(&envelope).map_err(|e| ChannelError::Encode(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        if let Err(e) = self.publisher.publish(service, payload).await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(success)) => Ok(success),
            Ok(Err(_)) => {
                self.pending.lock().remove(&request_id);
                Err(ChannelError::Dropped(service.to_string()))
            }
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(ChannelError::Timeout {
                    service: service.to_string(),
                    timeout: self.call_timeout,
                })
            }
        }
    }
}
