use crate::channel::{ChannelError, CommandChannel};
use crate::messages::StartStopRequest;
use crate::models::NodeIdentity;
use crate::topic::start_stop_address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Operator command for a single node. Wire codes: Start=1, Stop=2, Restart=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum NodeAction {
    Start = 1,
    Stop = 2,
    Restart = 3,
}

impl NodeAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Restart => "Restart",
        }
    }
}

impl From<NodeAction> for u8 {
    fn from(action: NodeAction) -> Self {
        action as u8
    }
}

impl TryFrom<u8> for NodeAction {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Start),
            2 => Ok(Self::Stop),
            3 => Ok(Self::Restart),
            other => Err(format!("unknown action code {other}")),
        }
    }
}

impl std::str::FromStr for NodeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// Sends start/stop/restart requests to the supervisor.
///
/// One attempt per call: no retry, no queueing, no logging. Reporting a
/// failure to the operator is the caller's job.
#[derive(Clone)]
pub struct CommandDispatcher {
    channel: Arc<dyn CommandChannel>,
}

impl CommandDispatcher {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    /// `true` iff the supervisor received and acknowledged the request.
    pub async fn send(&self, base_address: &str, node: &NodeIdentity, action: NodeAction) -> bool {
        self.try_send(base_address, node, action).await.is_ok()
    }

    /// Same single attempt as [`send`](Self::send), keeping the failure reason.
    pub async fn try_send(
        &self,
        base_address: &str,
        node: &NodeIdentity,
        action: NodeAction,
    ) -> Result<(), ChannelError> {
        let service = start_stop_address(base_address);
        let request = StartStopRequest::new(node, action);
        if self.channel.call(&service, &request).await? {
            Ok(())
        } else {
            Err(ChannelError::Rejected(service))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Acknowledges calls to one service, everything else is unreachable.
    #[derive(Default)]
    struct SingleService {
        service: String,
        ack: bool,
        calls: Mutex<Vec<(String, StartStopRequest)>>,
    }

    #[async_trait]
    impl CommandChannel for SingleService {
        async fn call(&self, service: &str, request: &StartStopRequest) -> Result<bool, ChannelError> {
            self.calls.lock().push((service.to_string(), request.clone()));
            if service == self.service {
                Ok(self.ack)
            } else {
                Err(ChannelError::Unreachable(service.to_string()))
            }
        }
    }

    fn dispatcher(ack: bool) -> (Arc<SingleService>, CommandDispatcher) {
        let channel = Arc::new(SingleService {
            service: "robot/rosmon/start_stop".into(),
            ack,
            ..Default::default()
        });
        (channel.clone(), CommandDispatcher::new(channel))
    }

    #[tokio::test]
    async fn test_send_acknowledged() {
        let (channel, dispatcher) = dispatcher(true);
        let node = NodeIdentity::new("/robot", "lidar");

        assert!(dispatcher.send("robot/rosmon", &node, NodeAction::Restart).await);

        let calls = channel.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "robot/rosmon/start_stop");
        assert_eq!(
            calls[0].1,
            StartStopRequest {
                action: NodeAction::Restart,
                node: "lidar".into(),
                ns: "/robot".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_send_unreachable_is_false_after_one_attempt() {
        let (channel, dispatcher) = dispatcher(true);
        let node = NodeIdentity::new("/robot", "lidar");

        assert!(!dispatcher.send("elsewhere", &node, NodeAction::Start).await);
        assert_eq!(channel.calls.lock().len(), 1);

        let err = dispatcher.try_send("elsewhere", &node, NodeAction::Start).await;
        assert_eq!(err, Err(ChannelError::Unreachable("elsewhere/start_stop".into())));
    }

    #[tokio::test]
    async fn test_negative_acknowledgement() {
        let (_, dispatcher) = dispatcher(false);
        let node = NodeIdentity::new("/robot", "lidar");

        assert!(!dispatcher.send("robot/rosmon", &node, NodeAction::Stop).await);
        assert_eq!(
            dispatcher.try_send("robot/rosmon", &node, NodeAction::Stop).await,
            Err(ChannelError::Rejected("robot/rosmon/start_stop".into()))
        );
    }

    #[test]
    fn test_action_codes() {
        assert_eq!(u8::from(NodeAction::Start), 1);
        assert_eq!(u8::from(NodeAction::Stop), 2);
        assert_eq!(u8::from(NodeAction::Restart), 3);
        assert_eq!(NodeAction::try_from(2), Ok(NodeAction::Stop));
        assert!(NodeAction::try_from(0).is_err());
        assert_eq!("RESTART".parse::<NodeAction>(), Ok(NodeAction::Restart));
        assert!("reboot".parse::<NodeAction>().is_err());
    }
}
