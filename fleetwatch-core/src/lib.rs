/*!
# fleetwatch-core

Live status and control of a fleet of supervised processes:
- `StatusTracker`: latest snapshot of the `.../state` feed, sorted, with freshness
- `CommandDispatcher`: start/stop/restart requests to `.../start_stop`
- `FleetMonitor`: feed selection + table view, the logic behind a panel

The transport is injected through the `CommandChannel` / `Publisher` traits.
*/

pub mod channel;
pub mod dispatcher;
pub mod format;
pub mod messages;
pub mod models;
pub mod monitor;
pub mod topic;
pub mod tracker;

pub use channel::{ChannelError, CommandChannel, Publisher, RequestReplyChannel};
pub use dispatcher::{CommandDispatcher, NodeAction};
pub use format::formatted_data_size;
pub use messages::{CommandReply, MessageError, StartStopRequest, StateMessage};
pub use models::{FleetSnapshot, NodeIdentity, NodeLifecycle, NodeRecord, Rgba};
pub use monitor::{CommandError, FeedChange, FleetMonitor, FleetTable, NodeRow, PanelSettings};
pub use topic::{FeedTopic, TopicError};
pub use tracker::{FleetView, SharedStatusTracker, StatusTracker};
