/*!
# fleetwatch devkit - Test doubles for the fleet monitor

Lets the core and the monitor be exercised without a broker or a supervisor:
- `MockMqttClient`: records publications, implements `Publisher`
- `StubResponder`: answers `start_stop` calls for registered services
- `FleetMessageBuilder`: state feed and reply payloads
- `TestHarness`: tracker + monitor + responder wired together
*/

pub mod mqtt_stub;
pub mod responder;
pub mod test_utils;

pub use mqtt_stub::{FleetMessageBuilder, MockMessage, MockMqttClient};
pub use responder::StubResponder;
pub use test_utils::TestHarness;
