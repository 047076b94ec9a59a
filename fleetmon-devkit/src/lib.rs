/*!
# Fleetmon DevKit - Stubs and helpers for kernel tests

Drive a real `ControlNode` without any agent running:
- `StubAgent`: in-memory transport answering per host, recording every request
- `responses`: builders for the agent response shapes
- `TestHarness`: a ready-made three-host site wired to a stub agent
*/

pub mod agent_stub;
pub mod responses;
pub mod test_utils;

pub use agent_stub::{RecordedRequest, Reply, StubAgent};
pub use test_utils::TestHarness;
