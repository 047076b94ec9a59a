//! Control node for a fleet of host agents: keeps the site topology, pushes
//! configuration edits and commands to every agent, and polls them back.

pub mod broadcast;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod health;
pub mod http;
pub mod node;
pub mod poller;
pub mod reconciler;
pub mod state;
pub mod topology;
pub mod transport;
pub mod tree;

pub use envelope::Command;
pub use errors::{ErrorLog, ErrorSink};
pub use node::ControlNode;
pub use topology::{HostAddr, InstanceKey, RunningState, Site, TopologyError};
pub use transport::{Transport, TransportError};
