use crate::broadcast::Broadcaster;
use crate::envelope::{Command, Envelope};
use crate::errors::{aggregate, ErrorSink};
use crate::state::SharedSite;
use crate::topology::{HostAddr, InstanceKey};

/// Sends one command envelope, covering every target instance, to every
/// target host. Agents act on the instances they own and ignore the rest.
#[derive(Clone)]
pub struct CommandDispatcher {
    broadcaster: Broadcaster,
    site: SharedSite,
}

impl CommandDispatcher {
    pub fn new(broadcaster: Broadcaster, site: SharedSite) -> Self {
        Self { broadcaster, site }
    }

    /// No-op when either list is empty.
    ///
    /// REFUSE and ACCEPT flip `refusing_new_sessions` locally before sending.
    /// The flag is not rolled back on failure; the next instance poll corrects it.
    pub async fn dispatch(
        &self,
        command: Command,
        instances: &[InstanceKey],
        hosts: &[HostAddr],
        sink: &mut dyn ErrorSink,
    ) {
        if instances.is_empty() || hosts.is_empty() {
            return;
        }

        let refusing = match command {
            Command::Refuse => Some(true),
            Command::Accept => Some(false),
            _ => None,
        };
        if let Some(refusing) = refusing {
            let mut site = self.site.write().await;
            for key in instances {
                if let Some(instance) = site.instance_mut(key) {
                    instance.refusing_new_sessions = refusing;
                }
            }
        }

        let envelope = Envelope::command(command, instances.iter().cloned());
        let responses = self.broadcaster.broadcast(&envelope, hosts).await;
        let errors = aggregate(&envelope, &responses, sink);
        tracing::info!(
            command = command.name(),
            instances = instances.len(),
            hosts = hosts.len(),
            errors,
            "command dispatched"
        );
    }
}
