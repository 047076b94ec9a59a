/**
 * CONTROL NODE - Operator-facing entry point of the kernel
 *
 * ROLE : Owns one site behind one RwLock plus the broadcaster, and exposes
 * every edit / command / poll an operator can trigger.
 *
 * EDITS : local change first (optimistic, never rolled back after a remote
 * failure), then the matching envelope goes to every host of the site. The
 * write guard is held across both so two edits never interleave envelopes.
 *
 * ERRORS : remote failures land in the caller's ErrorSink. A TopologyError
 * means the local edit was refused and nothing was sent.
 */

use crate::broadcast::Broadcaster;
use crate::dispatcher::CommandDispatcher;
use crate::envelope::{Command, Envelope, UpdateKind, UpdateTargets};
use crate::errors::{aggregate, ErrorSink};
use crate::reconciler::Reconciler;
use crate::state::{new_site, SharedSite};
use crate::topology::{
    ApplicationConfig, HostAddr, HostConfig, InstanceConfig, InstanceKey, Site, SiteSettings, TopologyError,
};
use crate::transport::Transport;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct ControlNode {
    site: SharedSite,
    broadcaster: Broadcaster,
    dispatcher: CommandDispatcher,
    reconciler: Reconciler,
}

impl ControlNode {
    pub fn new(site: Site, transport: Arc<dyn Transport>) -> Self {
        Self::with_broadcaster(site, Broadcaster::new(transport))
    }

    pub fn with_broadcaster(site: Site, broadcaster: Broadcaster) -> Self {
        let site = new_site(site);
        Self {
            dispatcher: CommandDispatcher::new(broadcaster.clone(), site.clone()),
            reconciler: Reconciler::new(broadcaster.clone(), site.clone()),
            broadcaster,
            site,
        }
    }

    pub fn site(&self) -> SharedSite {
        self.site.clone()
    }

    /// Copy of the current site, for rendering.
    pub async fn snapshot(&self) -> Site {
        self.site.read().await.clone()
    }

    async fn send(&self, envelope: Envelope, hosts: &[HostAddr], sink: &mut dyn ErrorSink) {
        let responses = self.broadcaster.broadcast(&envelope, hosts).await;
        aggregate(&envelope, &responses, sink);
    }

    // ---- instances

    /// Adds all instances or none of them.
    pub async fn add_instances(
        &self,
        configs: Vec<InstanceConfig>,
        sink: &mut dyn ErrorSink,
    ) -> Result<(), TopologyError> {
        if configs.is_empty() {
            return Ok(());
        }
        let mut site = self.site.write().await;
        let mut added: Vec<InstanceKey> = Vec::with_capacity(configs.len());
        for config in configs {
            let key = config.key();
            if let Err(e) = site.add_instance(config) {
                for key in &added {
                    if let Err(rollback) = site.remove_instance(key) {
                        tracing::error!(instance = %key, error = %rollback, "rollback of added instance failed");
                    }
                }
                return Err(e);
            }
            added.push(key);
        }

        let targets = UpdateTargets::instances(added.iter().filter_map(|k| site.instance(k)));
        let hosts = site.host_addrs();
        self.send(Envelope::update(UpdateKind::Add, targets), &hosts, sink).await;
        Ok(())
    }

    /// Repeated keys are removed once.
    pub async fn remove_instances(
        &self,
        keys: &[InstanceKey],
        sink: &mut dyn ErrorSink,
    ) -> Result<(), TopologyError> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys = distinct_keys(keys.iter().cloned());
        let mut site = self.site.write().await;
        if let Some(missing) = keys.iter().find(|k| site.instance(k).is_none()) {
            return Err(TopologyError::UnknownInstance(missing.to_string()));
        }
        let removed = keys
            .iter()
            .map(|k| site.remove_instance(k))
            .collect::<Result<Vec<_>, _>>()?;

        let hosts = site.host_addrs();
        let targets = UpdateTargets::instances(&removed);
        self.send(Envelope::update(UpdateKind::Remove, targets), &hosts, sink).await;
        Ok(())
    }

    pub async fn configure_instances(
        &self,
        configs: Vec<InstanceConfig>,
        sink: &mut dyn ErrorSink,
    ) -> Result<(), TopologyError> {
        if configs.is_empty() {
            return Ok(());
        }
        let mut site = self.site.write().await;
        if let Some(missing) = configs.iter().map(InstanceConfig::key).find(|k| site.instance(k).is_none()) {
            return Err(TopologyError::UnknownInstance(missing.to_string()));
        }
        let keys = distinct_keys(configs.iter().map(InstanceConfig::key));
        for config in configs {
            site.configure_instance(config)?;
        }

        let targets = UpdateTargets::instances(keys.iter().filter_map(|k| site.instance(k)));
        let hosts = site.host_addrs();
        self.send(Envelope::update(UpdateKind::Configure, targets), &hosts, sink).await;
        Ok(())
    }

    // ---- applications

    pub async fn add_application(
        &self,
        config: ApplicationConfig,
        sink: &mut dyn ErrorSink,
    ) -> Result<(), TopologyError> {
        let mut site = self.site.write().await;
        let name = config.name.clone();
        site.add_application(config)?;

        let targets = application_targets(&site, &name, false)?;
        let hosts = site.host_addrs();
        self.send(Envelope::update(UpdateKind::Add, targets), &hosts, sink).await;
        Ok(())
    }

    /// Removes the application together with all of its instances.
    pub async fn remove_application(&self, name: &str, sink: &mut dyn ErrorSink) -> Result<(), TopologyError> {
        let mut site = self.site.write().await;
        if site.application_by_name(name).is_none() {
            return Err(TopologyError::UnknownApplication(name.to_string()));
        }
        let keys: Vec<InstanceKey> = site.instances_of_application(name).iter().map(|i| i.key()).collect();
        let instances = keys
            .iter()
            .map(|k| site.remove_instance(k))
            .collect::<Result<Vec<_>, _>>()?;
        let application = site.remove_application(name)?;

        let targets = UpdateTargets::application(&application).with_instances(&instances);
        let hosts = site.host_addrs();
        self.send(Envelope::update(UpdateKind::Remove, targets), &hosts, sink).await;
        Ok(())
    }

    pub async fn configure_application(
        &self,
        config: ApplicationConfig,
        sink: &mut dyn ErrorSink,
    ) -> Result<(), TopologyError> {
        self.configure_application_inner(config, false, sink).await
    }

    /// Reconfigures the application and resends every one of its instances in
    /// the same envelope.
    pub async fn configure_application_and_instances(
        &self,
        config: ApplicationConfig,
        sink: &mut dyn ErrorSink,
    ) -> Result<(), TopologyError> {
        self.configure_application_inner(config, true, sink).await
    }

    async fn configure_application_inner(
        &self,
        config: ApplicationConfig,
        with_instances: bool,
        sink: &mut dyn ErrorSink,
    ) -> Result<(), TopologyError> {
        let mut site = self.site.write().await;
        let name = config.name.clone();
        site.configure_application(config)?;

        let targets = application_targets(&site, &name, with_instances)?;
        let hosts = site.host_addrs();
        self.send(Envelope::update(UpdateKind::Configure, targets), &hosts, sink).await;
        Ok(())
    }

    // ---- hosts

    /// The new host receives the envelope too.
    pub async fn add_host(&self, config: HostConfig, sink: &mut dyn ErrorSink) -> Result<(), TopologyError> {
        let mut site = self.site.write().await;
        let name = config.name.clone();
        site.add_host(config)?;

        let targets = host_targets(&site, &name)?;
        let hosts = site.host_addrs();
        self.send(Envelope::update(UpdateKind::Add, targets), &hosts, sink).await;
        Ok(())
    }

    /// The removed host receives the envelope too. Fails while it still owns instances.
    pub async fn remove_host(&self, name: &str, sink: &mut dyn ErrorSink) -> Result<(), TopologyError> {
        let mut site = self.site.write().await;
        let removed = site.remove_host(name)?;

        let mut hosts = site.host_addrs();
        hosts.push(removed.addr());
        self.send(
            Envelope::update(UpdateKind::Remove, UpdateTargets::host(&removed)),
            &hosts,
            sink,
        )
        .await;
        Ok(())
    }

    pub async fn configure_host(&self, config: HostConfig, sink: &mut dyn ErrorSink) -> Result<(), TopologyError> {
        let mut site = self.site.write().await;
        let name = config.name.clone();
        site.configure_host(config)?;

        let targets = host_targets(&site, &name)?;
        let hosts = site.host_addrs();
        self.send(Envelope::update(UpdateKind::Configure, targets), &hosts, sink).await;
        Ok(())
    }

    /// Replaces the whole configuration held by one agent with the local site.
    pub async fn overwrite_host(&self, name: &str, sink: &mut dyn ErrorSink) -> Result<(), TopologyError> {
        let site = self.site.write().await;
        let host = site.host(name).ok_or_else(|| TopologyError::UnknownHost(name.to_string()))?;
        let hosts = [host.addr()];
        self.send(Envelope::overwrite(&site), &hosts, sink).await;
        Ok(())
    }

    /// Wipes the configuration held by one agent.
    pub async fn clear_host(&self, name: &str, sink: &mut dyn ErrorSink) -> Result<(), TopologyError> {
        let site = self.site.write().await;
        let host = site.host(name).ok_or_else(|| TopologyError::UnknownHost(name.to_string()))?;
        let hosts = [host.addr()];
        self.send(Envelope::clear(), &hosts, sink).await;
        Ok(())
    }

    // ---- site

    pub async fn configure_site(&self, settings: SiteSettings, sink: &mut dyn ErrorSink) {
        let mut site = self.site.write().await;
        site.set_settings(settings);

        let hosts = site.host_addrs();
        self.send(Envelope::update(UpdateKind::Configure, UpdateTargets::site(&site)), &hosts, sink)
            .await;
    }

    // ---- commands

    pub async fn start(&self, instances: &[InstanceKey], sink: &mut dyn ErrorSink) {
        self.command(Command::Start, instances, sink).await
    }

    pub async fn stop(&self, instances: &[InstanceKey], sink: &mut dyn ErrorSink) {
        self.command(Command::Stop, instances, sink).await
    }

    pub async fn quit(&self, instances: &[InstanceKey], sink: &mut dyn ErrorSink) {
        self.command(Command::Quit, instances, sink).await
    }

    pub async fn clear_deaths(&self, instances: &[InstanceKey], sink: &mut dyn ErrorSink) {
        self.command(Command::Clear, instances, sink).await
    }

    pub async fn refuse_new_sessions(&self, instances: &[InstanceKey], sink: &mut dyn ErrorSink) {
        self.command(Command::Refuse, instances, sink).await
    }

    pub async fn accept_new_sessions(&self, instances: &[InstanceKey], sink: &mut dyn ErrorSink) {
        self.command(Command::Accept, instances, sink).await
    }

    /// Targets are the distinct hosts owning `instances`, in first-seen order.
    pub async fn command(&self, command: Command, instances: &[InstanceKey], sink: &mut dyn ErrorSink) {
        let hosts = {
            let site = self.site.read().await;
            command_hosts(&site, instances)
        };
        self.dispatcher.dispatch(command, instances, &hosts, sink).await;
    }

    // ---- polls

    pub async fn refresh_instances(&self, sink: &mut dyn ErrorSink) -> usize {
        self.reconciler.poll_instances(sink).await
    }

    pub async fn refresh_hosts(&self, sink: &mut dyn ErrorSink) -> usize {
        self.reconciler.poll_hosts(sink).await
    }

    pub async fn refresh_applications(&self, sink: &mut dyn ErrorSink) {
        self.reconciler.poll_applications(sink).await
    }

    /// Hosts, then instances, then applications.
    pub async fn refresh_all(&self, sink: &mut dyn ErrorSink) {
        let available = self.refresh_hosts(sink).await;
        let instances = self.refresh_instances(sink).await;
        self.refresh_applications(sink).await;
        tracing::info!(available, instances, "site refreshed");
    }
}

fn application_targets(site: &Site, name: &str, with_instances: bool) -> Result<UpdateTargets, TopologyError> {
    let application = site
        .application_by_name(name)
        .ok_or_else(|| TopologyError::UnknownApplication(name.to_string()))?;
    let targets = UpdateTargets::application(application);
    Ok(if with_instances {
        targets.with_instances(site.instances_of_application(name))
    } else {
        targets
    })
}

fn host_targets(site: &Site, name: &str) -> Result<UpdateTargets, TopologyError> {
    site.host(name)
        .map(UpdateTargets::host)
        .ok_or_else(|| TopologyError::UnknownHost(name.to_string()))
}

/// Drops repeated keys, keeping the first occurrence.
fn distinct_keys<I: IntoIterator<Item = InstanceKey>>(keys: I) -> Vec<InstanceKey> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

/// Distinct owning hosts, first-seen order. Instances on unknown hosts are skipped.
pub fn command_hosts(site: &Site, instances: &[InstanceKey]) -> Vec<HostAddr> {
    let mut hosts: Vec<HostAddr> = Vec::new();
    for key in instances {
        if hosts.iter().any(|h| h.name == key.host_name) {
            continue;
        }
        if let Some(host) = site.host(&key.host_name) {
            hosts.push(host.addr());
        }
    }
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(host: &str, id: u32) -> InstanceKey {
        InstanceKey { application_name: "AppX".into(), id, host_name: host.into(), port: 2000 + id as u16 }
    }

    #[test]
    fn test_command_hosts_distinct_first_seen() {
        let mut site = Site::new(SiteSettings::default());
        for name in ["h1", "h2", "h3"] {
            site.add_host(HostConfig { name: name.into(), port: 1085, host_type: "UNIX".into() })
                .unwrap();
        }
        let keys = vec![key("h3", 1), key("h1", 2), key("h3", 3), key("nowhere", 4)];
        let names: Vec<String> = command_hosts(&site, &keys).into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["h3", "h1"]);
    }

    #[test]
    fn test_distinct_keys_keeps_first_occurrence() {
        let keys = distinct_keys(vec![key("h2", 1), key("h1", 2), key("h2", 1)]);
        assert_eq!(keys, vec![key("h2", 1), key("h1", 2)]);
    }
}
