/**
 * TOPOLOGY - In-memory model of the site: hosts, applications, instances
 *
 * ROLE : Identity-based lookup and optimistic edits. Reflects operator intent
 * immediately; polling (reconciler) corrects runtime drift afterwards.
 *
 * OWNERSHIP : The Site owns flat vectors of hosts, applications and instances.
 * An instance references its host and application by name, and every reference
 * must resolve (checked on insert, enforced on removal).
 *
 * LOCKING : none here. The control node guards the Site with one RwLock.
 */

use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default port of the per-host agent endpoint.
pub const DEFAULT_AGENT_PORT: u16 = 1085;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("unknown host: {0}")]
    UnknownHost(String),
    #[error("host already exists: {0}")]
    DuplicateHost(String),
    #[error("host {0} still has instances")]
    HostInUse(String),
    #[error("unknown application: {0}")]
    UnknownApplication(String),
    #[error("application already exists: {0}")]
    DuplicateApplication(String),
    #[error("application {0} still has instances")]
    ApplicationInUse(String),
    #[error("unknown instance: {0}")]
    UnknownInstance(String),
    #[error("instance already exists: {0}")]
    DuplicateInstance(String),
}

/// Fixed ordered table of running states reported by the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunningState {
    #[default]
    Unknown,
    Starting,
    Alive,
    Stopping,
    Dead,
    Crashing,
}

impl RunningState {
    pub const TABLE: [RunningState; 6] = [
        RunningState::Unknown,
        RunningState::Starting,
        RunningState::Alive,
        RunningState::Stopping,
        RunningState::Dead,
        RunningState::Crashing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RunningState::Unknown => "UNKNOWN",
            RunningState::Starting => "STARTING",
            RunningState::Alive => "ALIVE",
            RunningState::Stopping => "STOPPING",
            RunningState::Dead => "DEAD",
            RunningState::Crashing => "CRASHING",
        }
    }

    /// Position in [`RunningState::TABLE`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Exact, first-match lookup in the table. `None` when nothing matches.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::TABLE.iter().copied().find(|state| state.name() == name)
    }
}

/// Network identity of a host agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddr {
    pub name: String,
    pub port: u16,
}

impl std::fmt::Display for HostAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// Full identity of an instance. An instance id is only unique within its
/// application and host, so all four fields are needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceKey {
    pub application_name: String,
    pub id: u32,
    pub host_name: String,
    pub port: u16,
}

impl InstanceKey {
    /// Flattened wire form: `{applicationName, id, hostName, port}`.
    pub fn to_tree(&self) -> Tree {
        Tree::map([
            ("applicationName", Tree::str(self.application_name.clone())),
            ("id", Tree::int(i64::from(self.id))),
            ("hostName", Tree::str(self.host_name.clone())),
            ("port", Tree::int(i64::from(self.port))),
        ])
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}@{}:{}", self.application_name, self.id, self.host_name, self.port)
    }
}

fn default_agent_port() -> u16 {
    DEFAULT_AGENT_PORT
}

fn default_true() -> bool {
    true
}

fn default_refresh_rate() -> u32 {
    60
}

fn default_host_type() -> String {
    "UNIX".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    #[serde(default)]
    pub adaptor_url: Option<String>,
    #[serde(default = "default_true")]
    pub view_refresh_enabled: bool,
    #[serde(default = "default_refresh_rate")]
    pub view_refresh_rate: u32,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            adaptor_url: None,
            view_refresh_enabled: true,
            view_refresh_rate: default_refresh_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    pub name: String,
    #[serde(default = "default_agent_port")]
    pub port: u16,
    #[serde(default = "default_host_type")]
    pub host_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfig {
    pub name: String,
    #[serde(default)]
    pub starting_port: Option<u16>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub auto_recover: bool,
    #[serde(default)]
    pub additional_args: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    pub application_name: String,
    pub id: u32,
    pub host_name: String,
    pub port: u16,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub auto_recover: bool,
    #[serde(default)]
    pub additional_args: Option<String>,
    #[serde(default)]
    pub scheduling_enabled: bool,
}

impl InstanceConfig {
    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            application_name: self.application_name.clone(),
            id: self.id,
            host_name: self.host_name.clone(),
            port: self.port,
        }
    }
}

/// Persisted form of a site, also sent whole in an `overwrite` envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    #[serde(default)]
    pub settings: SiteSettings,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    #[serde(flatten)]
    pub config: HostConfig,
    pub is_available: bool,
    pub statistics: BTreeMap<String, Tree>,
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            is_available: false,
            statistics: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn addr(&self) -> HostAddr {
        HostAddr {
            name: self.config.name.clone(),
            port: self.config.port,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(flatten)]
    pub config: ApplicationConfig,
    pub running_instances_count: u32,
}

impl Application {
    pub fn new(config: ApplicationConfig) -> Self {
        Self {
            config,
            running_instances_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(flatten)]
    pub config: InstanceConfig,
    pub running_state: RunningState,
    pub refusing_new_sessions: bool,
    pub statistics: BTreeMap<String, Tree>,
    pub deaths: Vec<Tree>,
    pub next_scheduled_shutdown: Option<String>,
}

impl Instance {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            config,
            running_state: RunningState::Unknown,
            refusing_new_sessions: false,
            statistics: BTreeMap::new(),
            deaths: Vec::new(),
            next_scheduled_shutdown: None,
        }
    }

    pub fn key(&self) -> InstanceKey {
        self.config.key()
    }

    pub fn host_name(&self) -> &str {
        &self.config.host_name
    }

    pub fn application_name(&self) -> &str {
        &self.config.application_name
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Site {
    settings: SiteSettings,
    hosts: Vec<Host>,
    applications: Vec<Application>,
    instances: Vec<Instance>,
}

impl Site {
    pub fn new(settings: SiteSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Builds a site from its persisted form, validating every reference.
    pub fn from_config(config: SiteConfig) -> Result<Self, TopologyError> {
        let mut site = Site::new(config.settings);
        for host in config.hosts {
            site.add_host(host)?;
        }
        for application in config.applications {
            site.add_application(application)?;
        }
        for instance in config.instances {
            site.add_instance(instance)?;
        }
        Ok(site)
    }

    /// Configuration-only snapshot (no runtime fields).
    pub fn archive(&self) -> SiteConfig {
        SiteConfig {
            settings: self.settings.clone(),
            hosts: self.hosts.iter().map(|h| h.config.clone()).collect(),
            applications: self.applications.iter().map(|a| a.config.clone()).collect(),
            instances: self.instances.iter().map(|i| i.config.clone()).collect(),
        }
    }

    pub fn settings(&self) -> &SiteSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SiteSettings) {
        self.settings = settings;
    }

    // ---- hosts

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Agent addresses of every host, in site order.
    pub fn host_addrs(&self) -> Vec<HostAddr> {
        self.hosts.iter().map(Host::addr).collect()
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name() == name)
    }

    pub fn host_mut(&mut self, name: &str) -> Option<&mut Host> {
        self.hosts.iter_mut().find(|h| h.name() == name)
    }

    pub fn add_host(&mut self, config: HostConfig) -> Result<(), TopologyError> {
        if self.host(&config.name).is_some() {
            return Err(TopologyError::DuplicateHost(config.name));
        }
        self.hosts.push(Host::new(config));
        Ok(())
    }

    /// Replaces the configuration of an existing host, keeping its runtime state.
    pub fn configure_host(&mut self, config: HostConfig) -> Result<(), TopologyError> {
        let host = self
            .host_mut(&config.name)
            .ok_or_else(|| TopologyError::UnknownHost(config.name.clone()))?;
        host.config = config;
        Ok(())
    }

    /// Removes a host. Its instances must be removed or reassigned first.
    pub fn remove_host(&mut self, name: &str) -> Result<Host, TopologyError> {
        let position = self
            .hosts
            .iter()
            .position(|h| h.name() == name)
            .ok_or_else(|| TopologyError::UnknownHost(name.to_string()))?;
        if self.instances.iter().any(|i| i.host_name() == name) {
            return Err(TopologyError::HostInUse(name.to_string()));
        }
        Ok(self.hosts.remove(position))
    }

    // ---- applications

    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    pub fn application_by_name(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.name() == name)
    }

    pub fn application_by_name_mut(&mut self, name: &str) -> Option<&mut Application> {
        self.applications.iter_mut().find(|a| a.name() == name)
    }

    pub fn add_application(&mut self, config: ApplicationConfig) -> Result<(), TopologyError> {
        if self.application_by_name(&config.name).is_some() {
            return Err(TopologyError::DuplicateApplication(config.name));
        }
        self.applications.push(Application::new(config));
        Ok(())
    }

    pub fn configure_application(&mut self, config: ApplicationConfig) -> Result<(), TopologyError> {
        let application = self
            .application_by_name_mut(&config.name)
            .ok_or_else(|| TopologyError::UnknownApplication(config.name.clone()))?;
        application.config = config;
        Ok(())
    }

    pub fn remove_application(&mut self, name: &str) -> Result<Application, TopologyError> {
        let position = self
            .applications
            .iter()
            .position(|a| a.name() == name)
            .ok_or_else(|| TopologyError::UnknownApplication(name.to_string()))?;
        if self.instances.iter().any(|i| i.application_name() == name) {
            return Err(TopologyError::ApplicationInUse(name.to_string()));
        }
        Ok(self.applications.remove(position))
    }

    /// Zeroes every application's running count before an application poll.
    pub fn reset_running_counts(&mut self) {
        for application in &mut self.applications {
            application.running_instances_count = 0;
        }
    }

    // ---- instances

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance(&self, key: &InstanceKey) -> Option<&Instance> {
        self.instances.iter().find(|i| &i.key() == key)
    }

    pub fn instance_mut(&mut self, key: &InstanceKey) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| &i.key() == key)
    }

    pub fn instance_by_host_and_port(&self, host: &str, port: u16) -> Option<&Instance> {
        self.instances
            .iter()
            .find(|i| i.config.host_name == host && i.config.port == port)
    }

    pub fn instance_by_host_and_port_mut(&mut self, host: &str, port: u16) -> Option<&mut Instance> {
        self.instances
            .iter_mut()
            .find(|i| i.config.host_name == host && i.config.port == port)
    }

    pub fn instances_of_application(&self, name: &str) -> Vec<&Instance> {
        self.instances.iter().filter(|i| i.application_name() == name).collect()
    }

    pub fn instances_on_host(&self, name: &str) -> Vec<&Instance> {
        self.instances.iter().filter(|i| i.host_name() == name).collect()
    }

    pub fn add_instance(&mut self, config: InstanceConfig) -> Result<(), TopologyError> {
        if self.host(&config.host_name).is_none() {
            return Err(TopologyError::UnknownHost(config.host_name));
        }
        if self.application_by_name(&config.application_name).is_none() {
            return Err(TopologyError::UnknownApplication(config.application_name));
        }
        // (host, port) is the lookup key used by polling, it must stay unique too
        let key = config.key();
        if self.instance(&key).is_some()
            || self.instance_by_host_and_port(&config.host_name, config.port).is_some()
        {
            return Err(TopologyError::DuplicateInstance(key.to_string()));
        }
        self.instances.push(Instance::new(config));
        Ok(())
    }

    /// Replaces the configuration of the instance with the same identity.
    pub fn configure_instance(&mut self, config: InstanceConfig) -> Result<(), TopologyError> {
        let key = config.key();
        let instance = self
            .instance_mut(&key)
            .ok_or_else(|| TopologyError::UnknownInstance(key.to_string()))?;
        instance.config = config;
        Ok(())
    }

    pub fn remove_instance(&mut self, key: &InstanceKey) -> Result<Instance, TopologyError> {
        let position = self
            .instances
            .iter()
            .position(|i| &i.key() == key)
            .ok_or_else(|| TopologyError::UnknownInstance(key.to_string()))?;
        Ok(self.instances.remove(position))
    }
}
