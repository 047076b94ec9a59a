/**
 * ENVELOPE BUILDER - Typed request shapes sent to the host agents
 *
 * ROLE : Turns an operation (update / overwrite / clear / command / query)
 * plus a slice of the topology into the request tree an agent expects.
 *
 * SHAPES :
 *   update    {updateWotaskd: {<kind>: {site?, hostArray?, applicationArray?, instanceArray?}}}
 *   overwrite {updateWotaskd: {overwrite: {SiteConfig: <archive>}}}
 *   clear     {updateWotaskd: {clear: "SITE"}}
 *   command   {commandWotaskd: [<COMMAND>, {applicationName, id, hostName, port}, ...]}
 *   query     {queryWotaskd: "INSTANCE" | "HOST" | "APPLICATION"}
 *
 * Entity kinds that were not supplied are omitted, never sent empty.
 * Building an envelope without targets is a programmer error and panics.
 */

use crate::codec::REQUEST_ROOT;
use crate::topology::{Application, Host, Instance, InstanceKey, Site};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};

pub const UPDATE_REQUEST: &str = "updateWotaskd";
pub const COMMAND_REQUEST: &str = "commandWotaskd";
pub const QUERY_REQUEST: &str = "queryWotaskd";
pub const UPDATE_RESPONSE: &str = "updateWotaskdResponse";
pub const COMMAND_RESPONSE: &str = "commandWotaskdResponse";
pub const QUERY_RESPONSE: &str = "queryWotaskdResponse";

/// Operation kind of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Remove,
    Configure,
    Overwrite,
    Clear,
    Command,
    Query,
}

impl Operation {
    pub fn key(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Remove => "remove",
            Operation::Configure => "configure",
            Operation::Overwrite => "overwrite",
            Operation::Clear => "clear",
            Operation::Command => "command",
            Operation::Query => "query",
        }
    }
}

/// Update operations whose payload is keyed by entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Add,
    Remove,
    Configure,
}

impl UpdateKind {
    pub fn operation(self) -> Operation {
        match self {
            UpdateKind::Add => Operation::Add,
            UpdateKind::Remove => Operation::Remove,
            UpdateKind::Configure => Operation::Configure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Site,
    Host,
    Application,
    Instance,
}

impl EntityKind {
    pub fn key(self) -> &'static str {
        match self {
            EntityKind::Site => "site",
            EntityKind::Host => "hostArray",
            EntityKind::Application => "applicationArray",
            EntityKind::Instance => "instanceArray",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Start,
    Stop,
    Quit,
    Clear,
    Refuse,
    Accept,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::Quit => "QUIT",
            Command::Clear => "CLEAR",
            Command::Refuse => "REFUSE",
            Command::Accept => "ACCEPT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Instance,
    Host,
    Application,
}

impl QueryKind {
    pub fn name(self) -> &'static str {
        match self {
            QueryKind::Instance => "INSTANCE",
            QueryKind::Host => "HOST",
            QueryKind::Application => "APPLICATION",
        }
    }

    /// Key of the result node inside `queryWotaskdResponse`.
    pub fn response_key(self) -> &'static str {
        match self {
            QueryKind::Instance => "instanceResponse",
            QueryKind::Host => "hostResponse",
            QueryKind::Application => "applicationResponse",
        }
    }
}

fn values<T: Serialize>(value: &T) -> Tree {
    // configuration structs only hold strings, numbers and booleans
    Tree::from_serializable(value).unwrap_or_else(|_| Tree::empty_map())
}

/// Entities carried by an add / remove / configure envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateTargets {
    site: Option<Tree>,
    hosts: Option<Vec<Tree>>,
    applications: Option<Vec<Tree>>,
    instances: Option<Vec<Tree>>,
}

impl UpdateTargets {
    pub fn site(site: &Site) -> Self {
        Self::default().with_site(site)
    }

    pub fn host(host: &Host) -> Self {
        Self::default().with_host(host)
    }

    pub fn application(application: &Application) -> Self {
        Self::default().with_application(application)
    }

    pub fn instances<'a, I: IntoIterator<Item = &'a Instance>>(instances: I) -> Self {
        Self::default().with_instances(instances)
    }

    pub fn with_site(mut self, site: &Site) -> Self {
        self.site = Some(values(site.settings()));
        self
    }

    pub fn with_host(mut self, host: &Host) -> Self {
        self.hosts = Some(vec![values(&host.config)]);
        self
    }

    pub fn with_application(mut self, application: &Application) -> Self {
        self.applications = Some(vec![values(&application.config)]);
        self
    }

    /// Adds the instance array. An empty iterator leaves the kind absent.
    pub fn with_instances<'a, I: IntoIterator<Item = &'a Instance>>(mut self, instances: I) -> Self {
        let array: Vec<Tree> = instances.into_iter().map(|i| values(&i.config)).collect();
        self.instances = if array.is_empty() { None } else { Some(array) };
        self
    }

    /// Entity kinds present, in wire order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        if self.site.is_some() {
            kinds.push(EntityKind::Site);
        }
        if self.hosts.is_some() {
            kinds.push(EntityKind::Host);
        }
        if self.applications.is_some() {
            kinds.push(EntityKind::Application);
        }
        if self.instances.is_some() {
            kinds.push(EntityKind::Instance);
        }
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }

    fn to_tree(&self) -> Tree {
        let mut entries = Vec::new();
        if let Some(site) = &self.site {
            entries.push((EntityKind::Site.key(), site.clone()));
        }
        if let Some(hosts) = &self.hosts {
            entries.push((EntityKind::Host.key(), Tree::Array(hosts.clone())));
        }
        if let Some(applications) = &self.applications {
            entries.push((EntityKind::Application.key(), Tree::Array(applications.clone())));
        }
        if let Some(instances) = &self.instances {
            entries.push((EntityKind::Instance.key(), Tree::Array(instances.clone())));
        }
        Tree::map(entries)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Update { kind: UpdateKind, targets: UpdateTargets },
    Overwrite { archive: Tree },
    Clear,
    Command { command: Command, instances: Vec<InstanceKey> },
    Query(QueryKind),
}

impl Envelope {
    /// # Panics
    /// When `targets` carries no entity at all.
    pub fn update(kind: UpdateKind, targets: UpdateTargets) -> Self {
        assert!(
            !targets.is_empty(),
            "{} envelope built without any target entity",
            kind.operation().key()
        );
        Envelope::Update { kind, targets }
    }

    /// Full site archive, used to resynchronise one agent.
    pub fn overwrite(site: &Site) -> Self {
        Envelope::Overwrite {
            archive: values(&site.archive()),
        }
    }

    pub fn clear() -> Self {
        Envelope::Clear
    }

    /// Only the identity 4-tuple of each instance goes on the wire.
    ///
    /// # Panics
    /// When `instances` is empty.
    pub fn command<I: IntoIterator<Item = InstanceKey>>(command: Command, instances: I) -> Self {
        let instances: Vec<InstanceKey> = instances.into_iter().collect();
        assert!(
            !instances.is_empty(),
            "{} command envelope built without any instance",
            command.name()
        );
        Envelope::Command { command, instances }
    }

    pub fn query(kind: QueryKind) -> Self {
        Envelope::Query(kind)
    }

    pub fn operation(&self) -> Operation {
        match self {
            Envelope::Update { kind, .. } => kind.operation(),
            Envelope::Overwrite { .. } => Operation::Overwrite,
            Envelope::Clear => Operation::Clear,
            Envelope::Command { .. } => Operation::Command,
            Envelope::Query(_) => Operation::Query,
        }
    }

    /// Top-level request key for this envelope.
    pub fn request_key(&self) -> &'static str {
        match self {
            Envelope::Update { .. } | Envelope::Overwrite { .. } | Envelope::Clear => UPDATE_REQUEST,
            Envelope::Command { .. } => COMMAND_REQUEST,
            Envelope::Query(_) => QUERY_REQUEST,
        }
    }

    /// Key under which an agent answers this envelope.
    pub fn response_key(&self) -> &'static str {
        match self.request_key() {
            COMMAND_REQUEST => COMMAND_RESPONSE,
            QUERY_REQUEST => QUERY_RESPONSE,
            _ => UPDATE_RESPONSE,
        }
    }

    /// The value stored under [`Envelope::request_key`].
    pub fn body(&self) -> Tree {
        match self {
            Envelope::Update { kind, targets } => {
                Tree::map([(kind.operation().key(), targets.to_tree())])
            }
            Envelope::Overwrite { archive } => Tree::map([(
                Operation::Overwrite.key(),
                Tree::map([("SiteConfig", archive.clone())]),
            )]),
            Envelope::Clear => Tree::map([(Operation::Clear.key(), Tree::str("SITE"))]),
            Envelope::Command { command, instances } => {
                let mut items = Vec::with_capacity(instances.len() + 1);
                items.push(Tree::str(command.name()));
                items.extend(instances.iter().map(InstanceKey::to_tree));
                Tree::Array(items)
            }
            Envelope::Query(kind) => Tree::str(kind.name()),
        }
    }

    /// Complete request tree, rooted at `monitorRequest`.
    pub fn to_tree(&self) -> Tree {
        Tree::map([(REQUEST_ROOT, Tree::map([(self.request_key(), self.body())]))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{ApplicationConfig, HostConfig, InstanceConfig, SiteSettings};

    fn site() -> Site {
        let mut site = Site::new(SiteSettings::default());
        site.add_host(HostConfig { name: "alpha".into(), port: 1085, host_type: "UNIX".into() })
            .unwrap();
        site.add_application(ApplicationConfig {
            name: "AppX".into(),
            starting_port: Some(2001),
            path: Some("/opt/AppX".into()),
            auto_recover: true,
            additional_args: None,
        })
        .unwrap();
        for (id, port) in [(1, 2001), (2, 2002)] {
            site.add_instance(InstanceConfig {
                application_name: "AppX".into(),
                id,
                host_name: "alpha".into(),
                port,
                path: None,
                auto_recover: true,
                additional_args: None,
                scheduling_enabled: false,
            })
            .unwrap();
        }
        site
    }

    #[test]
    fn test_stop_command_envelope() {
        let site = site();
        let i1 = site.instances()[0].key();
        let envelope = Envelope::command(Command::Stop, vec![i1.clone()]);

        let body = envelope.body();
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_str(), Some("STOP"));
        assert_eq!(items[1], i1.to_tree());
        // identity only, no runtime or configuration fields
        let keys: Vec<&String> = items[1].as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["applicationName", "hostName", "id", "port"]);
    }

    #[test]
    fn test_update_envelope_omits_absent_kinds() {
        let site = site();
        let envelope = Envelope::update(UpdateKind::Add, UpdateTargets::instances(site.instances()));

        let tree = envelope.to_tree();
        let add = tree
            .get(REQUEST_ROOT)
            .and_then(|t| t.get(UPDATE_REQUEST))
            .and_then(|t| t.get("add"))
            .unwrap();
        assert_eq!(add.as_map().unwrap().len(), 1);
        assert_eq!(add.get("instanceArray").and_then(Tree::as_array).map(|a| a.len()), Some(2));
        assert!(add.get("hostArray").is_none());
        assert!(add.get("site").is_none());
    }

    #[test]
    fn test_application_and_instances_together() {
        let site = site();
        let app = site.application_by_name("AppX").unwrap();
        let targets = UpdateTargets::application(app).with_instances(site.instances_of_application("AppX"));
        assert_eq!(targets.kinds(), vec![EntityKind::Application, EntityKind::Instance]);

        let body = Envelope::update(UpdateKind::Configure, targets).body();
        let configure = body.get("configure").unwrap();
        let sent_app = &configure.get("applicationArray").and_then(Tree::as_array).unwrap()[0];
        assert_eq!(sent_app.get("name").and_then(Tree::as_str), Some("AppX"));
        assert_eq!(sent_app.get("startingPort").and_then(Tree::as_i64), Some(2001));
        // runtime counters never go on the wire
        assert!(sent_app.get("runningInstancesCount").is_none());
    }

    #[test]
    fn test_instance_values_exclude_runtime_fields() {
        let site = site();
        let targets = UpdateTargets::instances(site.instances().iter().take(1));
        let body = Envelope::update(UpdateKind::Remove, targets).body();
        let sent = &body.get("remove").and_then(|r| r.get("instanceArray")).and_then(Tree::as_array).unwrap()[0];
        assert_eq!(sent.get("hostName").and_then(Tree::as_str), Some("alpha"));
        assert!(sent.get("runningState").is_none());
        assert!(sent.get("deaths").is_none());
    }

    #[test]
    fn test_query_clear_and_overwrite_shapes() {
        assert_eq!(Envelope::query(QueryKind::Host).body(), Tree::str("HOST"));
        assert_eq!(Envelope::query(QueryKind::Host).request_key(), QUERY_REQUEST);
        assert_eq!(Envelope::clear().body().get("clear").and_then(Tree::as_str), Some("SITE"));

        let overwrite = Envelope::overwrite(&site()).body();
        let archive = overwrite.get("overwrite").and_then(|o| o.get("SiteConfig")).unwrap();
        assert_eq!(archive.get("instances").and_then(Tree::as_array).map(|a| a.len()), Some(2));
    }

    #[test]
    #[should_panic(expected = "without any target")]
    fn test_update_without_targets_panics() {
        Envelope::update(UpdateKind::Configure, UpdateTargets::default());
    }

    #[test]
    #[should_panic(expected = "without any instance")]
    fn test_command_without_instances_panics() {
        Envelope::command(Command::Start, Vec::new());
    }

    #[test]
    fn test_empty_instance_list_leaves_kind_absent() {
        let targets = UpdateTargets::instances(std::iter::empty());
        assert!(targets.is_empty());
    }
}
