/*!
Test harness for kernel scenarios

Builds a control node over a `StubAgent` with a small site:
- hosts `h1`, `h2`, `h3` (agent port 1085)
- applications `AppX` and `AppY`
- `AppX-1@h1:2001`, `AppX-2@h2:2001`, `AppY-1@h1:3001`
*/

use crate::agent_stub::{RecordedRequest, StubAgent};
use anyhow::Result;
use fleetmon_kernel::topology::{ApplicationConfig, HostConfig, InstanceConfig, SiteConfig, SiteSettings};
use fleetmon_kernel::{ControlNode, ErrorLog, InstanceKey, Site};
use serde_json::Value;
use std::sync::Arc;

pub struct TestHarness {
    pub agent: StubAgent,
    pub node: ControlNode,
}

impl TestHarness {
    pub fn new() -> Self {
        env_logger::try_init().ok();
        Self::with_site(Self::sample_site())
    }

    pub fn with_site(site: Site) -> Self {
        let agent = StubAgent::new();
        let node = ControlNode::new(site, Arc::new(agent.clone()));
        Self { agent, node }
    }

    pub fn host_config(name: &str) -> HostConfig {
        HostConfig {
            name: name.to_string(),
            port: 1085,
            host_type: "UNIX".to_string(),
        }
    }

    pub fn application_config(name: &str, starting_port: u16) -> ApplicationConfig {
        ApplicationConfig {
            name: name.to_string(),
            starting_port: Some(starting_port),
            path: Some(format!("/opt/apps/{name}")),
            auto_recover: true,
            additional_args: None,
        }
    }

    pub fn instance_config(application: &str, id: u32, host: &str, port: u16) -> InstanceConfig {
        InstanceConfig {
            application_name: application.to_string(),
            id,
            host_name: host.to_string(),
            port,
            path: None,
            auto_recover: true,
            additional_args: None,
            scheduling_enabled: false,
        }
    }

    pub fn sample_site() -> Site {
        let config = SiteConfig {
            settings: SiteSettings::default(),
            hosts: vec![Self::host_config("h1"), Self::host_config("h2"), Self::host_config("h3")],
            applications: vec![
                Self::application_config("AppX", 2001),
                Self::application_config("AppY", 3001),
            ],
            instances: vec![
                Self::instance_config("AppX", 1, "h1", 2001),
                Self::instance_config("AppX", 2, "h2", 2001),
                Self::instance_config("AppY", 1, "h1", 3001),
            ],
        };
        match Site::from_config(config) {
            Ok(site) => site,
            Err(e) => panic!("sample site is inconsistent: {e}"),
        }
    }

    /// Identity of an instance of the sample site.
    pub fn key(application: &str, id: u32) -> InstanceKey {
        match (application, id) {
            ("AppX", 1) => Self::instance_config("AppX", 1, "h1", 2001).key(),
            ("AppX", 2) => Self::instance_config("AppX", 2, "h2", 2001).key(),
            ("AppY", 1) => Self::instance_config("AppY", 1, "h1", 3001).key(),
            _ => panic!("no sample instance {application}-{id}"),
        }
    }

    /// Last request received by `host`.
    pub fn last_request(&self, host: &str) -> Result<RecordedRequest> {
        self.agent
            .requests_to(host)
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no request reached {host}"))
    }

    /// `monitorRequest.<key>` of the last request received by `host`.
    pub fn last_body(&self, host: &str, key: &str) -> Result<Value> {
        let request = self.last_request(host)?;
        request
            .request(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("last request to {host} has no {key}"))
    }

    pub fn assert_contacted(&self, expected: &[&str]) -> Result<()> {
        let mut contacted = self.agent.contacted_hosts();
        contacted.sort();
        let mut expected: Vec<String> = expected.iter().map(|h| h.to_string()).collect();
        expected.sort();
        if contacted != expected {
            anyhow::bail!("contacted {:?}, expected {:?}", contacted, expected);
        }
        log::info!("contacted hosts as expected: {:?}", expected);
        Ok(())
    }

    pub fn assert_no_errors(log: &ErrorLog) -> Result<()> {
        if !log.is_empty() {
            anyhow::bail!("unexpected errors: {:?}", log.errors());
        }
        Ok(())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
