/**
 * RECONCILER - Applies agent query results to the site
 *
 * FLOWS :
 *   INSTANCE    -> running state, refusing flag, statistics, deaths, next shutdown
 *                  of every instance matched by (host, port)
 *   HOST        -> availability + statistics, response i belongs to host i
 *   APPLICATION -> running instance counts, summed across hosts
 *
 * The apply_* functions are pure edits of a borrowed Site. The Reconciler
 * wraps them: snapshot targets under the read lock, broadcast unlocked, then
 * apply every result under one write lock so no reader sees half a pass.
 */

use crate::broadcast::Broadcaster;
use crate::envelope::{Envelope, QueryKind, QUERY_RESPONSE};
use crate::errors::{aggregate, ErrorSink};
use crate::state::SharedSite;
use crate::topology::{HostAddr, RunningState, Site};
use crate::tree::Tree;

fn query_records(response: &Tree, kind: QueryKind) -> &[Tree] {
    response
        .get(QUERY_RESPONSE)
        .and_then(|q| q.get(kind.response_key()))
        .and_then(Tree::as_array)
        .unwrap_or(&[])
}

/// Updates every instance reported in `responses`. Records that match no
/// local instance are skipped. Returns the number of instances updated.
pub fn apply_instance_status(site: &mut Site, responses: &[Tree]) -> usize {
    let mut applied = 0;
    for record in responses.iter().flat_map(|r| query_records(r, QueryKind::Instance)) {
        let Some(host) = record.get("host").and_then(Tree::as_str) else {
            continue;
        };
        let Some(port) = record.get("port").and_then(Tree::as_i64).and_then(|p| u16::try_from(p).ok()) else {
            continue;
        };
        let Some(instance) = site.instance_by_host_and_port_mut(host, port) else {
            continue;
        };

        // an unknown state name keeps whatever we had
        if let Some(state) = record
            .get("runningState")
            .and_then(Tree::as_str)
            .and_then(RunningState::from_name)
        {
            instance.running_state = state;
        }
        instance.refusing_new_sessions = record
            .get("refusingNewSessions")
            .and_then(Tree::as_bool)
            .unwrap_or(false);
        instance.statistics = record
            .get("statistics")
            .and_then(Tree::as_map)
            .cloned()
            .unwrap_or_default();
        instance.deaths = record
            .get("deaths")
            .and_then(Tree::as_array)
            .map(<[Tree]>::to_vec)
            .unwrap_or_default();
        instance.next_scheduled_shutdown = record.get("nextShutdown").and_then(Tree::to_message);
        applied += 1;
    }
    applied
}

/// `responses[i]` is the answer of `hosts[i]`. A host whose answer has no
/// status map is marked unavailable. Returns the number of available hosts.
pub fn apply_host_status(site: &mut Site, hosts: &[HostAddr], responses: &[Tree]) -> usize {
    let mut available = 0;
    for (addr, response) in hosts.iter().zip(responses) {
        let Some(host) = site.host_mut(&addr.name) else {
            continue;
        };
        match response
            .get(QUERY_RESPONSE)
            .and_then(|q| q.get(QueryKind::Host.response_key()))
        {
            Some(Tree::Map(statistics)) => {
                host.is_available = true;
                host.statistics = statistics.clone();
                available += 1;
            }
            _ => host.is_available = false,
        }
    }
    available
}

/// Adds each reported count to the matching application.
///
/// Counts accumulate: the caller must reset them (`Site::reset_running_counts`)
/// before applying a new pass.
pub fn apply_application_counts(site: &mut Site, responses: &[Tree]) {
    for record in responses.iter().flat_map(|r| query_records(r, QueryKind::Application)) {
        let Some(name) = record.get("name").and_then(Tree::as_str) else {
            continue;
        };
        let Some(count) = record
            .get("runningInstances")
            .and_then(Tree::as_i64)
            .and_then(|c| u32::try_from(c).ok())
        else {
            continue;
        };
        if let Some(application) = site.application_by_name_mut(name) {
            application.running_instances_count = application.running_instances_count.saturating_add(count);
        }
    }
}

/// Drives the three poll flows against a shared site.
#[derive(Clone)]
pub struct Reconciler {
    broadcaster: Broadcaster,
    site: SharedSite,
}

impl Reconciler {
    pub fn new(broadcaster: Broadcaster, site: SharedSite) -> Self {
        Self { broadcaster, site }
    }

    async fn query(&self, kind: QueryKind) -> (Envelope, Vec<HostAddr>, Vec<Tree>) {
        let hosts = self.site.read().await.host_addrs();
        let envelope = Envelope::query(kind);
        let responses = self.broadcaster.broadcast(&envelope, &hosts).await;
        (envelope, hosts, responses)
    }

    pub async fn poll_instances(&self, sink: &mut dyn ErrorSink) -> usize {
        let (envelope, _, responses) = self.query(QueryKind::Instance).await;
        let applied = apply_instance_status(&mut *self.site.write().await, &responses);
        aggregate(&envelope, &responses, sink);
        tracing::debug!(applied, hosts = responses.len(), "instance poll done");
        applied
    }

    pub async fn poll_hosts(&self, sink: &mut dyn ErrorSink) -> usize {
        let (envelope, hosts, responses) = self.query(QueryKind::Host).await;
        let available = apply_host_status(&mut *self.site.write().await, &hosts, &responses);
        aggregate(&envelope, &responses, sink);
        tracing::debug!(available, hosts = hosts.len(), "host poll done");
        available
    }

    /// Resets every count and applies the new sums in one write-lock section.
    pub async fn poll_applications(&self, sink: &mut dyn ErrorSink) {
        let (envelope, _, responses) = self.query(QueryKind::Application).await;
        {
            let mut site = self.site.write().await;
            site.reset_running_counts();
            apply_application_counts(&mut site, &responses);
        }
        aggregate(&envelope, &responses, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::empty_response;
    use crate::topology::{ApplicationConfig, HostConfig, InstanceConfig, SiteSettings};
    use serde_json::json;

    fn site() -> Site {
        let mut site = Site::new(SiteSettings::default());
        for name in ["h1", "h2", "h3"] {
            site.add_host(HostConfig { name: name.into(), port: 1085, host_type: "UNIX".into() })
                .unwrap();
        }
        site.add_application(ApplicationConfig {
            name: "AppX".into(),
            starting_port: Some(2001),
            path: None,
            auto_recover: false,
            additional_args: None,
        })
        .unwrap();
        for (id, host, port) in [(1, "h1", 2001), (2, "h2", 2001)] {
            site.add_instance(InstanceConfig {
                application_name: "AppX".into(),
                id,
                host_name: host.into(),
                port,
                path: None,
                auto_recover: false,
                additional_args: None,
                scheduling_enabled: false,
            })
            .unwrap();
        }
        site
    }

    fn instance_response(records: serde_json::Value) -> Tree {
        Tree::from(json!({"queryWotaskdResponse": {"instanceResponse": records}}))
    }

    #[test]
    fn test_instance_poll_maps_state_and_fields() {
        let mut site = site();
        let responses = vec![instance_response(json!([{
            "host": "h1",
            "port": "2001",
            "runningState": "ALIVE",
            "refusingNewSessions": "YES",
            "statistics": {"transactions": 42},
            "deaths": ["2026-01-01 10:00"],
            "nextShutdown": "2026-01-02 03:00"
        }]))];

        assert_eq!(apply_instance_status(&mut site, &responses), 1);

        let i1 = site.instance_by_host_and_port("h1", 2001).unwrap();
        assert_eq!(i1.running_state, RunningState::Alive);
        assert_eq!(i1.running_state.index(), 2);
        assert!(i1.refusing_new_sessions);
        assert_eq!(i1.statistics.get("transactions").and_then(Tree::as_i64), Some(42));
        assert_eq!(i1.deaths.len(), 1);
        assert_eq!(i1.next_scheduled_shutdown.as_deref(), Some("2026-01-02 03:00"));

        // not mentioned anywhere, left untouched
        let i2 = site.instance_by_host_and_port("h2", 2001).unwrap();
        assert_eq!(i2.running_state, RunningState::Unknown);
        assert!(i2.deaths.is_empty());
    }

    #[test]
    fn test_unknown_state_name_keeps_current_state() {
        let mut site = site();
        site.instance_by_host_and_port_mut("h1", 2001).unwrap().running_state = RunningState::Dead;
        let responses = vec![instance_response(json!([
            {"host": "h1", "port": 2001, "runningState": "alive"}
        ]))];
        apply_instance_status(&mut site, &responses);
        assert_eq!(site.instance_by_host_and_port("h1", 2001).unwrap().running_state, RunningState::Dead);
    }

    #[test]
    fn test_unmatched_records_are_skipped() {
        let mut site = site();
        let responses = vec![
            instance_response(json!([{"host": "gone", "port": 9999, "runningState": "ALIVE"}])),
            empty_response(),
        ];
        assert_eq!(apply_instance_status(&mut site, &responses), 0);
    }

    #[test]
    fn test_host_poll_marks_empty_answer_unavailable() {
        let mut site = site();
        for host in ["h1", "h2", "h3"] {
            site.host_mut(host).unwrap().is_available = true;
        }
        let hosts = site.host_addrs();
        let status = |load: &str| Tree::from(json!({"queryWotaskdResponse": {"hostResponse": {"load": load}}}));
        let responses = vec![status("0.1"), empty_response(), status("0.3")];

        assert_eq!(apply_host_status(&mut site, &hosts, &responses), 2);
        assert!(site.host("h1").unwrap().is_available);
        assert!(!site.host("h2").unwrap().is_available);
        assert!(site.host("h3").unwrap().is_available);
        assert_eq!(site.host("h3").unwrap().statistics.get("load").and_then(Tree::as_str), Some("0.3"));
    }

    #[test]
    fn test_application_counts_sum_across_hosts() {
        let mut site = site();
        site.application_by_name_mut("AppX").unwrap().running_instances_count = 99;
        let counts = |n: i64| {
            Tree::from(json!({"queryWotaskdResponse": {"applicationResponse": [
                {"name": "AppX", "runningInstances": n},
                {"name": "Unknown", "runningInstances": 1}
            ]}}))
        };

        site.reset_running_counts();
        apply_application_counts(&mut site, &[counts(3), counts(5)]);
        assert_eq!(site.application_by_name("AppX").unwrap().running_instances_count, 8);
    }
}
