use crate::config::MqttConf;
use crate::state::{new_state, Shared, SharedSite};
use crate::topology::Site;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task;

pub const HEALTH_TOPIC: &str = "fleetmon/kernel/health@v1";

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub hosts_tracked: u32,
    pub hosts_available: u32,
    pub applications: u32,
    pub instances: u32,
    pub polls_completed: u32,
    pub last_poll: Option<String>,
    pub last_poll_errors: u32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    polls_completed: Arc<AtomicU32>,
    last_poll_errors: Arc<AtomicU32>,
    last_poll: Shared<Option<String>>,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Shared<String>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            polls_completed: Arc::new(AtomicU32::new(0)),
            last_poll_errors: Arc::new(AtomicU32::new(0)),
            last_poll: new_state(None),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: new_state("disabled".to_string()),
        }
    }

    /// Records a finished poll cycle and how many errors it surfaced.
    pub fn record_poll(&self, errors: usize) {
        self.polls_completed.fetch_add(1, Ordering::Relaxed);
        self.last_poll_errors
            .store(u32::try_from(errors).unwrap_or(u32::MAX), Ordering::Relaxed);
        *self.last_poll.lock() = OffsetDateTime::now_utc().format(&Rfc3339).ok();
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, site: &Site) -> KernelHealth {
        let count = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            hosts_tracked: count(site.hosts().len()),
            hosts_available: count(site.hosts().iter().filter(|h| h.is_available).count()),
            applications: count(site.applications().len()),
            instances: count(site.instances().len()),
            polls_completed: self.polls_completed.load(Ordering::Relaxed),
            last_poll: self.last_poll.lock().clone(),
            last_poll_errors: self.last_poll_errors.load(Ordering::Relaxed),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }

    /// Publishes the health snapshot every 30s on `fleetmon/kernel/health@v1`.
    pub fn spawn_health_publisher(&self, mqtt: MqttConf, site: SharedSite) {
        let tracker = self.clone();
        *tracker.mqtt_status.lock() = "connecting".to_string();

        task::spawn(async move {
            let mut opts = MqttOptions::new("fleetmon-kernel-health", &mqtt.host, mqtt.port);
            opts.set_keep_alive(Duration::from_secs(15));
            let (client, mut eventloop) = AsyncClient::new(opts, 10);
            let mut interval = tokio::time::interval(Duration::from_secs(30));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let health = tracker.get_health(&*site.read().await);
                        let Ok(payload) = serde_json::to_string(&health) else { continue };
                        match client.publish(HEALTH_TOPIC, QoS::AtLeastOnce, false, payload).await {
                            Ok(()) => tracing::debug!(
                                uptime = health.uptime_seconds,
                                hosts = health.hosts_tracked,
                                "published kernel health"
                            ),
                            Err(e) => tracing::warn!(error = %e, "health publish failed"),
                        }
                    },
                    event = eventloop.poll() => match event {
                        Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => tracker.mark_mqtt_connected(),
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "health MQTT error");
                            tracker.increment_reconnects();
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    },
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{HostConfig, SiteSettings};

    #[test]
    fn test_health_counts_site_and_polls() {
        let mut site = Site::new(SiteSettings::default());
        site.add_host(HostConfig { name: "h1".into(), port: 1085, host_type: "UNIX".into() })
            .unwrap();
        site.add_host(HostConfig { name: "h2".into(), port: 1085, host_type: "UNIX".into() })
            .unwrap();
        site.host_mut("h2").unwrap().is_available = true;

        let tracker = HealthTracker::new();
        let before = tracker.get_health(&site);
        assert_eq!(before.polls_completed, 0);
        assert!(before.last_poll.is_none());
        assert_eq!(before.mqtt_status, "disabled");

        tracker.record_poll(3);
        let after = tracker.get_health(&site);
        assert_eq!(after.hosts_tracked, 2);
        assert_eq!(after.hosts_available, 1);
        assert_eq!(after.polls_completed, 1);
        assert_eq!(after.last_poll_errors, 3);
        assert!(after.last_poll.is_some());
    }
}
