//! Folding per-service probes into one system view.

use chrono::Utc;

use crate::health::types::{OverallStatus, ServiceHealth, SystemHealth};

impl SystemHealth {
    /// `healthy` iff every probe is healthy. An empty registry counts as healthy.
    pub fn aggregate(probes: impl IntoIterator<Item = ServiceHealth>) -> Self {
        let services: std::collections::BTreeMap<_, _> = probes
            .into_iter()
            .map(|probe| (probe.service.clone(), probe))
            .collect();
        let healthy_services = services.values().filter(|s| s.status.is_healthy()).count();
        let total_services = services.len();

        Self {
            overall_status: if healthy_services == total_services {
                OverallStatus::Healthy
            } else {
                OverallStatus::Degraded
            },
            healthy_services,
            total_services,
            services,
            timestamp: Utc::now(),
        }
    }

    /// Percentage of healthy services, 0 when nothing is registered.
    pub fn availability_percentage(&self) -> f64 {
        if self.total_services == 0 {
            return 0.0;
        }
        let pct = self.healthy_services as f64 / self.total_services as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    }

    /// Same status and per-service state, ignoring timestamps.
    pub fn same_state(&self, other: &SystemHealth) -> bool {
        self.overall_status == other.overall_status
            && self.healthy_services == other.healthy_services
            && self.total_services == other.total_services
            && self.services.len() == other.services.len()
            && self
                .services
                .iter()
                .zip(other.services.iter())
                .all(|((a_name, a), (b_name, b))| a_name == b_name && a.same_state(b))
    }
}
