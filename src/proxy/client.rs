//! The shared outbound HTTP client.

use std::time::Duration;

use crate::config::TimeoutConfig;

/// One pooled client for every downstream call. Built once at startup.
pub fn build_client(timeouts: &TimeoutConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeouts.upstream_secs))
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("api-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
}
