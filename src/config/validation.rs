//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference registered services)
//! - Validate value ranges (windows and limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("service '{service}' has invalid base URL '{url}'")]
    InvalidServiceUrl { service: String, url: String },
    #[error("route '{route}' references unknown service '{service}'")]
    UnknownRouteService { route: String, service: String },
    #[error("route '{route}' path prefix must start with '/'")]
    InvalidRoutePrefix { route: String },
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (service, url) in &config.services.0 {
        let valid = Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidServiceUrl {
                service: service.clone(),
                url: url.clone(),
            });
        }
    }

    for route in &config.routes.0 {
        if !config.services.0.contains_key(&route.service) {
            errors.push(ValidationError::UnknownRouteService {
                route: route.name.clone(),
                service: route.service.clone(),
            });
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidRoutePrefix {
                route: route.name.clone(),
            });
        }
    }

    let positives: [(&'static str, u64); 7] = [
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("rate_limit.ip_limit", config.rate_limit.ip_limit as u64),
        ("rate_limit.identity_limit", config.rate_limit.identity_limit as u64),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("health.timeout_secs", config.health.timeout_secs),
        ("audit.queue_capacity", config.audit.queue_capacity as u64),
    ];
    for (field, value) in positives {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
