//! Static service name → base URL table.

use std::collections::BTreeMap;

use url::Url;

use crate::config::ServicesConfig;

/// Immutable after startup.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, String>,
}

impl ServiceRegistry {
    pub fn from_config(config: &ServicesConfig) -> Result<Self, url::ParseError> {
        Self::new(config.0.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self, url::ParseError> {
        let services = entries
            .into_iter()
            .map(|(name, base)| {
                Url::parse(base)?;
                Ok((name.to_string(), base.trim_end_matches('/').to_string()))
            })
            .collect::<Result<_, url::ParseError>>()?;
        Ok(Self { services })
    }

    pub fn base_url(&self, service: &str) -> Option<&str> {
        self.services.get(service).map(String::as_str)
    }

    /// Absolute URL for `path` on `service`.
    pub fn endpoint(&self, service: &str, path: &str) -> Option<String> {
        let base = self.base_url(service)?;
        if path.starts_with('/') {
            Some(format!("{base}{path}"))
        } else {
            Some(format!("{base}/{path}"))
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
