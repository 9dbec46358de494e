//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan (acceptable for typical route counts)
//! - Explicit `None` rather than a silent default route

use crate::config::RouteConfig;
use crate::routing::matcher::{join_path, PathPrefixMatcher};

#[derive(Debug, Clone)]
struct CompiledRoute {
    name: String,
    service: String,
    upstream_prefix: String,
    priority: u32,
    matcher: PathPrefixMatcher,
}

/// A resolved forwarding target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a str,
    pub service: &'a str,
    pub upstream_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile routes: highest priority first, then longest prefix.
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        let mut routes: Vec<CompiledRoute> = routes
            .iter()
            .map(|r| CompiledRoute {
                name: r.name.clone(),
                service: r.service.clone(),
                upstream_prefix: r.upstream_prefix.clone(),
                priority: r.priority,
                matcher: PathPrefixMatcher::new(r.path_prefix.as_str()),
            })
            .collect();
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.matcher.len().cmp(&a.matcher.len()))
        });
        Self { routes }
    }

    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            let rest = route.matcher.strip(path)?;
            Some(RouteMatch {
                route: &route.name,
                service: &route.service,
                upstream_path: join_path(&route.upstream_prefix, rest),
            })
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutesConfig;

    #[test]
    fn test_default_routes() {
        let table = RouteTable::from_config(&RoutesConfig::default().0);

        let m = table.match_path("/api/models/llama/download").unwrap();
        assert_eq!(m.service, "model-manager");
        assert_eq!(m.upstream_path, "/models/llama/download");

        let m = table.match_path("/api/cluster/status").unwrap();
        assert_eq!(m.service, "cluster-manager");
        assert_eq!(m.upstream_path, "/cluster/status");

        assert_eq!(table.match_path("/api/tasks").unwrap().upstream_path, "/tasks");
        assert!(table.match_path("/api/unknown").is_none());
    }

    #[test]
    fn test_priority_then_longest_prefix() {
        let mut catch_all = RouteConfig::new("catch-all", "/api", "task-manager", "");
        let specific = RouteConfig::new("stats", "/api/tasks/stats", "cluster-manager", "/stats");
        let tasks = RouteConfig::new("tasks", "/api/tasks", "task-manager", "/tasks");

        let table = RouteTable::from_config(&[catch_all.clone(), tasks.clone(), specific.clone()]);
        assert_eq!(table.match_path("/api/tasks/stats").unwrap().route, "stats");
        assert_eq!(table.match_path("/api/tasks/1").unwrap().route, "tasks");
        assert_eq!(table.match_path("/api/other").unwrap().upstream_path, "/other");

        catch_all.priority = 10;
        let table = RouteTable::from_config(&[tasks, specific, catch_all]);
        assert_eq!(table.match_path("/api/tasks/stats").unwrap().route, "catch-all");
    }
}
