//! Runtime Configuration
//!
//! Tunables shared by every location of a cluster. Values come from
//! `RuntimeConfig::default()`, optionally overridden by `PCONTAINERS_*`
//! environment variables and then by command line flags in the binary.

use std::str::FromStr;

/// Directories with at most this many entries are searched linearly.
pub const DEFAULT_LINEAR_SEARCH_THRESHOLD: usize = 5;
/// Remote lookup cache is cleared wholesale once it holds this many GIDs.
pub const DEFAULT_LOOKUP_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_LOCATIONS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of locations (independent execution contexts) in the cluster.
    pub locations: usize,
    pub linear_search_threshold: usize,
    pub lookup_cache_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            locations: DEFAULT_LOCATIONS,
            linear_search_threshold: DEFAULT_LINEAR_SEARCH_THRESHOLD,
            lookup_cache_capacity: DEFAULT_LOOKUP_CACHE_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Builds a configuration from the environment, falling back to defaults
    /// for unset or unparsable variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            locations: env_or("PCONTAINERS_LOCATIONS", defaults.locations).max(1),
            linear_search_threshold: env_or(
                "PCONTAINERS_LINEAR_SEARCH_THRESHOLD",
                defaults.linear_search_threshold,
            ),
            lookup_cache_capacity: env_or("PCONTAINERS_LOOKUP_CACHE", defaults.lookup_cache_capacity)
                .max(1),
        }
    }

    pub fn with_locations(mut self, locations: usize) -> Self {
        self.locations = locations.max(1);
        self
    }

    pub fn with_linear_search_threshold(mut self, threshold: usize) -> Self {
        self.linear_search_threshold = threshold;
        self
    }

    pub fn with_lookup_cache_capacity(mut self, capacity: usize) -> Self {
        self.lookup_cache_capacity = capacity.max(1);
        self
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
