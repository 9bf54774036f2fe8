//! Context configuration.

use serde::{Deserialize, Serialize};

/// Resource used when none is given.
pub const DEFAULT_RESOURCE: &str = "/cpu/self/ref/serial";

/// Settings for creating a [`Ceed`](crate::ceed::Ceed) context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeedConfig {
    /// Backend resource string, e.g. `/cpu/self/ref/serial`.
    pub resource: String,
    /// Request bitwise-reproducible transpose (scatter-add) results.
    pub deterministic: bool,
}

impl Default for CeedConfig {
    fn default() -> Self {
        Self {
            resource: DEFAULT_RESOURCE.to_string(),
            deterministic: false,
        }
    }
}

impl CeedConfig {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    /// Builder-style toggle for [`deterministic`](Self::deterministic).
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }
}
