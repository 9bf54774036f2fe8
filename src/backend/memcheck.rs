//! `/cpu/self/memcheck`: debugging backend.
//!
//! Implements no restriction hooks of its own; every restriction is built by
//! its delegate, the serial reference backend. Vectors created through a
//! memcheck context start out as NaN so that reads of never-written entries
//! show up in results.

use crate::Scalar;
use crate::backend::{Backend, Capability};
use crate::ceed_error::CeedError;

/// Registry prefix of the memcheck backend.
pub const PREFIX: &str = "/cpu/self/memcheck";

const DELEGATE: &str = "/cpu/self/ref/serial";

#[derive(Debug, Clone)]
pub struct MemcheckBackend {
    resource: String,
}

impl MemcheckBackend {
    pub fn init(resource: &str) -> Result<Box<dyn Backend>, CeedError> {
        Ok(Box::new(Self {
            resource: resource.to_string(),
        }))
    }
}

impl Backend for MemcheckBackend {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn supports(&self, _cap: Capability) -> bool {
        false
    }

    fn delegate_resource(&self) -> Option<&str> {
        Some(DELEGATE)
    }

    fn vector_fill(&self) -> Scalar {
        Scalar::NAN
    }
}
