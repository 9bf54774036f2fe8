//! `Ceed` context: backend selection and delegate lookup.
//!
//! Backends are found through a process-wide registry of
//! `(prefix, priority, init)` entries. A resource string selects the entry
//! sharing the longest leading part with it; ties go to the lower priority
//! number. `/cpu/self` therefore resolves to the reference backend.

use std::fmt;
use std::rc::Rc;

use log::debug;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::Scalar;
use crate::backend::{Backend, Capability, memcheck, reference};
use crate::ceed_error::CeedError;
use crate::config::CeedConfig;
use crate::data::vector::CeedVector;

/// Constructor stored in the backend registry.
pub type BackendInit = fn(&str) -> Result<Box<dyn Backend>, CeedError>;

#[derive(Clone)]
struct BackendEntry {
    prefix: String,
    priority: u32,
    init: BackendInit,
}

static REGISTRY: Lazy<RwLock<Vec<BackendEntry>>> = Lazy::new(|| {
    RwLock::new(vec![
        BackendEntry {
            prefix: reference::PREFIX.to_string(),
            priority: 50,
            init: reference::RefBackend::init,
        },
        BackendEntry {
            prefix: memcheck::PREFIX.to_string(),
            priority: 100,
            init: memcheck::MemcheckBackend::init,
        },
    ])
});

/// Add a backend to the registry.
///
/// Fails if `prefix` is already registered.
pub fn register_backend(prefix: &str, priority: u32, init: BackendInit) -> Result<(), CeedError> {
    let mut reg = REGISTRY.write();
    if reg.iter().any(|e| e.prefix == prefix) {
        return Err(CeedError::InvalidParameter(format!(
            "backend `{prefix}` is already registered"
        )));
    }
    debug!("registering backend {prefix} (priority {priority})");
    reg.push(BackendEntry {
        prefix: prefix.to_string(),
        priority,
        init,
    });
    Ok(())
}

/// Prefixes of all registered backends.
pub fn registered_backends() -> Vec<String> {
    REGISTRY.read().iter().map(|e| e.prefix.clone()).collect()
}

/// Length of the shared leading part, if one string is a prefix of the other.
fn match_len(resource: &str, prefix: &str) -> Option<usize> {
    (resource.starts_with(prefix) || prefix.starts_with(resource))
        .then(|| resource.len().min(prefix.len()))
        .filter(|&n| n > 0)
}

fn lookup(resource: &str) -> Result<BackendInit, CeedError> {
    let reg = REGISTRY.read();
    reg.iter()
        .filter_map(|e| match_len(resource, &e.prefix).map(|n| (n, e)))
        .max_by(|(na, a), (nb, b)| na.cmp(nb).then(b.priority.cmp(&a.priority)))
        .map(|(_, e)| {
            debug!("resource {resource} resolved to backend {}", e.prefix);
            e.init
        })
        .ok_or_else(|| CeedError::UnknownResource(resource.to_string()))
}

struct CeedInner {
    config: CeedConfig,
    backend: Box<dyn Backend>,
    delegate: Option<Ceed>,
}

/// Library context: one backend plus an optional delegate for the
/// capabilities that backend lacks.
#[derive(Clone)]
pub struct Ceed {
    inner: Rc<CeedInner>,
}

static_assertions::assert_not_impl_any!(Ceed: Send, Sync);

impl fmt::Debug for Ceed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ceed")
            .field("resource", &self.inner.config.resource)
            .field("deterministic", &self.inner.config.deterministic)
            .field("delegate", &self.inner.delegate)
            .finish()
    }
}

impl Ceed {
    /// Create a context for `resource` with default settings.
    pub fn init(resource: &str) -> Result<Self, CeedError> {
        Self::with_config(CeedConfig::new(resource))
    }

    pub fn with_config(config: CeedConfig) -> Result<Self, CeedError> {
        let init = lookup(&config.resource)?;
        let backend = init(&config.resource)?;
        let delegate = match backend.delegate_resource() {
            Some(r) if r == config.resource => {
                return Err(CeedError::Backend(format!(
                    "backend `{r}` names itself as delegate"
                )));
            }
            Some(r) => Some(Ceed::with_config(CeedConfig {
                resource: r.to_string(),
                ..config.clone()
            })?),
            None => None,
        };
        debug!(
            "initialized context {} (deterministic: {}, delegate: {:?})",
            config.resource,
            config.deterministic,
            delegate.as_ref().map(Ceed::resource)
        );
        Ok(Self {
            inner: Rc::new(CeedInner {
                config,
                backend,
                delegate,
            }),
        })
    }

    pub fn resource(&self) -> &str {
        &self.inner.config.resource
    }

    pub fn config(&self) -> &CeedConfig {
        &self.inner.config
    }

    pub fn is_deterministic(&self) -> bool {
        self.inner.config.deterministic
    }

    pub fn delegate(&self) -> Option<&Ceed> {
        self.inner.delegate.as_ref()
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    /// The first context along the delegate chain whose backend implements `cap`.
    pub fn resolve_for(&self, cap: Capability) -> Result<&Ceed, CeedError> {
        if self.inner.backend.supports(cap) {
            return Ok(self);
        }
        match &self.inner.delegate {
            Some(d) => {
                debug!(
                    "{} lacks {}, falling back to {}",
                    self.resource(),
                    cap.name(),
                    d.resource()
                );
                d.resolve_for(cap)
            }
            None => Err(CeedError::unsupported(cap.name(), self.resource())),
        }
    }

    /// Create a vector of `len` entries with the backend's initial value.
    pub fn vector(&self, len: usize) -> CeedVector {
        CeedVector::with_value(len, self.vector_fill())
    }

    fn vector_fill(&self) -> Scalar {
        self.inner.backend.vector_fill()
    }

    /// Whether two handles refer to the same context.
    pub fn ptr_eq(&self, other: &Ceed) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_len_requires_prefix_relation() {
        assert_eq!(match_len("/cpu/self/ref/serial", "/cpu/self/ref"), Some(13));
        assert_eq!(match_len("/cpu/self", "/cpu/self/ref"), Some(9));
        assert_eq!(match_len("/gpu/cuda", "/cpu/self/ref"), None);
        assert_eq!(match_len("", "/cpu/self/ref"), None);
    }

    #[test]
    fn resolves_builtin_resources() {
        let ceed = Ceed::init("/cpu/self/ref/serial").unwrap();
        assert!(ceed.delegate().is_none());
        assert!(ceed.resolve_for(Capability::CreateStandard).unwrap().ptr_eq(&ceed));

        let generic = Ceed::init("/cpu/self").unwrap();
        assert_eq!(generic.backend().resource(), "/cpu/self");
        assert!(generic.delegate().is_none());
    }

    #[test]
    fn memcheck_delegates_to_reference() {
        let ceed = Ceed::init("/cpu/self/memcheck").unwrap();
        let d = ceed.resolve_for(Capability::CreateBlocked).unwrap();
        assert_eq!(d.resource(), "/cpu/self/ref/serial");
        assert!(ceed.vector(2).as_slice().iter().all(|x| x.is_nan()));
    }

    #[test]
    fn unknown_resource_is_rejected() {
        assert_eq!(
            Ceed::init("/gpu/cuda/ref").unwrap_err(),
            CeedError::UnknownResource("/gpu/cuda/ref".into())
        );
    }

    #[test]
    fn deterministic_flag_reaches_delegate() {
        let cfg = CeedConfig::new("/cpu/self/memcheck").deterministic(true);
        let ceed = Ceed::with_config(cfg).unwrap();
        assert!(ceed.delegate().map(Ceed::is_deterministic).unwrap_or(false));
    }
}
