//! Memory kinds and array ownership modes.
//!
//! Callers hand index arrays to restriction creation as a [`HostArray`],
//! whose variant is the ownership mode. Descriptors keep them in an
//! [`ArrayStore`], which remembers the mode it was created with.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Where an array lives.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemType {
    #[default]
    Host,
    Device,
}

/// How the descriptor takes hold of a caller array.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CopyMode {
    /// Duplicate the data immediately; the caller keeps its array.
    CopyValues,
    /// Share the caller's buffer; the caller may keep its own handle.
    UsePointer,
    /// Take the buffer; it is released when the descriptor is destroyed.
    OwnPointer,
}

/// A caller-side array together with its ownership mode.
#[derive(Debug, Clone)]
pub enum HostArray<'a, T> {
    Copy(&'a [T]),
    Use(Arc<[T]>),
    Own(Vec<T>),
}

impl<'a, T> HostArray<'a, T> {
    pub fn mode(&self) -> CopyMode {
        match self {
            HostArray::Copy(_) => CopyMode::CopyValues,
            HostArray::Use(_) => CopyMode::UsePointer,
            HostArray::Own(_) => CopyMode::OwnPointer,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            HostArray::Copy(s) => s,
            HostArray::Use(a) => a,
            HostArray::Own(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl<T: Clone> HostArray<'_, T> {
    /// Resolve the ownership mode into descriptor-side storage.
    pub fn into_store(self) -> ArrayStore<T> {
        let mode = self.mode();
        let data: Arc<[T]> = match self {
            HostArray::Copy(s) => Arc::from(s),
            HostArray::Use(a) => a,
            HostArray::Own(v) => Arc::from(v),
        };
        ArrayStore { data, mode }
    }
}

impl<'a, T> From<&'a [T]> for HostArray<'a, T> {
    fn from(s: &'a [T]) -> Self {
        HostArray::Copy(s)
    }
}

impl<'a, T, const N: usize> From<&'a [T; N]> for HostArray<'a, T> {
    fn from(s: &'a [T; N]) -> Self {
        HostArray::Copy(s)
    }
}

impl<'a, T> From<&'a Vec<T>> for HostArray<'a, T> {
    fn from(v: &'a Vec<T>) -> Self {
        HostArray::Copy(v)
    }
}

impl<T> From<Vec<T>> for HostArray<'_, T> {
    fn from(v: Vec<T>) -> Self {
        HostArray::Own(v)
    }
}

impl<T> From<Arc<[T]>> for HostArray<'_, T> {
    fn from(a: Arc<[T]>) -> Self {
        HostArray::Use(a)
    }
}

/// Descriptor-side array storage.
///
/// Dropping the store releases the descriptor's hold on the data exactly
/// once, whatever the mode.
#[derive(Debug, Clone)]
pub struct ArrayStore<T> {
    data: Arc<[T]>,
    mode: CopyMode,
}

impl<T> ArrayStore<T> {
    /// Storage built internally (e.g. by the blocking codec) and owned outright.
    pub fn owned(data: Vec<T>) -> Self {
        Self {
            data: Arc::from(data),
            mode: CopyMode::OwnPointer,
        }
    }

    pub fn mode(&self) -> CopyMode {
        self.mode
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A shared handle to the data, valid independently of the store.
    pub fn shared(&self) -> Arc<[T]> {
        Arc::clone(&self.data)
    }
}
