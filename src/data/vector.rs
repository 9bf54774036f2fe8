//! Minimal vector collaborator consumed by restriction apply.

use crate::Scalar;
use crate::ceed_error::CeedError;
use crate::data::array::MemType;
use crate::data::storage::{Storage, VecStorage};

/// A flat array of scalars, either an L-vector or an E-vector.
///
/// Read and write access are scoped borrows: the array is "restored" when the
/// returned slice goes out of scope.
#[derive(Clone, Debug)]
pub struct CeedVector<S: Storage<Scalar> = VecStorage<Scalar>> {
    storage: S,
}

impl CeedVector {
    /// Create a zero-filled vector of `len` entries.
    pub fn new(len: usize) -> Self {
        Self::with_value(len, 0.0)
    }

    pub fn with_value(len: usize, value: Scalar) -> Self {
        Self {
            storage: VecStorage::with_len(len, value),
        }
    }

    pub fn from_slice(values: &[Scalar]) -> Self {
        Self {
            storage: VecStorage::from(values.to_vec()),
        }
    }

    pub fn into_vec(self) -> Vec<Scalar> {
        self.storage.into_inner()
    }
}

impl<S: Storage<Scalar>> CeedVector<S> {
    /// Wrap an existing storage buffer.
    pub fn from_storage(storage: S) -> Self {
        Self { storage }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Set every entry to `value`.
    pub fn set_value(&mut self, value: Scalar) {
        self.storage.fill(value);
    }

    /// Copy `values` into the vector; lengths must match.
    pub fn set_array(&mut self, values: &[Scalar]) -> Result<(), CeedError> {
        if values.len() != self.len() {
            return Err(CeedError::ArrayLength {
                what: "vector",
                expected: self.len(),
                found: values.len(),
            });
        }
        self.storage.write_at(0, values)
    }

    /// Read-only access to the values in memory `mem`.
    pub fn read_array(&self, mem: MemType) -> Result<&[Scalar], CeedError> {
        host_only(mem)?;
        Ok(self.storage.as_slice())
    }

    /// Read-write access to the values in memory `mem`.
    pub fn write_array(&mut self, mem: MemType) -> Result<&mut [Scalar], CeedError> {
        host_only(mem)?;
        Ok(self.storage.as_mut_slice())
    }

    /// Host values as a slice.
    pub fn as_slice(&self) -> &[Scalar] {
        self.storage.as_slice()
    }

    pub fn to_vec(&self) -> Vec<Scalar> {
        self.storage.as_slice().to_vec()
    }
}

pub(crate) fn host_only(mem: MemType) -> Result<(), CeedError> {
    match mem {
        MemType::Host => Ok(()),
        MemType::Device => Err(CeedError::Backend("can only provide HOST memory".into())),
    }
}
