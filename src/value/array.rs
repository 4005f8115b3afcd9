//! Shared, rank-N host arrays.
//!
//! A [`HostArray`] is a cheap handle onto reference-counted storage: cloning the handle, or
//! marshaling the array into script space any number of times, never copies the elements.
//! Element writes through any handle are visible through every other handle.
//!
//! Elements are stored in row-major order; the last index varies fastest.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;

use crate::{
    typesystem::HostTypeRc,
    value::HostValue,
    Error, Result,
};

struct ArrayStorage {
    element_type: HostTypeRc,
    dimensions: Vec<usize>,
    data: RwLock<Vec<HostValue>>,
}

/// A host array with reference semantics.
///
/// # Examples
///
/// ```rust,no_run
/// use hostbridge::typesystem::{PrimitiveKind, TypeRegistry};
/// use hostbridge::value::{HostArray, HostValue};
///
/// let registry = TypeRegistry::new();
/// let cube = HostArray::new(registry.primitive(PrimitiveKind::Int32), &[3, 5, 7])?;
/// let view = cube.clone();
///
/// view.set(&[2, 4, 6], HostValue::I32(42))?;
/// assert_eq!(cube.get(&[2, 4, 6])?, HostValue::I32(42));
/// assert_eq!(cube.rank(), 3);
/// assert_eq!(cube.get_length(1)?, 5);
/// # Ok::<(), hostbridge::Error>(())
/// ```
#[derive(Clone)]
pub struct HostArray(Arc<ArrayStorage>);

impl HostArray {
    /// Create an array of `dimensions`, every element set to the default of `element_type`.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] if `dimensions` is empty, or if the element count
    /// overflows or cannot be allocated.
    pub fn new(element_type: HostTypeRc, dimensions: &[usize]) -> Result<Self> {
        let total = Self::element_count(dimensions)?;

        let mut elements = Vec::new();
        elements
            .try_reserve_exact(total)
            .map_err(|_| conversion_error!("allocatable array", format!("{} elements", total)))?;
        elements.resize(total, HostValue::default_for(&element_type));

        Self::with_elements(element_type, dimensions, elements)
    }

    /// Number of elements of an array of `dimensions`.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] if the product overflows.
    pub fn element_count(dimensions: &[usize]) -> Result<usize> {
        dimensions
            .iter()
            .try_fold(1_usize, |total, &length| total.checked_mul(length))
            .ok_or_else(|| conversion_error!("array size within usize", format!("{:?}", dimensions)))
    }

    /// Create an array of `dimensions` over existing row-major `elements`.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] if `dimensions` is empty or does not describe
    /// `elements.len()` elements.
    pub fn with_elements(
        element_type: HostTypeRc,
        dimensions: &[usize],
        elements: Vec<HostValue>,
    ) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(conversion_error!("array of rank 1 or more", "rank 0"));
        }

        let total = Self::element_count(dimensions)?;
        if total != elements.len() {
            return Err(conversion_error!(
                format!("{} elements", total),
                format!("{} elements", elements.len())
            ));
        }

        Ok(HostArray(Arc::new(ArrayStorage {
            element_type,
            dimensions: dimensions.to_vec(),
            data: RwLock::new(elements),
        })))
    }

    /// Create a rank-1 array over `elements`
    #[must_use]
    pub fn from_values(element_type: HostTypeRc, elements: Vec<HostValue>) -> Self {
        let dimensions = [elements.len()];
        HostArray(Arc::new(ArrayStorage {
            element_type,
            dimensions: dimensions.to_vec(),
            data: RwLock::new(elements),
        }))
    }

    /// The element type
    #[must_use]
    pub fn element_type(&self) -> &HostTypeRc {
        &self.0.element_type
    }

    /// Number of dimensions
    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.dimensions.len()
    }

    /// Length of every dimension
    #[must_use]
    pub fn dimensions(&self) -> &[usize] {
        &self.0.dimensions
    }

    /// Total number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.read().len()
    }

    /// `true` if the array has no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of `dimension`.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfBounds`] if the array has fewer dimensions.
    pub fn get_length(&self, dimension: usize) -> Result<usize> {
        self.0
            .dimensions
            .get(dimension)
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                index: dimension,
                length: self.rank(),
            })
    }

    fn offset(&self, indices: &[usize]) -> Result<usize> {
        if indices.len() != self.rank() {
            return Err(conversion_error!(
                format!("{} indices", self.rank()),
                format!("{} indices", indices.len())
            ));
        }

        let mut offset = 0;
        for (index, length) in indices.iter().zip(self.0.dimensions.iter()) {
            if index >= length {
                return Err(Error::IndexOutOfBounds {
                    index: *index,
                    length: *length,
                });
            }
            offset = offset * length + index;
        }

        Ok(offset)
    }

    /// Read the element at `indices`, one index per dimension.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] for a wrong number of indices and
    /// [`Error::IndexOutOfBounds`] for an index outside its dimension.
    pub fn get(&self, indices: &[usize]) -> Result<HostValue> {
        let offset = self.offset(indices)?;
        Ok(self.0.data.read()[offset].clone())
    }

    /// Write the element at `indices`, one index per dimension.
    ///
    /// # Errors
    /// Returns [`Error::Conversion`] for a wrong number of indices and
    /// [`Error::IndexOutOfBounds`] for an index outside its dimension.
    pub fn set(&self, indices: &[usize], value: HostValue) -> Result<()> {
        let offset = self.offset(indices)?;
        self.0.data.write()[offset] = value;
        Ok(())
    }

    /// `true` if both handles refer to the same storage
    #[must_use]
    pub fn is_same(&self, other: &HostArray) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Copy of all elements in row-major order
    #[must_use]
    pub fn to_vec(&self) -> Vec<HostValue> {
        self.0.data.read().clone()
    }

    /// Type name in `Element[,,]` notation
    #[must_use]
    pub fn type_name(&self) -> String {
        format!(
            "{}[{}]",
            self.0.element_type.fullname(),
            ",".repeat(self.rank().saturating_sub(1))
        )
    }
}

impl fmt::Debug for HostArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostArray")
            .field("type", &self.type_name())
            .field("dimensions", &self.0.dimensions)
            .finish()
    }
}
