use crate::api::error::{CoreError, CoreResult};
use smallvec::SmallVec;

/// Ordered dimension extents of a logical tensor.
///
/// Stack-allocated for up to 4 dims, spills to the heap beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    pub fn new(dims: impl Into<Shape>) -> Self {
        dims.into()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements, or `None` if the product overflows.
    pub fn elem_count(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Flatten to `(rows, cols)`: every leading dim folds into rows, the last
    /// dim is cols.
    ///
    /// Requires rank >= 2 and non-zero extents.
    pub fn as_matrix(&self) -> CoreResult<(usize, usize)> {
        if self.dims.len() < 2 {
            return Err(CoreError::InvalidShape(format!(
                "expected a matrix (rank >= 2), got rank {} {:?}",
                self.dims.len(),
                self.dims()
            )));
        }
        if self.dims.iter().any(|&d| d == 0) {
            return Err(CoreError::InvalidShape(format!(
                "zero-sized dimension in {:?}",
                self.dims()
            )));
        }
        let ndim = self.dims.len();
        let cols = self.dims[ndim - 1];
        let rows = self.dims[..ndim - 1]
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| CoreError::ShapeOverflow { dims: self.dims.to_vec() })?;
        if rows.checked_mul(cols).is_none() {
            return Err(CoreError::ShapeOverflow { dims: self.dims.to_vec() });
        }
        Ok((rows, cols))
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self { dims: SmallVec::from_slice(&dims) }
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(dims) }
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self { dims: SmallVec::from_vec(dims) }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.dims())
    }
}
