use crate::config::Limits;
use crate::dtype::{DType, MatrixType};
use crate::storage::{CpuStorage, RawTen};
use crate::{MError, MResult};

/// Dense row-major matrix whose element type is picked at runtime.
///
/// Element `(r, c)` lives at flat offset `r * cols + c`. The data is never
/// mutated after construction; [`Matrix::matmul`] always builds a new matrix.
#[derive(Debug)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    name: Option<String>,
    storage: CpuStorage,
}

/// Validates the shape and returns the element count.
fn element_count(limits: &Limits, rows: usize, cols: usize, dtype: DType) -> MResult<usize> {
    if rows == 0 || cols == 0 {
        return Err(MError::invalid(format!(
            "invalid dimensions ({}, {})",
            rows, cols
        )));
    }
    if rows > limits.max_rows || cols > limits.max_cols {
        return Err(MError::invalid(format!(
            "dimensions ({}, {}) exceed maximum ({}, {})",
            rows, cols, limits.max_rows, limits.max_cols
        )));
    }
    let len = rows.checked_mul(cols).ok_or(MError::CapacityOverflow)?;
    let bytes = len
        .checked_mul(dtype.size_in_bytes())
        .ok_or(MError::CapacityOverflow)?;
    if bytes > isize::MAX as usize {
        return Err(MError::CapacityOverflow);
    }
    Ok(len)
}

fn check_name(limits: &Limits, name: Option<&str>) -> MResult<()> {
    match name {
        Some(n) if n.len() > limits.max_name_len => Err(MError::invalid(format!(
            "name is {} bytes, maximum is {}",
            n.len(),
            limits.max_name_len
        ))),
        _ => Ok(()),
    }
}

impl Matrix {
    pub(crate) fn from_parts(
        rows: usize,
        cols: usize,
        name: Option<String>,
        storage: CpuStorage,
    ) -> Self {
        debug_assert_eq!(rows * cols, storage.len());
        Self {
            rows,
            cols,
            name,
            storage,
        }
    }

    /// Zero-filled matrix within the default [`Limits`].
    pub fn new(rows: usize, cols: usize, dtype: DType, name: Option<&str>) -> MResult<Self> {
        Self::new_with(&Limits::default(), rows, cols, dtype, name)
    }

    pub fn new_with(
        limits: &Limits,
        rows: usize,
        cols: usize,
        dtype: DType,
        name: Option<&str>,
    ) -> MResult<Self> {
        let len = element_count(limits, rows, cols, dtype)?;
        check_name(limits, name)?;
        let storage = CpuStorage::zeros(dtype, len)?;
        Ok(Self::from_parts(rows, cols, name.map(str::to_owned), storage))
    }

    /// Copies `data`, read row-major, into a new matrix of `T`'s dtype.
    pub fn from_slice<T: MatrixType>(
        rows: usize,
        cols: usize,
        name: Option<&str>,
        data: &[T],
    ) -> MResult<Self> {
        Self::from_slice_with(&Limits::default(), rows, cols, name, data)
    }

    pub fn from_slice_with<T: MatrixType>(
        limits: &Limits,
        rows: usize,
        cols: usize,
        name: Option<&str>,
        data: &[T],
    ) -> MResult<Self> {
        let len = element_count(limits, rows, cols, T::DTYPE)?;
        check_name(limits, name)?;
        if data.len() != len {
            return Err(MError::invalid(format!(
                "{} x {} matrix needs {} elements, got {}",
                rows,
                cols,
                len,
                data.len()
            )));
        }
        let storage = T::into_storage(RawTen::from_slice(data)?);
        Ok(Self::from_parts(rows, cols, name.map(str::to_owned), storage))
    }

    /// Builds a matrix from a native-endian, row-major byte block holding
    /// exactly `rows * cols` elements of `dtype`.
    pub fn from_flat_array(
        rows: usize,
        cols: usize,
        dtype: DType,
        name: Option<&str>,
        bytes: &[u8],
    ) -> MResult<Self> {
        Self::from_flat_array_with(&Limits::default(), rows, cols, dtype, name, bytes)
    }

    pub fn from_flat_array_with(
        limits: &Limits,
        rows: usize,
        cols: usize,
        dtype: DType,
        name: Option<&str>,
        bytes: &[u8],
    ) -> MResult<Self> {
        let len = element_count(limits, rows, cols, dtype)?;
        check_name(limits, name)?;
        let storage = CpuStorage::from_bytes(dtype, len, bytes)?;
        Ok(Self::from_parts(rows, cols, name.map(str::to_owned), storage))
    }

    pub fn identity(n: usize, dtype: DType, name: Option<&str>) -> MResult<Self> {
        fn ones<T: MatrixType>(v: &mut RawTen<T>, n: usize) {
            for (i, x) in v.as_slice_mut().iter_mut().enumerate() {
                if i / n == i % n {
                    *x = T::one();
                }
            }
        }
        let mut m = Self::new(n, n, dtype, name)?;
        match &mut m.storage {
            CpuStorage::I32(v) => ones(v, n),
            CpuStorage::F32(v) => ones(v, n),
            CpuStorage::F64(v) => ones(v, n),
        }
        Ok(m)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut CpuStorage {
        &mut self.storage
    }

    /// Row-major elements, or `None` if `T` is not this matrix's dtype.
    pub fn as_slice<T: MatrixType>(&self) -> Option<&[T]> {
        T::from_storage(&self.storage).map(|v| v.as_slice())
    }

    /// Element `(r, c)`; `None` when out of range or `T` is the wrong dtype.
    pub fn get<T: MatrixType>(&self, r: usize, c: usize) -> Option<T> {
        if r >= self.rows || c >= self.cols {
            return None;
        }
        self.as_slice::<T>().map(|s| s[r * self.cols + c])
    }

    /// Releases data and name. Consuming `self` makes a second free a
    /// compile error rather than a runtime no-op.
    pub fn free(self) {}
}
