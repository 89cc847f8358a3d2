use core::ptr::{self, NonNull};
use std::fmt;

use crate::dtype::{DType, MatrixType};
use crate::{MError, MResult};

/// Fixed-size, zero-initialised block of `len` elements.
///
/// Unlike [`crate::RawArray`] this never grows: a matrix gets exactly
/// `rows * cols` slots at construction and keeps them until dropped.
pub struct RawTen<P> {
    ptr: NonNull<P>,
    len: usize,
}

impl<P: MatrixType> RawTen<P> {
    pub(crate) fn zeroed(len: usize) -> MResult<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::<P>::dangling(),
                len: 0,
            });
        }
        use std::alloc::{alloc_zeroed, Layout};
        let layout = Layout::array::<P>(len).map_err(|_| MError::CapacityOverflow)?;
        // all-zero bits are a valid 0 / 0.0 for every MatrixType
        let ptr = unsafe { alloc_zeroed(layout) } as *mut P;
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(MError::Allocation {
                bytes: layout.size(),
            }),
        }
    }

    pub(crate) fn from_slice(src: &[P]) -> MResult<Self> {
        let raw = Self::zeroed(src.len())?;
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), raw.ptr.as_ptr(), src.len()) };
        Ok(raw)
    }

    /// Copies `len` native-endian elements out of an unaligned byte block.
    pub(crate) fn from_bytes(len: usize, bytes: &[u8]) -> MResult<Self> {
        let expected = len
            .checked_mul(std::mem::size_of::<P>())
            .ok_or(MError::CapacityOverflow)?;
        if bytes.len() != expected {
            return Err(MError::invalid(format!(
                "expected {} bytes of {}, got {}",
                expected,
                P::DTYPE,
                bytes.len()
            )));
        }
        let raw = Self::zeroed(len)?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), raw.ptr.as_ptr() as *mut u8, expected)
        };
        Ok(raw)
    }
}

impl<P> RawTen<P> {
    pub fn as_slice(&self) -> &[P] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const P, self.len) }
    }

    pub(crate) fn as_slice_mut(&mut self) -> &mut [P] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<P> Drop for RawTen<P> {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        use std::alloc::{dealloc, Layout};
        // the same layout was accepted by `zeroed`
        if let Ok(layout) = Layout::array::<P>(self.len) {
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) };
        }
        self.len = 0;
    }
}

impl<P: fmt::Debug> fmt::Debug for RawTen<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Row-major element block tagged with its element type.
#[derive(Debug)]
pub enum CpuStorage {
    I32(RawTen<i32>),
    F32(RawTen<f32>),
    F64(RawTen<f64>),
}

impl CpuStorage {
    pub(crate) fn zeros(dtype: DType, len: usize) -> MResult<Self> {
        Ok(match dtype {
            DType::I32 => CpuStorage::I32(RawTen::zeroed(len)?),
            DType::F32 => CpuStorage::F32(RawTen::zeroed(len)?),
            DType::F64 => CpuStorage::F64(RawTen::zeroed(len)?),
        })
    }

    pub(crate) fn from_bytes(dtype: DType, len: usize, bytes: &[u8]) -> MResult<Self> {
        Ok(match dtype {
            DType::I32 => CpuStorage::I32(RawTen::from_bytes(len, bytes)?),
            DType::F32 => CpuStorage::F32(RawTen::from_bytes(len, bytes)?),
            DType::F64 => CpuStorage::F64(RawTen::from_bytes(len, bytes)?),
        })
    }

    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::I32(_) => DType::I32,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CpuStorage::I32(v) => v.len(),
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parses `token` as the storage's element type and writes it at `index`.
    /// Returns false, leaving the slot untouched, on a bad token or index.
    pub(crate) fn parse_at(&mut self, index: usize, token: &str) -> bool {
        fn put<T: MatrixType>(v: &mut RawTen<T>, index: usize, token: &str) -> bool {
            match (v.as_slice_mut().get_mut(index), T::parse_token(token)) {
                (Some(slot), Some(x)) => {
                    *slot = x;
                    true
                }
                _ => false,
            }
        }
        match self {
            CpuStorage::I32(v) => put(v, index, token),
            CpuStorage::F32(v) => put(v, index, token),
            CpuStorage::F64(v) => put(v, index, token),
        }
    }
}
