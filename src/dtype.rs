use std::fmt;
use std::str::FromStr;

use num_traits::Num;

use crate::storage::{CpuStorage, RawTen};
use crate::MError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    I32,
    F32,
    F64,
}

impl DType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::I32 => std::mem::size_of::<i32>(),
            DType::F32 => std::mem::size_of::<f32>(),
            DType::F64 => std::mem::size_of::<f64>(),
        }
    }

    /// Name printed in the `type = ...` part of the text header.
    pub fn name(&self) -> &'static str {
        match self {
            DType::I32 => "int",
            DType::F32 => "float",
            DType::F64 => "double",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = MError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int" | "i32" => Ok(DType::I32),
            "float" | "f32" => Ok(DType::F32),
            "double" | "f64" => Ok(DType::F64),
            _ => Err(MError::invalid(format!("unknown element type '{}'", s))),
        }
    }
}

/// Scalar types a matrix can hold.
///
/// Every consumer that dispatches over [`CpuStorage`] goes through this
/// trait, so adding a dtype means adding one impl here and one storage
/// variant.
pub trait MatrixType: Copy + PartialEq + fmt::Debug + Num + 'static {
    const DTYPE: DType;

    /// Right-justified field width used by the text renderer.
    const WIDTH: usize;

    /// `acc + a * b` in the arithmetic of the type.
    fn mul_acc(acc: Self, a: Self, b: Self) -> Self;

    fn write_cell<W: fmt::Write>(&self, w: &mut W) -> fmt::Result;

    fn parse_token(token: &str) -> Option<Self> {
        <Self as Num>::from_str_radix(token, 10).ok()
    }

    fn from_storage(s: &CpuStorage) -> Option<&RawTen<Self>>;

    fn into_storage(raw: RawTen<Self>) -> CpuStorage;
}

macro_rules! impl_int_type {
    ($t:ident, $d:ident, $w:expr) => {
        impl MatrixType for $t {
            const DTYPE: DType = DType::$d;
            const WIDTH: usize = $w;

            #[inline]
            fn mul_acc(acc: $t, a: $t, b: $t) -> $t {
                acc.wrapping_add(a.wrapping_mul(b))
            }

            fn write_cell<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
                write!(w, "{:>width$}", self, width = Self::WIDTH)
            }

            fn from_storage(s: &CpuStorage) -> Option<&RawTen<$t>> {
                match s {
                    CpuStorage::$d(v) => Some(v),
                    _ => None,
                }
            }

            fn into_storage(raw: RawTen<$t>) -> CpuStorage {
                CpuStorage::$d(raw)
            }
        }
    };
}

macro_rules! impl_float_type {
    ($t:ident, $d:ident, $w:expr, $p:expr) => {
        impl MatrixType for $t {
            const DTYPE: DType = DType::$d;
            const WIDTH: usize = $w;

            #[inline]
            fn mul_acc(acc: $t, a: $t, b: $t) -> $t {
                acc + a * b
            }

            fn write_cell<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
                // printf spelling, Rust would print "NaN"
                if self.is_nan() {
                    return write!(w, "{:>width$}", "nan", width = Self::WIDTH);
                }
                write!(w, "{:>width$.prec$}", self, width = Self::WIDTH, prec = $p)
            }

            fn from_storage(s: &CpuStorage) -> Option<&RawTen<$t>> {
                match s {
                    CpuStorage::$d(v) => Some(v),
                    _ => None,
                }
            }

            fn into_storage(raw: RawTen<$t>) -> CpuStorage {
                CpuStorage::$d(raw)
            }
        }
    };
}

impl_int_type!(i32, I32, 8);
impl_float_type!(f32, F32, 10, 4);
impl_float_type!(f64, F64, 12, 6);
