use std::ops::Mul;

use crate::dtype::MatrixType;
use crate::matrix::Matrix;
use crate::storage::CpuStorage;
use crate::{MError, MResult};

/// Binary kernel run once per dtype over row-major operands.
trait Map2 {
    fn f<T: MatrixType>(
        &self,
        lhs: &[T],
        lhs_d: (usize, usize),
        rhs: &[T],
        rhs_d: (usize, usize),
        dst: &mut [T],
    );

    fn map(
        &self,
        lhs: &CpuStorage,
        lhs_d: (usize, usize),
        rhs: &CpuStorage,
        rhs_d: (usize, usize),
        dst: &mut CpuStorage,
    ) -> MResult<()> {
        match (lhs, rhs, dst) {
            (CpuStorage::I32(a), CpuStorage::I32(b), CpuStorage::I32(d)) => {
                self.f(a.as_slice(), lhs_d, b.as_slice(), rhs_d, d.as_slice_mut())
            }
            (CpuStorage::F32(a), CpuStorage::F32(b), CpuStorage::F32(d)) => {
                self.f(a.as_slice(), lhs_d, b.as_slice(), rhs_d, d.as_slice_mut())
            }
            (CpuStorage::F64(a), CpuStorage::F64(b), CpuStorage::F64(d)) => {
                self.f(a.as_slice(), lhs_d, b.as_slice(), rhs_d, d.as_slice_mut())
            }
            (a, b, _) => {
                return Err(MError::TypeMismatch {
                    lhs: a.dtype(),
                    rhs: b.dtype(),
                })
            }
        }
        Ok(())
    }
}

struct MatMul;

impl Map2 for MatMul {
    fn f<T: MatrixType>(
        &self,
        lhs: &[T],
        lhs_d: (usize, usize),
        rhs: &[T],
        rhs_d: (usize, usize),
        dst: &mut [T],
    ) {
        let (m, n) = lhs_d;
        let (_, p) = rhs_d;
        // i, j, k order: float sums must match the naive reference bit for bit
        for i in 0..m {
            let row = &lhs[i * n..(i + 1) * n];
            for j in 0..p {
                let mut sum = T::zero();
                for (k, &a) in row.iter().enumerate() {
                    sum = T::mul_acc(sum, a, rhs[k * p + j]);
                }
                dst[i * p + j] = sum;
            }
        }
    }
}

/// `a.name ++ b.name`, absent names counting as empty; an empty result
/// is itself absent.
fn concat_names(a: Option<&str>, b: Option<&str>) -> Option<String> {
    let name = format!("{}{}", a.unwrap_or(""), b.unwrap_or(""));
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

pub fn matmul(a: &Matrix, b: &Matrix) -> MResult<Matrix> {
    if a.dtype() != b.dtype() {
        return Err(MError::TypeMismatch {
            lhs: a.dtype(),
            rhs: b.dtype(),
        });
    }
    if a.cols() != b.rows() {
        return Err(MError::DimensionMismatch {
            lhs: a.shape(),
            rhs: b.shape(),
        });
    }
    let len = a
        .rows()
        .checked_mul(b.cols())
        .ok_or(MError::CapacityOverflow)?;
    let mut dst = CpuStorage::zeros(a.dtype(), len)?;
    MatMul.map(a.storage(), a.shape(), b.storage(), b.shape(), &mut dst)?;
    Ok(Matrix::from_parts(
        a.rows(),
        b.cols(),
        concat_names(a.name(), b.name()),
        dst,
    ))
}

impl Matrix {
    /// `self × rhs` as a new matrix; both operands are left untouched.
    pub fn matmul(&self, rhs: &Matrix) -> MResult<Matrix> {
        matmul(self, rhs)
    }
}

impl Mul<&Matrix> for &Matrix {
    type Output = MResult<Matrix>;

    fn mul(self, rhs: &Matrix) -> Self::Output {
        matmul(self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn test_matmul_int() {
        let a = Matrix::from_slice(2, 3, Some("m1"), &[1i32, 2, 3, 4, 5, 6]).unwrap();
        let b = Matrix::from_slice(3, 2, Some("m2"), &[1i32, 4, 2, 5, 3, 6]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), (2, 2));
        assert_eq!(c.dtype(), DType::I32);
        assert_eq!(c.name(), Some("m1m2"));
        assert_eq!(c.as_slice::<i32>().unwrap(), &[14, 32, 32, 77]);
    }

    #[test]
    fn test_matmul_identity() {
        let data = [5.0f64, 6.0, 7.0, 8.0];
        let a = Matrix::from_slice(2, 2, Some("A"), &data).unwrap();
        let i = Matrix::identity(2, DType::F64, Some("I")).unwrap();
        let c = (&a * &i).unwrap();
        assert_eq!(c.name(), Some("AI"));
        assert_eq!(c.as_slice::<f64>().unwrap(), &data);

        let data = [3i32, -1, 0, 9, 2, 2];
        let a = Matrix::from_slice(2, 3, None, &data).unwrap();
        let i = Matrix::identity(3, DType::I32, None).unwrap();
        assert_eq!(a.matmul(&i).unwrap().as_slice::<i32>().unwrap(), &data);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = Matrix::from_slice(2, 3, Some("m1"), &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Matrix::from_slice(2, 2, Some("m2"), &[1.0f64, 4.0, 2.0, 5.0]).unwrap();
        match a.matmul(&b) {
            Err(MError::DimensionMismatch { lhs, rhs }) => {
                assert_eq!(lhs, (2, 3));
                assert_eq!(rhs, (2, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(a.as_slice::<f64>().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(b.name(), Some("m2"));
        a.free();
        b.free();
    }

    #[test]
    fn test_type_checked_before_dims() {
        let a = Matrix::new(2, 3, DType::I32, None).unwrap();
        let b = Matrix::new(2, 2, DType::F32, None).unwrap();
        assert!(matches!(
            a.matmul(&b),
            Err(MError::TypeMismatch {
                lhs: DType::I32,
                rhs: DType::F32
            })
        ));
    }

    #[test]
    fn test_large_numbers() {
        let a = Matrix::from_slice(2, 2, None, &[1000000.0f64, -200000.0, 0.0001, 999999.0]).unwrap();
        let b = Matrix::from_slice(2, 2, None, &[0.5f64, 2.0, 1.0, -0.5]).unwrap();
        let c = a.matmul(&b).unwrap();
        let exp = [300000.0, 2100000.0, 999999.00005, -499999.4998];
        for (got, exp) in c.as_slice::<f64>().unwrap().iter().zip(exp) {
            assert!((got - exp).abs() < 1e-5, "{} != {}", got, exp);
        }
    }

    #[test]
    fn test_int_wraps() {
        let a = Matrix::from_slice(1, 2, None, &[i32::MAX, 2]).unwrap();
        let b = Matrix::from_slice(2, 1, None, &[1i32, 1]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.get::<i32>(0, 0), Some(i32::MAX.wrapping_add(2)));
    }

    #[test]
    fn test_float_summation_order() {
        let lhs: Vec<f32> = (0..12).map(|v| 1.0 / (v as f32 + 0.3)).collect();
        let rhs: Vec<f32> = (0..12).map(|v| (v as f32 * 1.7).sin() * 1e3).collect();
        let a = Matrix::from_slice(3, 4, None, &lhs).unwrap();
        let b = Matrix::from_slice(4, 3, None, &rhs).unwrap();
        let c = a.matmul(&b).unwrap();
        let got = c.as_slice::<f32>().unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let mut sum = 0.0f32;
                for k in 0..4 {
                    sum += lhs[i * 4 + k] * rhs[k * 3 + j];
                }
                assert_eq!(got[i * 3 + j].to_bits(), sum.to_bits());
            }
        }
    }

    #[test]
    fn test_result_names() {
        assert_eq!(concat_names(Some("a"), None), Some("a".to_string()));
        assert_eq!(concat_names(None, Some("b")), Some("b".to_string()));
        assert_eq!(concat_names(None, None), None);
        assert_eq!(concat_names(Some(""), Some("")), None);

        let a = Matrix::new(1, 1, DType::F32, None).unwrap();
        let b = Matrix::new(1, 1, DType::F32, None).unwrap();
        assert_eq!(a.matmul(&b).unwrap().name(), None);
    }
}
