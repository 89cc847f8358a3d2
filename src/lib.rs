mod array;
pub mod config;
mod dtype;
mod error;
mod fmt;
pub mod loader;
mod matrix;
mod op;
mod storage;

pub use crate::array::{next_power_of_two, Array, RawArray};
pub use crate::config::Limits;
pub use crate::dtype::{DType, MatrixType};
pub use crate::error::{MError, MResult};
pub use crate::loader::{load_matrix, name_from_path, read_matrix, FillState, MatrixFill};
pub use crate::matrix::Matrix;
pub use crate::op::matmul;
pub use crate::storage::{CpuStorage, RawTen};

#[macro_export]
macro_rules! mat {
    ($name:expr; $([$($x:expr),* $(,)*]),+ $(,)*) => {{
        let rows: &[&[_]] = &[$(&[$($x,)*],)*];
        let cols = rows[0].len();
        let flat: Vec<_> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        if rows.iter().any(|r| r.len() != cols) {
            Err($crate::MError::InvalidArgument("ragged rows".to_string()))
        } else {
            $crate::Matrix::from_slice(rows.len(), cols, $name, &flat)
        }
    }};
}
