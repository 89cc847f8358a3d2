use std::io;

use thiserror::Error;

use crate::dtype::DType;
use crate::loader::FillState;

pub type MResult<T> = Result<T, MError>;

#[derive(Error, Debug)]
pub enum MError {
    #[error("allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("capacity overflow")]
    CapacityOverflow,
    #[error("dimension mismatch: {lhs:?} x {rhs:?}")]
    DimensionMismatch {
        lhs: (usize, usize),
        rhs: (usize, usize),
    },
    #[error("type mismatch: {lhs} x {rhs}")]
    TypeMismatch { lhs: DType, rhs: DType },
    #[error("text needs {required} bytes, capacity is {capacity}")]
    Truncation { required: usize, capacity: usize },
    #[error("parse error in state {state:?} at token {token:?}: {reason}")]
    Parse {
        state: FillState,
        token: String,
        reason: &'static str,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl MError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MError::InvalidArgument(msg.into())
    }
}

impl From<serde_json::Error> for MError {
    fn from(e: serde_json::Error) -> Self {
        MError::Config(e.to_string())
    }
}
