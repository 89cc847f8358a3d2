//! Text input: `rows cols v00 v01 ...`, whitespace separated, row-major.
//!
//! Tokens are fed one at a time through [`MatrixFill`], which walks
//! `Initial -> RowStep -> ColStep -> MatStep -> Finish`. Any bad token or
//! read error parks it in `Failed` for good.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, trace};

use crate::config::Limits;
use crate::dtype::DType;
use crate::matrix::Matrix;
use crate::{MError, MResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    /// Nothing read yet.
    Initial,
    /// Row count consumed.
    RowStep,
    /// Column count consumed, matrix allocated.
    ColStep,
    /// Reading elements.
    MatStep,
    /// All `rows * cols` elements read.
    Finish,
    Failed,
}

pub struct MatrixFill {
    limits: Limits,
    dtype: DType,
    name: Option<String>,
    state: FillState,
    rows: usize,
    cols: usize,
    filled: usize,
    matrix: Option<Matrix>,
}

impl MatrixFill {
    pub fn new(dtype: DType, name: Option<&str>, limits: &Limits) -> Self {
        Self {
            limits: limits.clone(),
            dtype,
            name: name.map(str::to_owned),
            state: FillState::Initial,
            rows: 0,
            cols: 0,
            filled: 0,
            matrix: None,
        }
    }

    pub fn state(&self) -> FillState {
        self.state
    }

    /// Number of elements written so far.
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn push_token(&mut self, token: &str) -> MResult<()> {
        let res = self.step(token);
        if res.is_err() {
            self.fail();
        }
        res
    }

    /// Moves to `Failed` and drops whatever was allocated.
    pub fn fail(&mut self) {
        if self.state != FillState::Failed {
            debug!("matrix fill failed in state {:?}", self.state);
        }
        self.state = FillState::Failed;
        self.matrix = None;
    }

    pub fn finish(mut self) -> MResult<Matrix> {
        match (self.state, self.matrix.take()) {
            (FillState::Finish, Some(m)) => Ok(m),
            (state, _) => Err(MError::Parse {
                state,
                token: String::new(),
                reason: "unexpected end of input",
            }),
        }
    }

    fn error(&self, token: &str, reason: &'static str) -> MError {
        MError::Parse {
            state: self.state,
            token: token.to_string(),
            reason,
        }
    }

    fn parse_dim(&self, token: &str, max: usize) -> MResult<usize> {
        let n: usize = token
            .parse()
            .map_err(|_| self.error(token, "expected a positive integer"))?;
        if n == 0 {
            return Err(self.error(token, "dimension must be positive"));
        }
        if n > max {
            return Err(self.error(token, "dimension exceeds configured maximum"));
        }
        Ok(n)
    }

    fn step(&mut self, token: &str) -> MResult<()> {
        match self.state {
            FillState::Initial => {
                self.rows = self.parse_dim(token, self.limits.max_rows)?;
                self.state = FillState::RowStep;
            }
            FillState::RowStep => {
                self.cols = self.parse_dim(token, self.limits.max_cols)?;
                let m = Matrix::new_with(
                    &self.limits,
                    self.rows,
                    self.cols,
                    self.dtype,
                    self.name.as_deref(),
                )?;
                debug!("allocated {} x {} {} matrix", self.rows, self.cols, self.dtype);
                self.matrix = Some(m);
                self.state = FillState::ColStep;
            }
            FillState::ColStep | FillState::MatStep => {
                let ok = match self.matrix.as_mut() {
                    Some(m) => m.storage_mut().parse_at(self.filled, token),
                    None => false,
                };
                if !ok {
                    return Err(self.error(token, "not a valid element"));
                }
                self.filled += 1;
                self.state = if self.filled == self.rows * self.cols {
                    FillState::Finish
                } else {
                    FillState::MatStep
                };
            }
            FillState::Finish => return Err(self.error(token, "trailing data after last element")),
            FillState::Failed => return Err(self.error(token, "fill already failed")),
        }
        Ok(())
    }
}

/// Reads one matrix from `reader`, line by line.
pub fn read_matrix<R: BufRead>(
    reader: R,
    dtype: DType,
    name: Option<&str>,
    limits: &Limits,
) -> MResult<Matrix> {
    let mut fill = MatrixFill::new(dtype, name, limits);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                fill.fail();
                return Err(e.into());
            }
        };
        for token in line.split_whitespace() {
            fill.push_token(token)?;
        }
    }
    fill.finish()
}

/// Display name for a matrix file: the file name without its last
/// extension (`matrix/A.txt` -> `A`, `a.b.txt` -> `a.b`).
pub fn name_from_path<P: AsRef<Path>>(path: P, limits: &Limits) -> MResult<String> {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .ok_or_else(|| MError::invalid(format!("no file name in {:?}", path)))?;
    let stem = stem
        .to_str()
        .ok_or_else(|| MError::invalid(format!("file name of {:?} is not UTF-8", path)))?;
    if stem.len() > limits.max_name_len {
        return Err(MError::invalid(format!(
            "name {:?} longer than {} bytes",
            stem, limits.max_name_len
        )));
    }
    Ok(stem.to_string())
}

pub fn load_matrix<P: AsRef<Path>>(path: P, dtype: DType, limits: &Limits) -> MResult<Matrix> {
    let path = path.as_ref();
    let name = name_from_path(path, limits)?;
    trace!("loading {:?} as {}", path, dtype);
    let file = File::open(path)?;
    read_matrix(BufReader::new(file), dtype, Some(&name), limits)
}
