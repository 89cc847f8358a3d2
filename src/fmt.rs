use std::fmt::{self, Write};

use crate::dtype::MatrixType;
use crate::matrix::Matrix;
use crate::storage::CpuStorage;
use crate::{MError, MResult};

/// `fmt::Write` sink that keeps at most `capacity` bytes but counts every
/// byte offered, so a failed render still knows how much it needed.
struct BoundedWriter {
    buf: String,
    capacity: usize,
    required: usize,
}

impl BoundedWriter {
    fn new(capacity: usize) -> Self {
        Self {
            buf: String::new(),
            capacity,
            required: 0,
        }
    }

    fn finish(self) -> MResult<String> {
        if self.required > self.capacity {
            return Err(MError::Truncation {
                required: self.required,
                capacity: self.capacity,
            });
        }
        Ok(self.buf)
    }
}

impl Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.required += s.len();
        if self.required <= self.capacity {
            self.buf.push_str(s);
        }
        Ok(())
    }
}

fn write_rows<T: MatrixType, W: Write>(data: &[T], cols: usize, w: &mut W) -> fmt::Result {
    for row in data.chunks(cols) {
        for x in row {
            x.write_cell(w)?;
            w.write_char(' ')?;
        }
        w.write_char('\n')?;
    }
    Ok(())
}

fn write_matrix<W: Write>(m: &Matrix, w: &mut W) -> fmt::Result {
    writeln!(
        w,
        "Matrix ({}): {} × {}, type = {}",
        m.name().unwrap_or("NULL"),
        m.rows(),
        m.cols(),
        m.dtype()
    )?;
    w.write_str("Data:\n")?;
    match m.storage() {
        CpuStorage::I32(v) => write_rows(v.as_slice(), m.cols(), w),
        CpuStorage::F32(v) => write_rows(v.as_slice(), m.cols(), w),
        CpuStorage::F64(v) => write_rows(v.as_slice(), m.cols(), w),
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_matrix(self, f)
    }
}

impl Matrix {
    /// Renders the matrix if the text fits in `capacity` bytes.
    ///
    /// Layout:
    ///
    /// ```text
    /// Matrix (<name or NULL>): <rows> × <cols>, type = <int|float|double>
    /// Data:
    /// <cell> <cell> ... \n   (one line per row)
    /// ```
    ///
    /// Cells are right-justified: `%8d` for int, `%10.4f` for float,
    /// `%12.6f` for double, each followed by a single space. On overflow
    /// nothing is returned except [`MError::Truncation`] carrying the full
    /// byte count required.
    pub fn to_text(&self, capacity: usize) -> MResult<String> {
        let mut w = BoundedWriter::new(capacity);
        write_matrix(self, &mut w).map_err(|_| MError::invalid("formatting failed"))?;
        w.finish()
    }

    /// Renders into `dst`, returning the number of bytes written. `dst` is
    /// left untouched on truncation.
    pub fn write_text(&self, dst: &mut [u8]) -> MResult<usize> {
        let text = self.to_text(dst.len())?;
        dst[..text.len()].copy_from_slice(text.as_bytes());
        Ok(text.len())
    }

    /// Exact byte length of the rendered text.
    pub fn text_len(&self) -> usize {
        let mut w = BoundedWriter::new(0);
        let _ = write_matrix(self, &mut w);
        w.required
    }
}
