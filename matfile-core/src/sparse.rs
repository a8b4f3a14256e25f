// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compressed-column sparse payloads.
//!
//! Both MAT versions carry sparse matrices, in very different
//! shapes: v5 stores the `ir`/`jc`/data triple as typed elements,
//! while v4 flattens everything into a dense `mrows x ncols` double
//! matrix whose columns are (row+1), (col+1), real and optionally
//! imaginary values, with the matrix shape tucked into the last row.

use crate::error::{MatError, Result};

/// Stored values of a sparse matrix.
#[derive(Clone, Debug, PartialEq)]
pub enum SparseValues {
    Real(Vec<f64>),
    Complex { re: Vec<f64>, im: Vec<f64> },
    Logical(Vec<bool>),
}

impl SparseValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Real(v) => v.len(),
            Self::Complex { re, .. } => re.len(),
            Self::Logical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex { .. })
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Self::Logical(_))
    }
}

/// A compressed-column sparse payload.
///
/// `ir[k]` is the 0-based row of the k-th stored value; `jc` has one
/// entry per column plus one, `jc[c]..jc[c + 1]` indexing the stored
/// values of column `c`.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseData {
    pub nzmax: usize,
    pub ir: Vec<i32>,
    pub jc: Vec<i32>,
    pub values: SparseValues,
}

impl SparseData {
    /// Checks the shared sparse invariants against the owning node's
    /// dimensions.
    pub fn validate(&self, dims: &[usize]) -> Result<()> {
        if dims.len() != 2 {
            return Err(MatError::invalid("sparse array must have rank 2"));
        }
        let (nrows, ncols) = (dims[0], dims[1]);
        let ndata = self.values.len();
        if self.ir.len() != ndata {
            return Err(MatError::invalid(format!(
                "sparse has {} row indices for {} values",
                self.ir.len(),
                ndata
            )));
        }
        if self.nzmax < ndata {
            return Err(MatError::invalid("sparse nzmax smaller than stored data"));
        }
        if self.jc.len() != ncols + 1 {
            return Err(MatError::invalid(format!(
                "sparse jc length {} does not match {} columns",
                self.jc.len(),
                ncols
            )));
        }
        if self.jc.first() != Some(&0) || *self.jc.last().unwrap() as usize != ndata {
            return Err(MatError::invalid("sparse jc endpoints are wrong"));
        }
        if self.jc.windows(2).any(|w| w[1] < w[0]) {
            return Err(MatError::invalid("sparse jc is decreasing"));
        }
        if self.ir.iter().any(|&row| row < 0 || row as usize >= nrows) {
            return Err(MatError::invalid("sparse row index out of bounds"));
        }
        Ok(())
    }

    /// Column index of the k-th stored value.
    pub fn column_of(&self, k: usize) -> usize {
        debug_assert!(k < self.values.len());
        match self.jc.partition_point(|&jc| jc as usize <= k) {
            0 => 0,
            c => c - 1,
        }
    }

    /// Rebuilds a sparse payload from the flat v4 quadruple-column
    /// buffer. Returns the payload and the true matrix dimensions.
    ///
    /// The buffer holds `mrows * ncols` doubles, column-major, with
    /// `ncols` 3 (real) or 4 (complex). The last row carries the
    /// matrix shape rather than a stored value.
    pub fn from_v4_columns(buf: &[f64], mrows: usize, ncols: usize) -> Result<(Self, [usize; 2])> {
        if mrows < 1 || !(3..=4).contains(&ncols) || buf.len() != mrows * ncols {
            return Err(MatError::invalid("malformed v4 sparse record"));
        }
        let nzmax = mrows - 1;
        let nrows = v4_index(buf[mrows - 1])?;
        let ncol = v4_index(buf[2 * mrows - 1])?;

        let mut ir = Vec::new();
        ir.try_reserve_exact(nzmax)?;
        for k in 0..nzmax {
            let row = v4_index(buf[k])?;
            if row < 1 || row > nrows {
                return Err(MatError::invalid("v4 sparse row index out of bounds"));
            }
            ir.push((row - 1) as i32);
        }

        // jc[c] is the first k whose (1-based) column reaches c + 1;
        // the scan leaves jc non-decreasing even when trailing
        // columns are empty.
        let mut columns = Vec::new();
        columns.try_reserve_exact(nzmax)?;
        for k in 0..nzmax {
            let col = v4_index(buf[mrows + k])?;
            if col < 1 || col > ncol {
                return Err(MatError::invalid("v4 sparse column index out of bounds"));
            }
            columns.push(col - 1);
        }
        let mut jc = vec![0i32; ncol + 1];
        let mut k = 0usize;
        for (c, slot) in jc.iter_mut().enumerate() {
            while k < nzmax && columns[k] < c {
                k += 1;
            }
            *slot = k as i32;
        }
        jc[ncol] = nzmax as i32;

        let re = buf[2 * mrows..2 * mrows + nzmax].to_vec();
        let values = if ncols == 4 {
            let im = buf[3 * mrows..3 * mrows + nzmax].to_vec();
            SparseValues::Complex { re, im }
        } else {
            SparseValues::Real(re)
        };

        let data = Self {
            nzmax,
            ir,
            jc,
            values,
        };
        Ok((data, [nrows, ncol]))
    }

    /// Flattens the payload into the v4 quadruple-column layout:
    /// `(ndata + 1) x (3 or 4)` doubles, column-major, with the
    /// matrix shape in the last row.
    pub fn to_v4_columns(&self, dims: &[usize]) -> Result<Vec<f64>> {
        self.validate(dims)?;
        let ndata = self.values.len();
        let mrows = ndata + 1;
        let complex = self.values.is_complex();
        let ncols = if complex { 4 } else { 3 };

        let mut buf = Vec::new();
        buf.try_reserve_exact(mrows * ncols)?;
        buf.resize(mrows * ncols, 0.0);
        for k in 0..ndata {
            buf[k] = (self.ir[k] + 1) as f64;
            buf[mrows + k] = (self.column_of(k) + 1) as f64;
        }
        buf[mrows - 1] = dims[0] as f64;
        buf[2 * mrows - 1] = dims[1] as f64;
        match &self.values {
            SparseValues::Real(v) => buf[2 * mrows..2 * mrows + ndata].copy_from_slice(v),
            SparseValues::Complex { re, im } => {
                buf[2 * mrows..2 * mrows + ndata].copy_from_slice(re);
                buf[3 * mrows..3 * mrows + ndata].copy_from_slice(im);
            }
            SparseValues::Logical(v) => {
                for (slot, &b) in buf[2 * mrows..2 * mrows + ndata].iter_mut().zip(v) {
                    *slot = if b { 1.0 } else { 0.0 };
                }
            }
        }
        Ok(buf)
    }
}

/// Converts a double read from a v4 sparse record into a
/// non-negative index, rejecting values an int cast would mangle.
fn v4_index(value: f64) -> Result<usize> {
    if !value.is_finite() || value < 0.0 || value > i32::MAX as f64 || value.fract() != 0.0 {
        return Err(MatError::invalid(format!(
            "v4 sparse index {value} is not a valid matrix index"
        )));
    }
    Ok(value as usize)
}
