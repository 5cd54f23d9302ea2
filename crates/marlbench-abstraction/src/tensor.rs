//! Dense row-major `f32` tensors.
//!
//! This is deliberately small: the orchestrator only needs to move, slice and
//! stack data. Numerical work belongs to the algorithm collaborators.

use crate::error::{CollaboratorError, Result};
use serde::{Deserialize, Serialize};

/// Dense row-major tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor, checking that `data` matches `shape`.
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(CollaboratorError::Shape(format!(
                "shape {:?} holds {} elements but {} were given",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Creates a tensor filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, 0.0)
    }

    /// Creates a tensor filled with `value`.
    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let len = shape.iter().product();
        Self { shape, data: vec![value; len] }
    }

    /// Creates a zero-dimensional tensor.
    pub fn scalar(value: f32) -> Self {
        Self { shape: Vec::new(), data: vec![value] }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Size of dimension 0.
    pub fn rows(&self) -> Result<usize> {
        self.shape
            .first()
            .copied()
            .ok_or_else(|| CollaboratorError::Shape("zero-dimensional tensor has no rows".to_string()))
    }

    fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Gathers rows along dimension 0.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        let rows = self.rows()?;
        let row_len = self.row_len();
        let mut data = Vec::with_capacity(indices.len() * row_len);
        for &i in indices {
            if i >= rows {
                return Err(CollaboratorError::Shape(format!(
                    "row index {} out of bounds for {} rows",
                    i, rows
                )));
            }
            data.extend_from_slice(&self.data[i * row_len..(i + 1) * row_len]);
        }
        let mut shape = self.shape.clone();
        shape[0] = indices.len();
        Ok(Self { shape, data })
    }

    /// Stacks equally-shaped tensors along a new leading dimension.
    pub fn stack(tensors: &[Tensor]) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| CollaboratorError::Shape("cannot stack zero tensors".to_string()))?;
        let mut data = Vec::with_capacity(first.numel() * tensors.len());
        for t in tensors {
            if t.shape != first.shape {
                return Err(CollaboratorError::Shape(format!(
                    "cannot stack shapes {:?} and {:?}",
                    first.shape, t.shape
                )));
            }
            data.extend_from_slice(&t.data);
        }
        let mut shape = Vec::with_capacity(first.shape.len() + 1);
        shape.push(tensors.len());
        shape.extend_from_slice(&first.shape);
        Ok(Self { shape, data })
    }

    /// Concatenates tensors along dimension 0.
    pub fn concat(tensors: &[Tensor]) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| CollaboratorError::Shape("cannot concatenate zero tensors".to_string()))?;
        first.rows()?;
        let tail = &first.shape[1..];
        let mut rows = 0;
        let mut data = Vec::new();
        for t in tensors {
            if t.shape.is_empty() || &t.shape[1..] != tail {
                return Err(CollaboratorError::Shape(format!(
                    "cannot concatenate shapes {:?} and {:?}",
                    first.shape, t.shape
                )));
            }
            rows += t.shape[0];
            data.extend_from_slice(&t.data);
        }
        let mut shape = first.shape.clone();
        shape[0] = rows;
        Ok(Self { shape, data })
    }

    /// Merges the first `n` dimensions into one. `n == 0` prepends a unit dimension.
    pub fn flatten_leading(&self, n: usize) -> Result<Self> {
        if n > self.shape.len() {
            return Err(CollaboratorError::Shape(format!(
                "cannot flatten {} leading dims of shape {:?}",
                n, self.shape
            )));
        }
        let merged: usize = self.shape[..n].iter().product();
        let mut shape = Vec::with_capacity(self.shape.len() - n + 1);
        shape.push(merged);
        shape.extend_from_slice(&self.shape[n..]);
        Ok(Self { shape, data: self.data.clone() })
    }

    /// Swaps dimensions 0 and 1.
    pub fn swap_leading(&self) -> Result<Self> {
        if self.shape.len() < 2 {
            return Err(CollaboratorError::Shape(format!(
                "cannot swap leading dims of shape {:?}",
                self.shape
            )));
        }
        let (a, b) = (self.shape[0], self.shape[1]);
        let inner: usize = self.shape[2..].iter().product();
        let mut data = Vec::with_capacity(self.data.len());
        for j in 0..b {
            for i in 0..a {
                let start = (i * b + j) * inner;
                data.extend_from_slice(&self.data[start..start + inner]);
            }
        }
        let mut shape = self.shape.clone();
        shape.swap(0, 1);
        Ok(Self { shape, data })
    }

    /// Splits along dimension 0.
    pub fn unbind(&self) -> Result<Vec<Self>> {
        let rows = self.rows()?;
        let row_len = self.row_len();
        let shape = self.shape[1..].to_vec();
        Ok((0..rows)
            .map(|i| Self {
                shape: shape.clone(),
                data: self.data[i * row_len..(i + 1) * row_len].to_vec(),
            })
            .collect())
    }

    /// Elementwise in-place addition.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(CollaboratorError::Shape(format!(
                "cannot add shapes {:?} and {:?}",
                self.shape, other.shape
            )));
        }
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// Mean over all elements, `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| f64::from(v)).sum::<f64>() / self.data.len() as f64
    }

    /// Splits the data into `rows` equal chunks and returns the mean of each.
    pub fn row_means(&self, rows: usize) -> Result<Vec<f64>> {
        if rows == 0 || self.data.len() % rows != 0 || self.data.is_empty() {
            return Err(CollaboratorError::Shape(format!(
                "cannot split {} elements into {} rows",
                self.data.len(),
                rows
            )));
        }
        let chunk = self.data.len() / rows;
        Ok(self
            .data
            .chunks(chunk)
            .map(|c| c.iter().map(|&v| f64::from(v)).sum::<f64>() / chunk as f64)
            .collect())
    }

    /// Sets every element of the rows selected by `mask` to `value`.
    pub fn fill_rows(&mut self, mask: &[bool], value: f32) -> Result<()> {
        let rows = mask.len();
        if rows == 0 || self.data.len() % rows != 0 {
            return Err(CollaboratorError::Shape(format!(
                "cannot split {} elements into {} rows",
                self.data.len(),
                rows
            )));
        }
        let chunk = self.data.len() / rows;
        if chunk == 0 {
            return Ok(());
        }
        for (row, &selected) in self.data.chunks_mut(chunk).zip(mask) {
            if selected {
                row.fill(value);
            }
        }
        Ok(())
    }

    /// Splits the data into `rows` equal chunks and reports whether each holds a non-zero value.
    pub fn any_nonzero_per_row(&self, rows: usize) -> Result<Vec<bool>> {
        if rows == 0 || self.data.len() % rows != 0 {
            return Err(CollaboratorError::Shape(format!(
                "cannot split {} elements into {} rows",
                self.data.len(),
                rows
            )));
        }
        let chunk = self.data.len() / rows;
        if chunk == 0 {
            return Ok(vec![false; rows]);
        }
        Ok(self.data.chunks(chunk).map(|c| c.iter().any(|&v| v != 0.0)).collect())
    }
}
