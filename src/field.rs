//! Labeled two-dimensional arrays.
//!
//! A [`Field2d`] is what producer tasks write and renderers read: a grid of
//! values with a named coordinate axis on each side. Values are stored
//! row-major, so the first dimension indexes rows.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Expected {expected} values for shape {shape:?}, found {found}")]
    Shape {
        shape: (usize, usize),
        expected: usize,
        found: usize,
    },

    #[error("Dimension '{dim}' has no coordinates")]
    Empty { dim: String },

    #[error("Coordinates of dimension '{dim}' are not strictly increasing")]
    Unordered { dim: String },

    #[error("Couldn't decode field.\n{0}")]
    Decode(String),

    #[error("Couldn't encode field.\n{0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field2d {
    /// Variable name, shown nowhere but useful when inspecting artifacts.
    pub name: Option<String>,
    pub units: Option<String>,
    dims: [String; 2],
    coords: [Vec<f64>; 2],
    values: Vec<f64>,
}

impl Field2d {
    /// Creates a field, checking that `values` matches the coordinate lengths
    /// and that both coordinate vectors increase strictly.
    pub fn new(
        dims: (impl Into<String>, impl Into<String>),
        coords: (Vec<f64>, Vec<f64>),
        values: Vec<f64>,
    ) -> Result<Self, FieldError> {
        let field = Self {
            name: None,
            units: None,
            dims: [dims.0.into(), dims.1.into()],
            coords: [coords.0, coords.1],
            values,
        };

        field.validate()?;
        Ok(field)
    }

    /// Fills the grid by evaluating `f(row, col)`.
    pub fn from_fn(
        dims: (impl Into<String>, impl Into<String>),
        coords: (Vec<f64>, Vec<f64>),
        f: impl Fn(usize, usize) -> f64,
    ) -> Result<Self, FieldError> {
        let (rows, cols) = (coords.0.len(), coords.1.len());
        let mut values = Vec::with_capacity(rows * cols);

        for i in 0..rows {
            for j in 0..cols {
                values.push(f(i, j));
            }
        }

        Self::new(dims, coords, values)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    fn validate(&self) -> Result<(), FieldError> {
        for (dim, coords) in self.dims.iter().zip(&self.coords) {
            if coords.is_empty() {
                return Err(FieldError::Empty { dim: dim.clone() });
            }

            if !coords.windows(2).all(|pair| pair[0] < pair[1]) {
                return Err(FieldError::Unordered { dim: dim.clone() });
            }
        }

        let shape = self.shape();
        let expected = shape.0 * shape.1;

        if self.values.len() != expected {
            return Err(FieldError::Shape {
                shape,
                expected,
                found: self.values.len(),
            });
        }

        Ok(())
    }

    /// `(rows, cols)`, the lengths of the first and second dimension.
    pub fn shape(&self) -> (usize, usize) {
        (self.coords[0].len(), self.coords[1].len())
    }

    pub fn dims(&self) -> (&str, &str) {
        (&self.dims[0], &self.dims[1])
    }

    /// Coordinates along `axis` (0 for rows, 1 for columns).
    ///
    /// # Panics
    /// Panics if `axis` is greater than 1.
    pub fn coords(&self, axis: usize) -> &[f64] {
        &self.coords[axis]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let (rows, cols) = self.shape();
        if row >= rows || col >= cols {
            return None;
        }
        Some(self.values[row * cols + col])
    }

    /// Sums out dimension `axis`, returning a distribution along the other
    /// one. Non-finite values are skipped.
    ///
    /// # Panics
    /// Panics if `axis` is greater than 1.
    pub fn sum_over(&self, axis: usize) -> Vec<f64> {
        let (rows, cols) = self.shape();

        match axis {
            0 => (0..cols)
                .map(|j| {
                    (0..rows)
                        .map(|i| self.values[i * cols + j])
                        .filter(|v| v.is_finite())
                        .sum()
                })
                .collect(),
            1 => self
                .values
                .chunks(cols)
                .map(|row| row.iter().filter(|v| v.is_finite()).sum())
                .collect(),
            _ => panic!("Field2d has two axes, got axis {axis}"),
        }
    }

    /// Smallest and largest finite value, `None` when there are none.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Bilinear interpolation at data coordinates `(y, x)`, where `y` runs
    /// along the first dimension. Returns `None` outside the grid.
    pub fn sample(&self, y: f64, x: f64) -> Option<f64> {
        let (i0, i1, ty) = bracket(&self.coords[0], y)?;
        let (j0, j1, tx) = bracket(&self.coords[1], x)?;
        let cols = self.coords[1].len();

        let at = |i: usize, j: usize| self.values[i * cols + j];
        let top = at(i0, j0) * (1.0 - tx) + at(i0, j1) * tx;
        let bottom = at(i1, j0) * (1.0 - tx) + at(i1, j1) * tx;
        let value = top * (1.0 - ty) + bottom * ty;

        value.is_finite().then_some(value)
    }

    pub fn write_cbor(&self, writer: impl Write) -> Result<(), FieldError> {
        ciborium::into_writer(self, writer).map_err(|e| FieldError::Encode(e.to_string()))
    }

    pub fn read_cbor(reader: impl Read) -> Result<Self, FieldError> {
        let field: Self =
            ciborium::from_reader(reader).map_err(|e| FieldError::Decode(e.to_string()))?;
        field.validate()?;
        Ok(field)
    }
}

/// Finds the cell of `coords` that contains `value` and the fractional
/// position within it.
fn bracket(coords: &[f64], value: f64) -> Option<(usize, usize, f64)> {
    let first = *coords.first()?;
    let last = *coords.last()?;

    if !(first..=last).contains(&value) {
        return None;
    }

    if coords.len() == 1 {
        return Some((0, 0, 0.0));
    }

    let upper = coords.partition_point(|&c| c < value).clamp(1, coords.len() - 1);
    let lower = upper - 1;
    let t = (value - coords[lower]) / (coords[upper] - coords[lower]);

    Some((lower, upper, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Field2d {
        // rows: y in [0, 1, 2], cols: x in [0, 10]
        Field2d::new(
            ("y", "x"),
            (vec![0.0, 1.0, 2.0], vec![0.0, 10.0]),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap()
    }

    #[test]
    fn test_shape_mismatch() {
        let err = Field2d::new(("y", "x"), (vec![0.0, 1.0], vec![0.0, 1.0]), vec![1.0; 3])
            .unwrap_err();

        assert!(matches!(
            err,
            FieldError::Shape {
                shape: (2, 2),
                expected: 4,
                found: 3
            }
        ));
    }

    #[test]
    fn test_rejects_unordered_coords() {
        let err = Field2d::new(("y", "x"), (vec![1.0, 0.0], vec![0.0]), vec![1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, FieldError::Unordered { dim } if dim == "y"));
    }

    #[test]
    fn test_rejects_empty_dimension() {
        let err = Field2d::new(("y", "x"), (vec![], vec![0.0]), vec![]).unwrap_err();
        assert!(matches!(err, FieldError::Empty { dim } if dim == "y"));
    }

    #[test]
    fn test_marginals() {
        let field = grid();
        assert_eq!(field.sum_over(0), vec![9.0, 12.0]);
        assert_eq!(field.sum_over(1), vec![3.0, 7.0, 11.0]);
    }

    #[test]
    fn test_sample_corners_and_midpoints() {
        let field = grid();

        assert_eq!(field.sample(0.0, 0.0), Some(1.0));
        assert_eq!(field.sample(2.0, 10.0), Some(6.0));
        assert_eq!(field.sample(0.0, 5.0), Some(1.5));
        assert_eq!(field.sample(0.5, 0.0), Some(2.0));
        assert_eq!(field.sample(3.0, 0.0), None);
        assert_eq!(field.sample(0.0, -1.0), None);
    }

    #[test]
    fn test_min_max_skips_nan() {
        let field = Field2d::new(
            ("y", "x"),
            (vec![0.0], vec![0.0, 1.0, 2.0]),
            vec![f64::NAN, -2.0, 7.0],
        )
        .unwrap();

        assert_eq!(field.min_max(), Some((-2.0, 7.0)));
    }

    #[test]
    fn test_cbor_preserves_metadata() {
        let field = grid().with_name("n_objects").with_units("1");
        let mut buffer = Vec::new();
        field.write_cbor(&mut buffer).unwrap();

        let back = Field2d::read_cbor(buffer.as_slice()).unwrap();
        assert_eq!(back.name.as_deref(), Some("n_objects"));
        assert_eq!(back.dims(), ("y", "x"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Field2d::read_cbor(&b"not cbor at all"[..]),
            Err(FieldError::Decode(_))
        ));
    }
}
