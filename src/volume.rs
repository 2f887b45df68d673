use crate::{Error, Result};
use derive_more::Display;
use ndarray::{ArrayView3, ArrayViewMut3};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// The width, height and depth of a [`Volume`].
#[derive(
    Clone, Copy, Debug, Default, Display, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[display(fmt = "{}x{}x{}", width, height, depth)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Dimensions {
    /// Creates new dimensions.
    pub const fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
    /// A 1 x 1 x `depth` column, the shape of dense layer outputs.
    pub const fn column(depth: usize) -> Self {
        Self::new(1, 1, depth)
    }
    /// The number of elements.
    pub const fn size(&self) -> usize {
        self.width * self.height * self.depth
    }
    /// Whether (`x`, `y`, `d`) lies inside.
    pub const fn contains(&self, x: usize, y: usize, d: usize) -> bool {
        x < self.width && y < self.height && d < self.depth
    }
    /// The linear index of (`x`, `y`, `d`).
    ///
    /// Depth varies fastest, then x, then y. Does not check bounds, see
    /// [`.checked_index()`](Self::checked_index).
    pub const fn index(&self, x: usize, y: usize, d: usize) -> usize {
        (self.width * y + x) * self.depth + d
    }
    /// The linear index of (`x`, `y`, `d`).
    ///
    /// **Errors**
    ///
    /// If any coordinate is outside of its axis.
    pub fn checked_index(&self, x: usize, y: usize, d: usize) -> Result<usize> {
        if self.contains(x, y, d) {
            Ok(self.index(x, y, d))
        } else {
            Err(Error::PositionOutOfRange {
                x,
                y,
                d,
                dimensions: *self,
            })
        }
    }
}

impl From<(usize, usize, usize)> for Dimensions {
    fn from((width, height, depth): (usize, usize, usize)) -> Self {
        Self::new(width, height, depth)
    }
}

/// A 3 dimensional block of values with a gradient for each value.
///
/// Both arrays are stored flat with the layout given by
/// [`Dimensions::index()`]. Parameters (filters, biases) and activations are
/// both volumes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VolumeData")]
pub struct Volume {
    dimensions: Dimensions,
    values: Vec<f64>,
    gradients: Vec<f64>,
}

#[derive(Deserialize)]
struct VolumeData {
    dimensions: Dimensions,
    values: Vec<f64>,
    gradients: Vec<f64>,
}

impl TryFrom<VolumeData> for Volume {
    type Error = Error;
    fn try_from(data: VolumeData) -> Result<Self> {
        let VolumeData {
            dimensions,
            values,
            gradients,
        } = data;
        for len in [values.len(), gradients.len()] {
            if len != dimensions.size() {
                return Err(Error::LengthMismatch {
                    expected: dimensions.size(),
                    found: len,
                });
            }
        }
        Ok(Self {
            dimensions,
            values,
            gradients,
        })
    }
}

impl Volume {
    /// A volume of zeros.
    pub fn zeros(dimensions: Dimensions) -> Self {
        Self::filled(dimensions, 0.)
    }
    /// A volume with every value set to `value`. Gradients are zero.
    pub fn filled(dimensions: Dimensions, value: f64) -> Self {
        let n = dimensions.size();
        Self {
            dimensions,
            values: vec![value; n],
            gradients: vec![0.; n],
        }
    }
    /// A 1 x 1 x depth volume holding `values`.
    ///
    /// **Errors**
    ///
    /// If `dimensions` is not 1 x 1 x `values.len()`.
    pub fn from_values(dimensions: Dimensions, values: Vec<f64>) -> Result<Self> {
        if dimensions.width != 1 || dimensions.height != 1 {
            return Err(Error::InvalidConfig(format!(
                "explicit values require a width and height of 1, found {dimensions}"
            )));
        }
        if values.len() != dimensions.depth {
            return Err(Error::LengthMismatch {
                expected: dimensions.depth,
                found: values.len(),
            });
        }
        let gradients = vec![0.; values.len()];
        Ok(Self {
            dimensions,
            values,
            gradients,
        })
    }
    /// A volume drawn from a normal distribution with mean 0 and std_dev = sqrt(1 / size).
    pub fn random<R: Rng + ?Sized>(dimensions: Dimensions, rng: &mut R) -> Self {
        let n = dimensions.size();
        let std_dev = (1. / n as f64).sqrt();
        let values = (0..n)
            .map(|_| rng.sample::<f64, _>(StandardNormal) * std_dev)
            .collect();
        Self {
            dimensions,
            values,
            gradients: vec![0.; n],
        }
    }
    /// The dimensions.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
    /// The number of elements.
    pub fn size(&self) -> usize {
        self.values.len()
    }
    fn checked_linear(&self, index: usize) -> Result<usize> {
        if index < self.values.len() {
            Ok(index)
        } else {
            Err(Error::OutOfRange {
                index,
                len: self.values.len(),
            })
        }
    }
    /// The value at (`x`, `y`, `d`).
    pub fn get(&self, x: usize, y: usize, d: usize) -> Result<f64> {
        Ok(self.values[self.dimensions.checked_index(x, y, d)?])
    }
    /// Sets the value at (`x`, `y`, `d`).
    pub fn set(&mut self, x: usize, y: usize, d: usize, value: f64) -> Result<()> {
        let i = self.dimensions.checked_index(x, y, d)?;
        self.values[i] = value;
        Ok(())
    }
    /// Adds `value` to the value at (`x`, `y`, `d`).
    pub fn add(&mut self, x: usize, y: usize, d: usize, value: f64) -> Result<()> {
        let i = self.dimensions.checked_index(x, y, d)?;
        self.values[i] += value;
        Ok(())
    }
    /// Multiplies the value at (`x`, `y`, `d`) by `value`.
    pub fn mul(&mut self, x: usize, y: usize, d: usize, value: f64) -> Result<()> {
        let i = self.dimensions.checked_index(x, y, d)?;
        self.values[i] *= value;
        Ok(())
    }
    /// The value at linear `index`.
    pub fn get_index(&self, index: usize) -> Result<f64> {
        Ok(self.values[self.checked_linear(index)?])
    }
    /// Sets the value at linear `index`.
    pub fn set_index(&mut self, index: usize, value: f64) -> Result<()> {
        let i = self.checked_linear(index)?;
        self.values[i] = value;
        Ok(())
    }
    /// Adds `value` to the value at linear `index`.
    pub fn add_index(&mut self, index: usize, value: f64) -> Result<()> {
        let i = self.checked_linear(index)?;
        self.values[i] += value;
        Ok(())
    }
    /// Multiplies the value at linear `index` by `value`.
    pub fn mul_index(&mut self, index: usize, value: f64) -> Result<()> {
        let i = self.checked_linear(index)?;
        self.values[i] *= value;
        Ok(())
    }
    /// The gradient at (`x`, `y`, `d`).
    pub fn grad(&self, x: usize, y: usize, d: usize) -> Result<f64> {
        Ok(self.gradients[self.dimensions.checked_index(x, y, d)?])
    }
    /// Sets the gradient at (`x`, `y`, `d`).
    pub fn set_grad(&mut self, x: usize, y: usize, d: usize, value: f64) -> Result<()> {
        let i = self.dimensions.checked_index(x, y, d)?;
        self.gradients[i] = value;
        Ok(())
    }
    /// Adds `value` to the gradient at (`x`, `y`, `d`).
    pub fn add_grad(&mut self, x: usize, y: usize, d: usize, value: f64) -> Result<()> {
        let i = self.dimensions.checked_index(x, y, d)?;
        self.gradients[i] += value;
        Ok(())
    }
    /// The gradient at linear `index`.
    pub fn grad_index(&self, index: usize) -> Result<f64> {
        Ok(self.gradients[self.checked_linear(index)?])
    }
    /// Sets the gradient at linear `index`.
    pub fn set_grad_index(&mut self, index: usize, value: f64) -> Result<()> {
        let i = self.checked_linear(index)?;
        self.gradients[i] = value;
        Ok(())
    }
    /// Adds `value` to the gradient at linear `index`.
    pub fn add_grad_index(&mut self, index: usize, value: f64) -> Result<()> {
        let i = self.checked_linear(index)?;
        self.gradients[i] += value;
        Ok(())
    }
    /// Sets all gradients to 0.
    pub fn zero_grad(&mut self) {
        self.gradients.iter_mut().for_each(|g| *g = 0.);
    }
    /// Sets all values to `value`.
    pub fn set_const(&mut self, value: f64) {
        self.values.iter_mut().for_each(|x| *x = value);
    }
    /// A copy of the values with zeroed gradients.
    pub fn clone_values(&self) -> Self {
        Self {
            dimensions: self.dimensions,
            values: self.values.clone(),
            gradients: vec![0.; self.values.len()],
        }
    }
    /// A volume of zeros with the same dimensions.
    pub fn clone_zeroed(&self) -> Self {
        Self::zeros(self.dimensions)
    }
    /// Adds the values of `other` elementwise.
    ///
    /// **Errors**
    ///
    /// If the dimensions differ.
    pub fn add_from(&mut self, other: &Self) -> Result<()> {
        self.add_from_scaled(other, 1.)
    }
    /// Adds the values of `other` multiplied by `scale` elementwise.
    ///
    /// **Errors**
    ///
    /// If the dimensions differ.
    pub fn add_from_scaled(&mut self, other: &Self, scale: f64) -> Result<()> {
        if self.dimensions != other.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                found: other.dimensions,
            });
        }
        for (x, y) in self.values.iter_mut().zip(other.values.iter()) {
            *x += y * scale;
        }
        Ok(())
    }
    /// The values, in linear order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
    /// The values, in linear order.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }
    /// The gradients, in linear order.
    pub fn gradients(&self) -> &[f64] {
        &self.gradients
    }
    /// The gradients, in linear order.
    pub fn gradients_mut(&mut self) -> &mut [f64] {
        &mut self.gradients
    }
    /// Borrows the values and the gradients mutably at the same time.
    pub fn values_and_gradients_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.values, &mut self.gradients)
    }
    fn shape(&self) -> (usize, usize, usize) {
        let Dimensions {
            width,
            height,
            depth,
        } = self.dimensions;
        (height, width, depth)
    }
    /// The values as an array indexed by `[y, x, d]`.
    pub fn as_array(&self) -> Result<ArrayView3<f64>> {
        Ok(ArrayView3::from_shape(self.shape(), &self.values)?)
    }
    /// The values as a mutable array indexed by `[y, x, d]`.
    pub fn as_array_mut(&mut self) -> Result<ArrayViewMut3<f64>> {
        let shape = self.shape();
        Ok(ArrayViewMut3::from_shape(shape, &mut self.values)?)
    }
    /// The gradients as an array indexed by `[y, x, d]`.
    pub fn grad_array(&self) -> Result<ArrayView3<f64>> {
        Ok(ArrayView3::from_shape(self.shape(), &self.gradients)?)
    }
}
