use super::{check_dimensions, Backward, Forward, MaxoutConfig};
use crate::{
    volume::{Dimensions, Volume},
    Error, Result,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maxout.
///
/// Every group of `group_size` consecutive input channels is reduced to its
/// maximum, so the output depth is the input depth / `group_size`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaxoutLayer {
    config: MaxoutConfig,
    input: Dimensions,
    output: Dimensions,
    /// The winning input channel of each output, in forward order.
    switches: Vec<usize>,
}

impl MaxoutLayer {
    /// Creates a maxout layer for inputs of `input` dimensions.
    ///
    /// **Errors**
    ///
    /// If the group size is 0 or larger than the input depth.
    pub fn new(input: Dimensions, config: MaxoutConfig) -> Result<Self> {
        let group_size = config.group_size;
        if group_size == 0 {
            return Err(Error::InvalidConfig(
                "maxout group size must be positive".to_string(),
            ));
        }
        let output = Dimensions::new(input.width, input.height, input.depth / group_size);
        if output.size() == 0 {
            return Err(Error::InvalidConfig(format!(
                "maxout with group size {group_size} has no outputs for input {input}"
            )));
        }
        Ok(Self {
            config,
            input,
            output,
            switches: vec![0; output.size()],
        })
    }
    pub fn config(&self) -> &MaxoutConfig {
        &self.config
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.input
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.output
    }
}

impl Forward for MaxoutLayer {
    fn forward<R: Rng + ?Sized>(&mut self, input: &Volume, _: bool, _: &mut R) -> Result<Volume> {
        check_dimensions(self.input, input.dimensions())?;
        let group_size = self.config.group_size;
        let mut output = Volume::zeros(self.output);
        let x = input.values();
        let y = output.values_mut();
        let mut n = 0;
        for ay in 0..self.output.height {
            for ax in 0..self.output.width {
                for i in 0..self.output.depth {
                    let first = i * group_size;
                    let base = self.input.index(ax, ay, first);
                    let mut best = (x[base], first);
                    for j in 1..group_size {
                        let v = x[base + j];
                        if v > best.0 {
                            best = (v, first + j);
                        }
                    }
                    y[self.output.index(ax, ay, i)] = best.0;
                    self.switches[n] = best.1;
                    n += 1;
                }
            }
        }
        Ok(output)
    }
}

impl Backward for MaxoutLayer {
    fn backward(&mut self, input: &mut Volume, output: &Volume) -> Result<()> {
        check_dimensions(self.input, input.dimensions())?;
        check_dimensions(self.output, output.dimensions())?;
        input.zero_grad();
        let dx = input.gradients_mut();
        let dy = output.gradients();
        let mut n = 0;
        for ay in 0..self.output.height {
            for ax in 0..self.output.width {
                for i in 0..self.output.depth {
                    dx[self.input.index(ax, ay, self.switches[n])] =
                        dy[self.output.index(ax, ay, i)];
                    n += 1;
                }
            }
        }
        Ok(())
    }
}
