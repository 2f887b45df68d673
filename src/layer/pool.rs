use super::{check_dimensions, conv::Window, Backward, Forward, PoolConfig};
use crate::{
    volume::{Dimensions, Volume},
    Error, Result,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Max pooling, per channel.
///
/// The forward pass records the position of each maximum so that the backward
/// pass can route the output gradient to it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolLayer {
    config: PoolConfig,
    window: Window,
    output: Dimensions,
    /// The winning input (x, y) of each output, in forward order. None if the
    /// window lies entirely in the padding.
    switches: Vec<Option<(usize, usize)>>,
}

impl PoolLayer {
    /// Creates a pool over inputs of `input` dimensions.
    ///
    /// **Errors**
    ///
    /// If the kernel or stride are 0, or the kernel does not fit in the padded
    /// input.
    pub fn new(input: Dimensions, config: PoolConfig) -> Result<Self> {
        if input.size() == 0 {
            return Err(Error::InvalidConfig(format!(
                "pool input dimensions {input} are empty"
            )));
        }
        let window = Window {
            input,
            kernel_width: config.kernel_width,
            kernel_height: config.kernel_height(),
            stride: config.stride,
            padding: config.padding,
        };
        let output = window.output_dimensions(input.depth)?;
        Ok(Self {
            config,
            window,
            output,
            switches: vec![None; output.size()],
        })
    }
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.window.input
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.output
    }
    fn positions(&self) -> impl Iterator<Item = (usize, usize, usize)> {
        let Dimensions {
            width,
            height,
            depth,
        } = self.output;
        (0..depth).flat_map(move |d| {
            (0..height).flat_map(move |ay| (0..width).map(move |ax| (ax, ay, d)))
        })
    }
}

impl Forward for PoolLayer {
    fn forward<R: Rng + ?Sized>(&mut self, input: &Volume, _: bool, _: &mut R) -> Result<Volume> {
        let input_dimensions = self.window.input;
        check_dimensions(input_dimensions, input.dimensions())?;
        let mut output = Volume::zeros(self.output);
        let x = input.values();
        for (n, (ax, ay, d)) in self.positions().enumerate() {
            let mut best: Option<(f64, (usize, usize))> = None;
            for tap in self.window.taps(ax, ay) {
                let v = x[input_dimensions.index(tap.x, tap.y, d)];
                if best.map_or(true, |(a, _)| v > a) {
                    best = Some((v, (tap.x, tap.y)));
                }
            }
            self.switches[n] = best.map(|(_, position)| position);
            let a = best.map_or(0., |(a, _)| a);
            output.values_mut()[self.output.index(ax, ay, d)] = a;
        }
        Ok(output)
    }
}

impl Backward for PoolLayer {
    fn backward(&mut self, input: &mut Volume, output: &Volume) -> Result<()> {
        let input_dimensions = self.window.input;
        check_dimensions(input_dimensions, input.dimensions())?;
        check_dimensions(self.output, output.dimensions())?;
        input.zero_grad();
        let dx = input.gradients_mut();
        let dy = output.gradients();
        for (n, (ax, ay, d)) in self.positions().enumerate() {
            if let Some((x, y)) = self.switches[n] {
                // overlapping windows may route to the same input more than once
                dx[input_dimensions.index(x, y, d)] += dy[self.output.index(ax, ay, d)];
            }
        }
        Ok(())
    }
}
