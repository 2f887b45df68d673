use super::{check_dimensions, Backward, DropoutConfig, Forward};
use crate::{
    volume::{Dimensions, Volume},
    Error, Result,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Dropout.
///
/// In training, each value is zeroed with the configured probability. In
/// inference, every value is scaled by that probability instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DropoutLayer {
    config: DropoutConfig,
    dimensions: Dimensions,
    dropped: Vec<bool>,
}

impl DropoutLayer {
    /// Creates a dropout layer for inputs of `dimensions`.
    ///
    /// **Errors**
    ///
    /// If the probability is not within [0, 1] or the input is empty.
    pub fn new(dimensions: Dimensions, config: DropoutConfig) -> Result<Self> {
        let p = config.probability;
        if !(0. ..=1.).contains(&p) {
            return Err(Error::InvalidConfig(format!(
                "dropout probability {p} is not within [0, 1]"
            )));
        }
        if p == 0. || p == 1. {
            log::warn!("dropout probability {p} is degenerate");
        }
        if dimensions.size() == 0 {
            return Err(Error::InvalidConfig(format!(
                "dropout dimensions {dimensions} are empty"
            )));
        }
        Ok(Self {
            config,
            dimensions,
            dropped: vec![false; dimensions.size()],
        })
    }
    pub fn config(&self) -> &DropoutConfig {
        &self.config
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.dimensions
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.dimensions
    }
    /// Which values were dropped by the last forward pass.
    pub fn dropped(&self) -> &[bool] {
        &self.dropped
    }
}

impl Forward for DropoutLayer {
    fn forward<R: Rng + ?Sized>(
        &mut self,
        input: &Volume,
        training: bool,
        rng: &mut R,
    ) -> Result<Volume> {
        check_dimensions(self.dimensions, input.dimensions())?;
        let p = self.config.probability;
        let mut output = input.clone_values();
        if training {
            for (y, dropped) in output.values_mut().iter_mut().zip(self.dropped.iter_mut()) {
                *dropped = rng.gen::<f64>() < p;
                if *dropped {
                    *y = 0.;
                }
            }
        } else {
            // scaled by the drop probability, not the keep probability
            output.values_mut().iter_mut().for_each(|y| *y *= p);
            self.dropped.iter_mut().for_each(|dropped| *dropped = false);
        }
        Ok(output)
    }
}

impl Backward for DropoutLayer {
    fn backward(&mut self, input: &mut Volume, output: &Volume) -> Result<()> {
        check_dimensions(self.dimensions, input.dimensions())?;
        check_dimensions(self.dimensions, output.dimensions())?;
        input.zero_grad();
        for ((dx, dy), dropped) in input
            .gradients_mut()
            .iter_mut()
            .zip(output.gradients())
            .zip(self.dropped.iter())
        {
            if !dropped {
                *dx = *dy;
            }
        }
        Ok(())
    }
}
