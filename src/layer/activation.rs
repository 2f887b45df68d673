use super::{check_dimensions, unsupported, Backward, Forward, LayerKind};
use crate::{
    volume::{Dimensions, Volume},
    Error, Result,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

fn non_empty(dimensions: Dimensions, kind: LayerKind) -> Result<Dimensions> {
    if dimensions.size() == 0 {
        Err(Error::InvalidConfig(format!(
            "{kind} layer dimensions {dimensions} are empty"
        )))
    } else {
        Ok(dimensions)
    }
}

/// The first layer of a network, declaring the input dimensions.
///
/// Passes the input through unchanged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputLayer {
    dimensions: Dimensions,
}

impl InputLayer {
    /// An input layer for volumes of `dimensions`.
    pub fn new(dimensions: Dimensions) -> Result<Self> {
        let dimensions = non_empty(dimensions, LayerKind::Input)?;
        Ok(Self { dimensions })
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.dimensions
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.dimensions
    }
}

impl Forward for InputLayer {
    fn forward<R: Rng + ?Sized>(&mut self, input: &Volume, _: bool, _: &mut R) -> Result<Volume> {
        check_dimensions(self.dimensions, input.dimensions())?;
        Ok(input.clone_values())
    }
}

impl Backward for InputLayer {
    fn backward(&mut self, _: &mut Volume, _: &Volume) -> Result<()> {
        unsupported("backward", LayerKind::Input)
    }
}

fn map_forward(
    dimensions: Dimensions,
    input: &Volume,
    f: impl Fn(f64) -> f64,
) -> Result<Volume> {
    check_dimensions(dimensions, input.dimensions())?;
    let mut output = input.clone_values();
    output.values_mut().iter_mut().for_each(|x| *x = f(*x));
    Ok(output)
}

/// Sets dx = dy * f'(y), with the derivative expressed in terms of the output y.
fn map_backward(
    dimensions: Dimensions,
    input: &mut Volume,
    output: &Volume,
    df: impl Fn(f64) -> f64,
) -> Result<()> {
    check_dimensions(dimensions, input.dimensions())?;
    check_dimensions(dimensions, output.dimensions())?;
    input.zero_grad();
    for ((dx, y), dy) in input
        .gradients_mut()
        .iter_mut()
        .zip(output.values())
        .zip(output.gradients())
    {
        *dx = dy * df(*y);
    }
    Ok(())
}

macro_rules! elementwise_layer {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $f:expr, $df:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Serialize, Deserialize)]
        pub struct $name {
            dimensions: Dimensions,
        }

        impl $name {
            /// Creates the layer for inputs of `dimensions`.
            pub fn new(dimensions: Dimensions) -> Result<Self> {
                let dimensions = non_empty(dimensions, LayerKind::$kind)?;
                Ok(Self { dimensions })
            }
            pub fn input_dimensions(&self) -> Dimensions {
                self.dimensions
            }
            pub fn output_dimensions(&self) -> Dimensions {
                self.dimensions
            }
        }

        impl Forward for $name {
            fn forward<R: Rng + ?Sized>(
                &mut self,
                input: &Volume,
                _: bool,
                _: &mut R,
            ) -> Result<Volume> {
                map_forward(self.dimensions, input, $f)
            }
        }

        impl Backward for $name {
            fn backward(&mut self, input: &mut Volume, output: &Volume) -> Result<()> {
                map_backward(self.dimensions, input, output, $df)
            }
        }
    };
}

elementwise_layer! {
    /// Rectified linear unit, max(0, x).
    ReluLayer,
    Relu,
    |x: f64| x.max(0.),
    |y: f64| if y > 0. { 1. } else { 0. }
}

elementwise_layer! {
    /// Logistic sigmoid, 1 / (1 + e^-x).
    SigmoidLayer,
    Sigmoid,
    |x: f64| 1. / (1. + (-x).exp()),
    |y: f64| y * (1. - y)
}

elementwise_layer! {
    /// Hyperbolic tangent.
    TanhLayer,
    Tanh,
    f64::tanh,
    |y: f64| 1. - y * y
}
