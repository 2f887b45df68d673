/*!
Layers transform a [`Volume`] in the forward pass and route gradients back to
their input in the backward pass.

Every layer kind is a variant of [`Layer`]. A layer never owns its input or
output activations: the caller (typically a [`Network`](crate::network::Network))
keeps them and hands both back to [`Backward::backward()`]. Trainable layers
own their filters and biases and expose them with [`Parameters`].

# Example
```
use volnet::{
    layer::{Backward, Forward, ReluLayer},
    volume::{Dimensions, Volume},
};
# fn main() -> volnet::Result<()> {
let mut rng = rand::thread_rng();
let mut relu = ReluLayer::new(Dimensions::column(2))?;
let input = Volume::from_values(Dimensions::column(2), vec![-1., 2.])?;
let mut output = relu.forward(&input, false, &mut rng)?;
assert_eq!(output.values(), &[0., 2.]);
output.set_grad_index(1, 1.)?;
let mut input = input;
relu.backward(&mut input, &output)?;
assert_eq!(input.gradients(), &[0., 1.]);
# Ok(())
# }
```
*/
use crate::{
    volume::{Dimensions, Volume},
    Error, Result,
};
use derive_more::Display;
use rand::Rng;
use serde::{Deserialize, Serialize};

mod activation;
pub use activation::{InputLayer, ReluLayer, SigmoidLayer, TanhLayer};

/// Layer configuration.
pub mod builders;
pub use builders::{
    Activation, ConvConfig, DropoutConfig, FullyConnectedConfig, LayerConfig, LayerDef,
    MaxoutConfig, PoolConfig, RegressionConfig, SoftMaxConfig, SvmConfig,
};

mod conv;
pub use conv::ConvLayer;

mod dense;
pub use dense::FullyConnectedLayer;

mod dropout;
pub use dropout::DropoutLayer;

mod loss;
pub use loss::{RegressionLayer, SoftMaxLayer, SvmLayer};

mod maxout;
pub use maxout::MaxoutLayer;

mod pool;
pub use pool::PoolLayer;


/// The kind of a layer.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    #[display(fmt = "input")]
    Input,
    #[display(fmt = "fc")]
    #[serde(rename = "fc")]
    FullyConnected,
    #[display(fmt = "conv")]
    Conv,
    #[display(fmt = "pool")]
    Pool,
    #[display(fmt = "relu")]
    Relu,
    #[display(fmt = "sigmoid")]
    Sigmoid,
    #[display(fmt = "tanh")]
    Tanh,
    #[display(fmt = "dropout")]
    Dropout,
    #[display(fmt = "maxout")]
    Maxout,
    #[display(fmt = "softmax")]
    SoftMax,
    #[display(fmt = "svm")]
    Svm,
    #[display(fmt = "regression")]
    Regression,
}

impl LayerKind {
    /// Whether the kind computes a classification [`Loss`].
    pub fn is_classifier(&self) -> bool {
        matches!(self, Self::SoftMax | Self::Svm)
    }
    /// Whether the kind can terminate a network.
    pub fn is_loss(&self) -> bool {
        self.is_classifier() || *self == Self::Regression
    }
}

/// A trainable parameter of a layer, handed to an optimizer.
///
/// The optimizer updates `values` inplace and resets `gradients` once it has
/// consumed them.
#[derive(Debug)]
pub struct ParameterResponse<'a> {
    pub values: &'a mut [f64],
    pub gradients: &'a mut [f64],
    pub l1_decay_mul: f64,
    pub l2_decay_mul: f64,
}

impl<'a> ParameterResponse<'a> {
    pub(crate) fn new(volume: &'a mut Volume, l1_decay_mul: f64, l2_decay_mul: f64) -> Self {
        let (values, gradients) = volume.values_and_gradients_mut();
        Self {
            values,
            gradients,
            l1_decay_mul,
            l2_decay_mul,
        }
    }
    /// The number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }
    /// Whether there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The forward pass.
pub trait Forward {
    /// Computes the output from `input`.
    ///
    /// `training` selects training behavior (ie dropout), `rng` supplies any
    /// randomness.
    ///
    /// **Errors**
    ///
    /// If `input` does not have the dimensions the layer was built for.
    fn forward<R: Rng + ?Sized>(
        &mut self,
        input: &Volume,
        training: bool,
        rng: &mut R,
    ) -> Result<Volume>;
}

/// The backward pass.
pub trait Backward {
    /// Computes the gradient of `input` from the gradient of `output`.
    ///
    /// `input` and `output` must be the volumes of the most recent
    /// [`.forward()`](Forward::forward). The input gradient is overwritten,
    /// parameter gradients are accumulated.
    ///
    /// **Errors**
    ///
    /// If the layer can not propagate (input and loss layers) or the volumes
    /// do not match the layer.
    fn backward(&mut self, input: &mut Volume, output: &Volume) -> Result<()>;
}

/// Trainable parameters.
pub trait Parameters {
    /// The number of parameters.
    ///
    /// This is the length of [`.parameters()`](Self::parameters()).
    fn parameters_len(&self) -> usize {
        0
    }
    #[doc(hidden)]
    #[allow(unused)]
    fn collect_parameters<'a>(&'a mut self, parameters: &mut Vec<ParameterResponse<'a>>) {}
    /// Enumerates the parameters of the layer.
    fn parameters(&mut self) -> Vec<ParameterResponse> {
        let mut parameters = Vec::with_capacity(self.parameters_len());
        self.collect_parameters(&mut parameters);
        parameters
    }
}

/// A classification loss.
pub trait Loss {
    /// Computes the loss for the true class `label`.
    ///
    /// Sets the gradient of `input`, the volume fed to the last forward pass.
    ///
    /// **Errors**
    ///
    /// If `label` is not a class.
    fn loss(&mut self, input: &mut Volume, label: usize) -> Result<f64>;
}

/// A regression loss.
pub trait RegressionLoss {
    /// Computes the squared error against `targets`, one per output.
    ///
    /// **Errors**
    ///
    /// If the length of `targets` is not the output size.
    fn multi_dimensional_loss(&mut self, input: &mut Volume, targets: &[f64]) -> Result<f64>;
    /// Computes the squared error of output `index` against `value`.
    ///
    /// Only `index` receives a gradient, every other input gradient is zeroed.
    ///
    /// **Errors**
    ///
    /// If `index` is not an output.
    fn dimensional_loss(&mut self, input: &mut Volume, index: usize, value: f64) -> Result<f64>;
}

fn check_dimensions(expected: Dimensions, found: Dimensions) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, found })
    }
}

fn unsupported<T>(operation: &'static str, layer: LayerKind) -> Result<T> {
    Err(Error::Unsupported { operation, layer })
}

/// A layer of any kind.
#[derive(Clone, Debug)]
pub enum Layer {
    Input(InputLayer),
    FullyConnected(FullyConnectedLayer),
    Conv(ConvLayer),
    Pool(PoolLayer),
    Relu(ReluLayer),
    Sigmoid(SigmoidLayer),
    Tanh(TanhLayer),
    Dropout(DropoutLayer),
    Maxout(MaxoutLayer),
    SoftMax(SoftMaxLayer),
    Svm(SvmLayer),
    Regression(RegressionLayer),
}

macro_rules! dispatch {
    ($self:expr, $layer:ident => $e:expr) => {
        match $self {
            Layer::Input($layer) => $e,
            Layer::FullyConnected($layer) => $e,
            Layer::Conv($layer) => $e,
            Layer::Pool($layer) => $e,
            Layer::Relu($layer) => $e,
            Layer::Sigmoid($layer) => $e,
            Layer::Tanh($layer) => $e,
            Layer::Dropout($layer) => $e,
            Layer::Maxout($layer) => $e,
            Layer::SoftMax($layer) => $e,
            Layer::Svm($layer) => $e,
            Layer::Regression($layer) => $e,
        }
    };
}

impl Layer {
    /// Builds a layer from `def`.
    ///
    /// `def.input` must hold the input dimensions. For the input layer,
    /// `def.output` declares the network input.
    ///
    /// **Errors**
    ///
    /// If the configuration is invalid for the input dimensions.
    pub fn new<R: Rng + ?Sized>(def: &LayerDef, rng: &mut R) -> Result<Self> {
        let input = def.input;
        let layer = match &def.config {
            LayerConfig::Input => Self::Input(InputLayer::new(def.output)?),
            LayerConfig::FullyConnected(config) => {
                Self::FullyConnected(FullyConnectedLayer::new(input, config.clone(), rng)?)
            }
            LayerConfig::Conv(config) => Self::Conv(ConvLayer::new(input, config.clone(), rng)?),
            LayerConfig::Pool(config) => Self::Pool(PoolLayer::new(input, config.clone())?),
            LayerConfig::Relu => Self::Relu(ReluLayer::new(input)?),
            LayerConfig::Sigmoid => Self::Sigmoid(SigmoidLayer::new(input)?),
            LayerConfig::Tanh => Self::Tanh(TanhLayer::new(input)?),
            LayerConfig::Dropout(config) => {
                Self::Dropout(DropoutLayer::new(input, config.clone())?)
            }
            LayerConfig::Maxout(config) => Self::Maxout(MaxoutLayer::new(input, config.clone())?),
            LayerConfig::SoftMax(config) => {
                Self::SoftMax(SoftMaxLayer::new(input, config.clone())?)
            }
            LayerConfig::Svm(config) => Self::Svm(SvmLayer::new(input, config.clone())?),
            LayerConfig::Regression(config) => {
                Self::Regression(RegressionLayer::new(input, config.clone())?)
            }
        };
        Ok(layer)
    }
    /// The kind of the layer.
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Input(_) => LayerKind::Input,
            Self::FullyConnected(_) => LayerKind::FullyConnected,
            Self::Conv(_) => LayerKind::Conv,
            Self::Pool(_) => LayerKind::Pool,
            Self::Relu(_) => LayerKind::Relu,
            Self::Sigmoid(_) => LayerKind::Sigmoid,
            Self::Tanh(_) => LayerKind::Tanh,
            Self::Dropout(_) => LayerKind::Dropout,
            Self::Maxout(_) => LayerKind::Maxout,
            Self::SoftMax(_) => LayerKind::SoftMax,
            Self::Svm(_) => LayerKind::Svm,
            Self::Regression(_) => LayerKind::Regression,
        }
    }
    /// The input dimensions.
    pub fn input_dimensions(&self) -> Dimensions {
        dispatch!(self, layer => layer.input_dimensions())
    }
    /// The output dimensions.
    pub fn output_dimensions(&self) -> Dimensions {
        dispatch!(self, layer => layer.output_dimensions())
    }
    /// The classification loss, for softmax and svm layers.
    pub fn as_loss_mut(&mut self) -> Option<&mut dyn Loss> {
        match self {
            Self::SoftMax(layer) => Some(layer as &mut dyn Loss),
            Self::Svm(layer) => Some(layer as &mut dyn Loss),
            _ => None,
        }
    }
    /// The regression loss, for regression layers.
    pub fn as_regression_loss_mut(&mut self) -> Option<&mut dyn RegressionLoss> {
        match self {
            Self::Regression(layer) => Some(layer as &mut dyn RegressionLoss),
            _ => None,
        }
    }
}

impl Forward for Layer {
    fn forward<R: Rng + ?Sized>(
        &mut self,
        input: &Volume,
        training: bool,
        rng: &mut R,
    ) -> Result<Volume> {
        dispatch!(self, layer => layer.forward(input, training, rng))
    }
}

impl Backward for Layer {
    fn backward(&mut self, input: &mut Volume, output: &Volume) -> Result<()> {
        dispatch!(self, layer => layer.backward(input, output))
    }
}

impl Parameters for Layer {
    fn parameters_len(&self) -> usize {
        match self {
            Self::FullyConnected(layer) => layer.parameters_len(),
            Self::Conv(layer) => layer.parameters_len(),
            _ => 0,
        }
    }
    fn collect_parameters<'a>(&'a mut self, parameters: &mut Vec<ParameterResponse<'a>>) {
        match self {
            Self::FullyConnected(layer) => layer.collect_parameters(parameters),
            Self::Conv(layer) => layer.collect_parameters(parameters),
            _ => (),
        }
    }
}
