use super::LayerKind;
use crate::volume::Dimensions;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Fully connected layer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullyConnectedConfig {
    pub neurons: usize,
    #[serde(default)]
    pub l1_decay_mul: f64,
    #[serde(default = "one")]
    pub l2_decay_mul: f64,
    #[serde(default)]
    pub bias: f64,
}

fn one() -> f64 {
    1.
}

impl FullyConnectedConfig {
    /// Creates a config with `neurons` outputs.
    ///
    /// Defaults:
    /// - l1_decay_mul: 0
    /// - l2_decay_mul: 1
    /// - bias: 0
    pub fn new(neurons: usize) -> Self {
        Self {
            neurons,
            l1_decay_mul: 0.,
            l2_decay_mul: 1.,
            bias: 0.,
        }
    }
    /// Sets the L1 and L2 decay multipliers of the filters.
    pub fn with_decay(self, l1_decay_mul: f64, l2_decay_mul: f64) -> Self {
        Self {
            l1_decay_mul,
            l2_decay_mul,
            ..self
        }
    }
    /// Sets the initial bias.
    pub fn with_bias(self, bias: f64) -> Self {
        Self { bias, ..self }
    }
}

/// Convolution layer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvConfig {
    pub filters: usize,
    pub kernel_width: usize,
    /// 0 uses `kernel_width`.
    #[serde(default)]
    pub kernel_height: usize,
    #[serde(default = "one_usize")]
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
    #[serde(default)]
    pub l1_decay_mul: f64,
    #[serde(default = "one")]
    pub l2_decay_mul: f64,
    #[serde(default)]
    pub bias: f64,
}

fn one_usize() -> usize {
    1
}

impl ConvConfig {
    /// Creates a config with `filters` square `kernel` x `kernel` filters.
    ///
    /// Defaults:
    /// - stride: 1
    /// - padding: 0
    /// - l1_decay_mul: 0
    /// - l2_decay_mul: 1
    /// - bias: 0
    pub fn new(filters: usize, kernel: usize) -> Self {
        Self {
            filters,
            kernel_width: kernel,
            kernel_height: 0,
            stride: 1,
            padding: 0,
            l1_decay_mul: 0.,
            l2_decay_mul: 1.,
            bias: 0.,
        }
    }
    /// Sets a kernel height different from the width.
    pub fn with_kernel_height(self, kernel_height: usize) -> Self {
        Self {
            kernel_height,
            ..self
        }
    }
    /// Sets the stride.
    pub fn with_stride(self, stride: usize) -> Self {
        Self { stride, ..self }
    }
    /// Sets the implicit zero padding on each side.
    pub fn with_padding(self, padding: usize) -> Self {
        Self { padding, ..self }
    }
    /// Sets the L1 and L2 decay multipliers of the filters.
    pub fn with_decay(self, l1_decay_mul: f64, l2_decay_mul: f64) -> Self {
        Self {
            l1_decay_mul,
            l2_decay_mul,
            ..self
        }
    }
    /// Sets the initial bias.
    pub fn with_bias(self, bias: f64) -> Self {
        Self { bias, ..self }
    }
    /// The kernel height, falling back to the width when unset.
    pub fn kernel_height(&self) -> usize {
        if self.kernel_height == 0 {
            self.kernel_width
        } else {
            self.kernel_height
        }
    }
}

/// Max pool layer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub kernel_width: usize,
    /// 0 uses `kernel_width`.
    #[serde(default)]
    pub kernel_height: usize,
    #[serde(default = "two")]
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
}

fn two() -> usize {
    2
}

impl PoolConfig {
    /// Creates a config for a square `kernel` x `kernel` window.
    ///
    /// Defaults:
    /// - stride: 2
    /// - padding: 0
    pub fn new(kernel: usize) -> Self {
        Self {
            kernel_width: kernel,
            kernel_height: 0,
            stride: 2,
            padding: 0,
        }
    }
    /// Sets a kernel height different from the width.
    pub fn with_kernel_height(self, kernel_height: usize) -> Self {
        Self {
            kernel_height,
            ..self
        }
    }
    /// Sets the stride.
    pub fn with_stride(self, stride: usize) -> Self {
        Self { stride, ..self }
    }
    /// Sets the padding on each side.
    pub fn with_padding(self, padding: usize) -> Self {
        Self { padding, ..self }
    }
    /// The kernel height, falling back to the width when unset.
    pub fn kernel_height(&self) -> usize {
        if self.kernel_height == 0 {
            self.kernel_width
        } else {
            self.kernel_height
        }
    }
}

/// Dropout layer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropoutConfig {
    /// Values drawn below this probability are dropped.
    pub probability: f64,
}

impl DropoutConfig {
    /// The default drop probability.
    pub const DEFAULT_PROBABILITY: f64 = 0.5;

    pub fn new(probability: f64) -> Self {
        Self { probability }
    }
}

impl Default for DropoutConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROBABILITY)
    }
}

/// Maxout layer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaxoutConfig {
    /// The number of input channels reduced to one output channel.
    pub group_size: usize,
}

impl MaxoutConfig {
    pub fn new(group_size: usize) -> Self {
        Self { group_size }
    }
}

impl Default for MaxoutConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Softmax classifier configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoftMaxConfig {
    pub classes: usize,
}

impl SoftMaxConfig {
    pub fn new(classes: usize) -> Self {
        Self { classes }
    }
}

/// SVM classifier configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SvmConfig {
    pub classes: usize,
}

impl SvmConfig {
    pub fn new(classes: usize) -> Self {
        Self { classes }
    }
}

/// Regression configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    pub neurons: usize,
}

impl RegressionConfig {
    pub fn new(neurons: usize) -> Self {
        Self { neurons }
    }
}

/// The per kind configuration of a [`LayerDef`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerConfig {
    Input,
    #[serde(rename = "fc")]
    FullyConnected(FullyConnectedConfig),
    Conv(ConvConfig),
    Pool(PoolConfig),
    Relu,
    Sigmoid,
    Tanh,
    Dropout(DropoutConfig),
    Maxout(MaxoutConfig),
    SoftMax(SoftMaxConfig),
    Svm(SvmConfig),
    Regression(RegressionConfig),
}

impl LayerConfig {
    /// The kind of layer configured.
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Input => LayerKind::Input,
            Self::FullyConnected(_) => LayerKind::FullyConnected,
            Self::Conv(_) => LayerKind::Conv,
            Self::Pool(_) => LayerKind::Pool,
            Self::Relu => LayerKind::Relu,
            Self::Sigmoid => LayerKind::Sigmoid,
            Self::Tanh => LayerKind::Tanh,
            Self::Dropout(_) => LayerKind::Dropout,
            Self::Maxout(_) => LayerKind::Maxout,
            Self::SoftMax(_) => LayerKind::SoftMax,
            Self::Svm(_) => LayerKind::Svm,
            Self::Regression(_) => LayerKind::Regression,
        }
    }
}

macro_rules! impl_layer_config_from {
    ($($config:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$config> for LayerConfig {
                fn from(config: $config) -> Self {
                    Self::$variant(config)
                }
            }
        )*
    };
}

impl_layer_config_from! {
    FullyConnectedConfig => FullyConnected,
    ConvConfig => Conv,
    PoolConfig => Pool,
    DropoutConfig => Dropout,
    MaxoutConfig => Maxout,
    SoftMaxConfig => SoftMax,
    SvmConfig => Svm,
    RegressionConfig => Regression,
}

/// An activation appended after a layer by
/// [`activate_layers()`](crate::network::activate_layers).
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[display(fmt = "relu")]
    Relu,
    #[display(fmt = "sigmoid")]
    Sigmoid,
    #[display(fmt = "tanh")]
    Tanh,
    #[display(fmt = "maxout")]
    Maxout,
}

/// The definition of a layer in a network.
///
/// `input` is filled in during network assembly from the previous layer.
/// `output` is only read for the input layer, where it declares the shape of
/// the network input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDef {
    #[serde(flatten)]
    pub config: LayerConfig,
    #[serde(default)]
    pub input: Dimensions,
    #[serde(default)]
    pub output: Dimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<Activation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropout: Option<DropoutConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxout: Option<MaxoutConfig>,
}

impl LayerDef {
    /// A definition for `config`.
    pub fn new(config: impl Into<LayerConfig>) -> Self {
        Self {
            config: config.into(),
            input: Dimensions::default(),
            output: Dimensions::default(),
            activation: None,
            dropout: None,
            maxout: None,
        }
    }
    /// An input layer accepting volumes of `dimensions`.
    pub fn input(dimensions: Dimensions) -> Self {
        Self {
            output: dimensions,
            ..Self::new(LayerConfig::Input)
        }
    }
    /// The kind of layer defined.
    pub fn kind(&self) -> LayerKind {
        self.config.kind()
    }
    /// Appends `activation` after the layer.
    pub fn with_activation(self, activation: Activation) -> Self {
        Self {
            activation: Some(activation),
            ..self
        }
    }
    /// Appends a dropout layer dropping with `probability`.
    pub fn with_dropout(self, probability: f64) -> Self {
        Self {
            dropout: Some(DropoutConfig::new(probability)),
            ..self
        }
    }
    /// Sets the group size of a maxout activation.
    pub fn with_maxout(self, group_size: usize) -> Self {
        Self {
            maxout: Some(MaxoutConfig::new(group_size)),
            ..self
        }
    }
}
