/*!
# Example
A small classifier:
```
use volnet::{
    layer::{Activation, FullyConnectedConfig, LayerDef, SoftMaxConfig},
    network::Network,
    volume::{Dimensions, Volume},
};
# fn main() -> volnet::Result<()> {
let mut network = Network::with_seed(
    vec![
        LayerDef::input(Dimensions::column(2)),
        LayerDef::new(FullyConnectedConfig::new(8)).with_activation(Activation::Relu),
        LayerDef::new(SoftMaxConfig::new(3)),
    ],
    0,
)?;
let input = Volume::from_values(Dimensions::column(2), vec![0.5, -1.])?;
let probabilities = network.forward(input, false)?;
assert_eq!(probabilities.size(), 3);
let class = network.prediction()?;
assert!(class < 3);
# Ok(())
# }
```
*/
use crate::{
    layer::{
        Activation, Backward, Forward, FullyConnectedConfig, Layer, LayerConfig, LayerDef,
        LayerKind, ParameterResponse, Parameters, RegressionLoss,
    },
    volume::{Dimensions, Volume},
    Error, Result,
};
use rand::{rngs::StdRng, SeedableRng};

#[cfg(test)]
mod tests;

/// The bias given to fully connected and conv layers followed by a relu, so
/// that units start active.
pub const RELU_BIAS: f64 = 0.1;

/// Expands a declarative layer list.
///
/// - Softmax, svm and regression layers are preceded by a fully connected
///   layer with one neuron per class / output.
/// - Activations are appended as layers after the layer that requests them,
///   followed by dropout if requested. A maxout activation uses the maxout
///   group size of the definition, or 2.
/// - Fully connected and conv layers activated by a relu have a zero bias
///   raised to [`RELU_BIAS`].
///
/// The activation, dropout and maxout options are consumed. The head layers
/// are not marked as expanded, so `defs` must be a declarative list: expanding
/// an expanded list inserts another fully connected layer before each head.
/// [`Network`] constructors expand their definitions, so save the declarative
/// list rather than the expanded one.
pub fn activate_layers(defs: Vec<LayerDef>) -> Vec<LayerDef> {
    let mut expanded = Vec::with_capacity(defs.len() * 2);
    for mut def in defs {
        let implicit_neurons = match &def.config {
            LayerConfig::SoftMax(config) => Some(config.classes),
            LayerConfig::Svm(config) => Some(config.classes),
            LayerConfig::Regression(config) => Some(config.neurons),
            _ => None,
        };
        if let Some(neurons) = implicit_neurons {
            expanded.push(LayerDef::new(FullyConnectedConfig::new(neurons)));
        }
        let activation = def.activation.take();
        let dropout = def.dropout.take();
        let maxout = def.maxout.take();
        if activation == Some(Activation::Relu) {
            // an explicit bias is kept
            match &mut def.config {
                LayerConfig::FullyConnected(config) if config.bias == 0. => {
                    config.bias = RELU_BIAS
                }
                LayerConfig::Conv(config) if config.bias == 0. => config.bias = RELU_BIAS,
                _ => (),
            }
        }
        expanded.push(def);
        if let Some(activation) = activation {
            let config = match activation {
                Activation::Relu => LayerConfig::Relu,
                Activation::Sigmoid => LayerConfig::Sigmoid,
                Activation::Tanh => LayerConfig::Tanh,
                Activation::Maxout => LayerConfig::Maxout(maxout.unwrap_or_default()),
            };
            expanded.push(LayerDef::new(config));
        }
        if let Some(dropout) = dropout {
            expanded.push(LayerDef::new(dropout));
        }
    }
    expanded
}

fn validate(defs: &[LayerDef]) -> Result<()> {
    if defs.len() < 3 {
        return Err(Error::InvalidNetwork(format!(
            "at least one input and one loss layer are required, found {} layers",
            defs.len()
        )));
    }
    if defs[0].kind() != LayerKind::Input {
        return Err(Error::InvalidNetwork(format!(
            "the first layer must be the input layer, found {}",
            defs[0].kind()
        )));
    }
    let last = defs[defs.len() - 1].kind();
    if !last.is_loss() {
        return Err(Error::InvalidNetwork(format!(
            "the last layer must be a loss layer, found {last}"
        )));
    }
    for def in &defs[1..defs.len() - 1] {
        let kind = def.kind();
        if kind == LayerKind::Input || kind.is_loss() {
            return Err(Error::InvalidNetwork(format!(
                "{kind} layers can only be at the start or end of a network"
            )));
        }
    }
    Ok(())
}

/// A neural network, a pipeline of [`Layer`]'s.
///
/// The network owns the activations of the last forward pass, one volume per
/// layer boundary, so that the backward pass can hand each layer its input and
/// output.
#[derive(Clone, Debug)]
pub struct Network {
    layers: Vec<Layer>,
    /// The input followed by the output of each layer.
    activations: Vec<Volume>,
    rng: StdRng,
}

impl Network {
    /// Assembles a network from `defs`, seeding the random source from entropy.
    ///
    /// See [`.with_rng()`](Self::with_rng).
    pub fn new(defs: Vec<LayerDef>) -> Result<Self> {
        Self::with_rng(defs, StdRng::from_entropy())
    }
    /// Assembles a network from `defs` with a deterministic random source.
    ///
    /// See [`.with_rng()`](Self::with_rng).
    pub fn with_seed(defs: Vec<LayerDef>, seed: u64) -> Result<Self> {
        Self::with_rng(defs, StdRng::seed_from_u64(seed))
    }
    /// Assembles a network from `defs`.
    ///
    /// The list is expanded with [`activate_layers()`]. Each layer takes the
    /// output dimensions of the previous layer as its input. `rng` initializes
    /// the parameters and is kept for dropout.
    ///
    /// **Errors**
    ///
    /// - There are fewer than 3 definitions.
    /// - The first definition is not an input layer.
    /// - The last definition is not a softmax, svm or regression layer, or one
    ///   of them (or an input layer) appears elsewhere.
    /// - A layer can not be built, see [`Layer::new()`].
    pub fn with_rng(defs: Vec<LayerDef>, mut rng: StdRng) -> Result<Self> {
        validate(&defs)?;
        let defs = activate_layers(defs);
        let mut layers = Vec::with_capacity(defs.len());
        let mut dimensions = Dimensions::default();
        for mut def in defs {
            def.input = if def.kind() == LayerKind::Input {
                def.output
            } else {
                dimensions
            };
            let layer = Layer::new(&def, &mut rng)?;
            dimensions = layer.output_dimensions();
            layers.push(layer);
        }
        let mut network = Self {
            layers,
            activations: Vec::new(),
            rng,
        };
        if log::log_enabled!(log::Level::Debug) {
            let kinds = network
                .layers
                .iter()
                .map(|layer| format!("{}({})", layer.kind(), layer.output_dimensions()))
                .collect::<Vec<_>>()
                .join(" -> ");
            let parameters: usize = network.parameters().iter().map(|p| p.len()).sum();
            log::debug!(
                "assembled network of {} layers with {parameters} parameters: {kinds}",
                network.layers.len()
            );
        }
        Ok(network)
    }
    /// The number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }
    /// Whether there are no layers. Always false for an assembled network.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
    /// The layers, after expansion.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
    /// The layers, after expansion.
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }
    /// The dimensions of the input layer.
    pub fn input_dimensions(&self) -> Dimensions {
        self.layers[0].output_dimensions()
    }
    /// The dimensions of the output.
    pub fn output_dimensions(&self) -> Dimensions {
        self.last().output_dimensions()
    }
    /// Whether the last layer is a regression layer.
    pub fn is_regression(&self) -> bool {
        self.last().kind() == LayerKind::Regression
    }
    fn last(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }
    /// The output of the last forward pass.
    pub fn output(&self) -> Option<&Volume> {
        if self.activations.len() == self.layers.len() + 1 {
            self.activations.last()
        } else {
            None
        }
    }
    /// Runs `input` through every layer in order.
    ///
    /// Each layer receives the output of the previous layer. `training` enables
    /// dropout.
    ///
    /// **Errors**
    ///
    /// If `input` does not match the input layer.
    pub fn forward(&mut self, input: Volume, training: bool) -> Result<&Volume> {
        let Self {
            layers,
            activations,
            rng,
        } = self;
        activations.clear();
        activations.push(input);
        for (i, layer) in layers.iter_mut().enumerate() {
            let output = layer.forward(&activations[i], training, rng)?;
            activations.push(output);
        }
        Ok(&activations[activations.len() - 1])
    }
    fn check_forwarded(&self) -> Result<()> {
        if self.activations.len() == self.layers.len() + 1 {
            Ok(())
        } else {
            Err(Error::MissingForward)
        }
    }
    /// The input of the last layer, where losses write their gradient.
    fn loss_input(&mut self) -> Result<(&mut Layer, &mut Volume)> {
        self.check_forwarded()?;
        let n = self.layers.len();
        Ok((&mut self.layers[n - 1], &mut self.activations[n - 1]))
    }
    /// Backward pass through the hidden layers, last to first.
    ///
    /// Stops before the input layer, which has nothing to propagate to.
    fn propagate(&mut self) -> Result<()> {
        for i in (1..self.layers.len() - 1).rev() {
            let (inputs, outputs) = self.activations.split_at_mut(i + 1);
            self.layers[i].backward(&mut inputs[i], &outputs[0])?;
        }
        Ok(())
    }
    fn classification_loss(&mut self, label: usize) -> Result<f64> {
        let (layer, input) = self.loss_input()?;
        let kind = layer.kind();
        match layer.as_loss_mut() {
            Some(loss) => loss.loss(input, label),
            None => Err(Error::Unsupported {
                operation: "classification loss",
                layer: kind,
            }),
        }
    }
    /// Computes the classification loss of the last forward pass and
    /// propagates it back through the network.
    ///
    /// Returns the loss.
    ///
    /// **Errors**
    ///
    /// - The last layer is not a softmax or svm layer.
    /// - `label` is not a class.
    /// - There has been no forward pass.
    pub fn backward(&mut self, label: usize) -> Result<f64> {
        let loss = self.classification_loss(label)?;
        self.propagate()?;
        Ok(loss)
    }
    /// Runs an inference forward pass and returns the classification loss,
    /// without propagating.
    ///
    /// **Errors**
    ///
    /// See [`.forward()`](Self::forward) and [`.backward()`](Self::backward).
    pub fn cost_loss(&mut self, input: Volume, label: usize) -> Result<f64> {
        self.forward(input, false)?;
        self.classification_loss(label)
    }
    fn regression_loss(
        &mut self,
        f: impl FnOnce(&mut dyn RegressionLoss, &mut Volume) -> Result<f64>,
    ) -> Result<f64> {
        let loss = {
            let (layer, input) = self.loss_input()?;
            let kind = layer.kind();
            match layer.as_regression_loss_mut() {
                Some(loss) => f(loss, input)?,
                None => {
                    return Err(Error::Unsupported {
                        operation: "regression loss",
                        layer: kind,
                    })
                }
            }
        };
        self.propagate()?;
        Ok(loss)
    }
    /// Computes the regression loss of the last forward pass against `targets`
    /// and propagates it back through the network.
    ///
    /// **Errors**
    ///
    /// - The last layer is not a regression layer.
    /// - The length of `targets` is not the output size.
    /// - There has been no forward pass.
    pub fn multi_dimensional_loss(&mut self, targets: &[f64]) -> Result<f64> {
        self.regression_loss(|loss, input| loss.multi_dimensional_loss(input, targets))
    }
    /// Computes the regression loss of output `index` against `value` and
    /// propagates it back through the network.
    ///
    /// **Errors**
    ///
    /// - The last layer is not a regression layer.
    /// - `index` is not an output.
    /// - There has been no forward pass.
    pub fn dimensional_loss(&mut self, index: usize, value: f64) -> Result<f64> {
        self.regression_loss(|loss, input| loss.dimensional_loss(input, index, value))
    }
    /// The most probable class of the last forward pass.
    ///
    /// **Errors**
    ///
    /// - The last layer is not a softmax layer.
    /// - There has been no forward pass.
    pub fn prediction(&self) -> Result<usize> {
        self.check_forwarded()?;
        match self.last() {
            Layer::SoftMax(softmax) => softmax.prediction().ok_or(Error::MissingForward),
            layer => Err(Error::Unsupported {
                operation: "prediction",
                layer: layer.kind(),
            }),
        }
    }
}

impl Parameters for Network {
    fn parameters_len(&self) -> usize {
        self.layers.iter().map(Parameters::parameters_len).sum()
    }
    fn collect_parameters<'a>(&'a mut self, parameters: &mut Vec<ParameterResponse<'a>>) {
        for layer in self.layers.iter_mut() {
            layer.collect_parameters(parameters);
        }
    }
}

