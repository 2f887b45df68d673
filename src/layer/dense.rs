use super::{
    check_dimensions, Backward, Forward, FullyConnectedConfig, ParameterResponse, Parameters,
};
use crate::{
    volume::{Dimensions, Volume},
    Error, Result,
};
use ndarray::ArrayView1;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fully connected layer.
///
/// Each output neuron has a filter spanning the flattened input, and a bias.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FullyConnectedLayer {
    config: FullyConnectedConfig,
    input: Dimensions,
    output: Dimensions,
    filters: Vec<Volume>,
    biases: Volume,
}

impl FullyConnectedLayer {
    /// Creates a fully connected layer over inputs of `input` dimensions.
    ///
    /// Filters are drawn with [`Volume::random()`], biases are set to
    /// `config.bias`.
    ///
    /// **Errors**
    ///
    /// If there are no neurons or the input is empty.
    pub fn new<R: Rng + ?Sized>(
        input: Dimensions,
        config: FullyConnectedConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if config.neurons == 0 {
            return Err(Error::InvalidConfig(
                "fc neuron count must be positive".to_string(),
            ));
        }
        if input.size() == 0 {
            return Err(Error::InvalidConfig(format!(
                "fc input dimensions {input} are empty"
            )));
        }
        let output = Dimensions::column(config.neurons);
        let filters = (0..config.neurons)
            .map(|_| Volume::random(Dimensions::column(input.size()), rng))
            .collect();
        let biases = Volume::filled(output, config.bias);
        Ok(Self {
            config,
            input,
            output,
            filters,
            biases,
        })
    }
    pub fn config(&self) -> &FullyConnectedConfig {
        &self.config
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.input
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.output
    }
    /// The filters, one per neuron.
    pub fn filters(&self) -> &[Volume] {
        &self.filters
    }
    pub fn filters_mut(&mut self) -> &mut [Volume] {
        &mut self.filters
    }
    /// The biases, one per neuron.
    pub fn biases(&self) -> &Volume {
        &self.biases
    }
    pub fn biases_mut(&mut self) -> &mut Volume {
        &mut self.biases
    }
}

impl Forward for FullyConnectedLayer {
    fn forward<R: Rng + ?Sized>(&mut self, input: &Volume, _: bool, _: &mut R) -> Result<Volume> {
        check_dimensions(self.input, input.dimensions())?;
        let x = ArrayView1::from(input.values());
        let y = self
            .filters
            .iter()
            .zip(self.biases.values())
            .map(|(filter, bias)| ArrayView1::from(filter.values()).dot(&x) + bias)
            .collect();
        Volume::from_values(self.output, y)
    }
}

impl Backward for FullyConnectedLayer {
    fn backward(&mut self, input: &mut Volume, output: &Volume) -> Result<()> {
        check_dimensions(self.input, input.dimensions())?;
        check_dimensions(self.output, output.dimensions())?;
        input.zero_grad();
        let (x, dx) = input.values_and_gradients_mut();
        let db = self.biases.gradients_mut();
        for ((filter, chain_grad), db) in self
            .filters
            .iter_mut()
            .zip(output.gradients())
            .zip(db.iter_mut())
        {
            let (w, dw) = filter.values_and_gradients_mut();
            for ((dx, dw), (x, w)) in dx.iter_mut().zip(dw.iter_mut()).zip(x.iter().zip(w.iter())) {
                *dx += w * chain_grad;
                *dw += x * chain_grad;
            }
            *db += chain_grad;
        }
        Ok(())
    }
}

impl Parameters for FullyConnectedLayer {
    fn parameters_len(&self) -> usize {
        self.filters.len() + 1
    }
    fn collect_parameters<'a>(&'a mut self, parameters: &mut Vec<ParameterResponse<'a>>) {
        let FullyConnectedConfig {
            l1_decay_mul,
            l2_decay_mul,
            ..
        } = self.config;
        for filter in self.filters.iter_mut() {
            parameters.push(ParameterResponse::new(filter, l1_decay_mul, l2_decay_mul));
        }
        // biases are never decayed
        parameters.push(ParameterResponse::new(&mut self.biases, 0., 0.));
    }
}
