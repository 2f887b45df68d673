use super::{Method, Trainer, TrainerOptions};
use crate::{network::Network, Result};

/// Builder for creating a [`Trainer`].
#[derive(Clone, Debug, Default)]
pub struct TrainerBuilder {
    options: TrainerOptions,
}

impl TrainerBuilder {
    /// Starts from `options` instead of the defaults.
    pub fn from_options(options: TrainerOptions) -> Self {
        Self { options }
    }
    /// The update rule. Default is [`Method::Sgd`].
    pub fn method(mut self, method: Method) -> Self {
        self.options.method = method;
        self
    }
    /// Learning rate. Default is 0.01.
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.options.learning_rate = learning_rate;
        self
    }
    /// L1 and L2 weight decay. Default is 0.
    ///
    /// These are scaled per parameter by the layer's decay multipliers.
    pub fn decay(mut self, l1_decay: f64, l2_decay: f64) -> Self {
        self.options.l1_decay = l1_decay;
        self.options.l2_decay = l2_decay;
        self
    }
    /// The number of training calls per update. Default is 1.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.options.batch_size = batch_size;
        self
    }
    /// Momentum. Default is 0.9.
    ///
    /// Sgd with a momentum of 0 applies the gradient directly.
    pub fn momentum(mut self, momentum: f64) -> Self {
        self.options.momentum = momentum;
        self
    }
    /// Decay rate of the adadelta and windowgrad averages. Default is 0.95.
    pub fn rho(mut self, rho: f64) -> Self {
        self.options.rho = rho;
        self
    }
    /// Conditioning term. Default is 1e-8.
    pub fn eps(mut self, eps: f64) -> Self {
        self.options.eps = eps;
        self
    }
    /// Adam moment decay rates. Default is 0.9 and 0.999.
    pub fn betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.options.beta1 = beta1;
        self.options.beta2 = beta2;
        self
    }
    /// The options built so far.
    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }
    /// Builds the trainer.
    ///
    /// **Errors**
    ///
    /// See [`Trainer::new()`].
    pub fn build(self, network: Network) -> Result<Trainer> {
        Trainer::new(network, self.options)
    }
}
