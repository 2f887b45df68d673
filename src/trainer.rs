use crate::{
    layer::{ParameterResponse, Parameters},
    network::Network,
    volume::Volume,
    Error, Result,
};
use derive_more::Display;
use ndarray::{ArrayView1, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Trainer builders.
pub mod builders;
pub use builders::TrainerBuilder;


/// The parameter update rule.
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Stochastic gradient descent, with momentum if `momentum` > 0.
    #[default]
    #[display(fmt = "sgd")]
    Sgd,
    #[display(fmt = "adam")]
    Adam,
    #[display(fmt = "adagrad")]
    Adagrad,
    #[display(fmt = "adadelta")]
    Adadelta,
    /// Adagrad over a moving window, weighted by `rho`.
    #[display(fmt = "windowgrad")]
    Windowgrad,
    #[display(fmt = "nesterov")]
    Nesterov,
}

impl Method {
    /// Whether the method keeps a second accumulator per parameter.
    fn is_second_order(&self) -> bool {
        matches!(self, Self::Adam | Self::Adadelta)
    }
}

/// Trainer options.
///
/// See [`TrainerBuilder`] for the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerOptions {
    pub method: Method,
    pub learning_rate: f64,
    pub l1_decay: f64,
    pub l2_decay: f64,
    /// The number of [`.train()`](Trainer::train) calls accumulated per update.
    pub batch_size: usize,
    /// Used by sgd and nesterov.
    pub momentum: f64,
    /// Used by adadelta and windowgrad.
    pub rho: f64,
    pub eps: f64,
    /// Used by adam.
    pub beta1: f64,
    /// Used by adam.
    pub beta2: f64,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            method: Method::Sgd,
            learning_rate: 0.01,
            l1_decay: 0.,
            l2_decay: 0.,
            batch_size: 1,
            momentum: 0.9,
            rho: 0.95,
            eps: 1e-8,
            beta1: 0.9,
            beta2: 0.999,
        }
    }
}

impl TrainerOptions {
    fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::InvalidConfig(message));
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return invalid(format!(
                "learning_rate {} must be positive",
                self.learning_rate
            ));
        }
        if !(self.l1_decay >= 0. && self.l2_decay >= 0.) {
            return invalid(format!(
                "decays ({}, {}) must not be negative",
                self.l1_decay, self.l2_decay
            ));
        }
        if !(self.momentum >= 0. && self.momentum < 1.) {
            return invalid(format!("momentum {} is not within [0, 1)", self.momentum));
        }
        for (name, value) in [
            ("rho", self.rho),
            ("beta1", self.beta1),
            ("beta2", self.beta2),
        ] {
            if !(0. ..=1.).contains(&value) {
                return invalid(format!("{name} {value} is not within [0, 1]"));
            }
        }
        if !(self.eps >= 0.) {
            return invalid(format!("eps {} must not be negative", self.eps));
        }
        Ok(())
    }
}

/// The result of [`Trainer::train()`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingResults {
    pub forward_time: Duration,
    /// The time spent in the loss function, including the backward pass.
    pub backward_time: Duration,
    /// 0 unless the call updated the parameters.
    pub l1_decay_loss: f64,
    /// 0 unless the call updated the parameters.
    pub l2_decay_loss: f64,
    /// The loss returned by the loss function.
    pub cost_loss: f64,
    pub total_loss: f64,
}

/// A loss function computing the classification loss for `label`.
///
/// See [`Network::backward()`].
pub fn labeled_loss(label: usize) -> impl FnOnce(&mut Network) -> Result<f64> {
    move |network: &mut Network| network.backward(label)
}

/// A loss function computing the regression loss against `targets`.
///
/// See [`Network::multi_dimensional_loss()`].
pub fn regression_loss(targets: &[f64]) -> impl FnOnce(&mut Network) -> Result<f64> + '_ {
    move |network: &mut Network| network.multi_dimensional_loss(targets)
}

/// Trains a [`Network`].
///
/// Gradients accumulate over `batch_size` calls to [`.train()`](Self::train),
/// then every parameter is updated with the configured [`Method`] and the
/// gradients are reset.
#[derive(Clone, Debug)]
pub struct Trainer {
    network: Network,
    options: TrainerOptions,
    k: usize,
    /// First accumulator per parameter, allocated on the first update.
    gsum: Vec<Vec<f64>>,
    /// Second accumulator per parameter, empty unless adam or adadelta.
    xsum: Vec<Vec<f64>>,
    regression: bool,
}

impl Trainer {
    /// Creates a trainer for `network`.
    ///
    /// **Errors**
    ///
    /// - `batch_size` is 0.
    /// - `learning_rate` is not positive.
    /// - A decay, `momentum`, `rho`, `beta1`, `beta2` or `eps` is out of range.
    pub fn new(network: Network, options: TrainerOptions) -> Result<Self> {
        options.validate()?;
        let regression = network.is_regression();
        log::debug!(
            "trainer: {} with learning rate {}, batch size {}, {} parameters",
            options.method,
            options.learning_rate,
            options.batch_size,
            network.parameters_len(),
        );
        Ok(Self {
            network,
            options,
            k: 0,
            gsum: Vec::new(),
            xsum: Vec::new(),
            regression,
        })
    }
    /// A builder for creating a [`Trainer`].
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }
    /// The network.
    pub fn network(&self) -> &Network {
        &self.network
    }
    /// The network.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }
    /// Returns the network.
    pub fn into_network(self) -> Network {
        self.network
    }
    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }
    /// The number of [`.train()`](Self::train) calls.
    pub fn iteration(&self) -> usize {
        self.k
    }
    /// Whether the network ends with a regression layer, and so expects a
    /// [`regression_loss()`] rather than a [`labeled_loss()`].
    pub fn is_regression(&self) -> bool {
        self.regression
    }
    /// Trains on `input`.
    ///
    /// Runs a training forward pass, then `loss_fn`, which computes the loss
    /// and propagates it back through the network (see [`labeled_loss()`] and
    /// [`regression_loss()`]). Every `batch_size` calls the parameters are
    /// updated.
    ///
    /// **Errors**
    ///
    /// Returns the error of the forward pass or `loss_fn`. The iteration is
    /// not counted.
    pub fn train<F>(&mut self, input: Volume, loss_fn: F) -> Result<TrainingResults>
    where
        F: FnOnce(&mut Network) -> Result<f64>,
    {
        let start = Instant::now();
        self.network.forward(input, true)?;
        let forward_time = start.elapsed();
        let start = Instant::now();
        let cost_loss = loss_fn(&mut self.network)?;
        let backward_time = start.elapsed();
        self.k += 1;
        let (l1_decay_loss, l2_decay_loss) = if self.k % self.options.batch_size == 0 {
            self.update()
        } else {
            (0., 0.)
        };
        Ok(TrainingResults {
            forward_time,
            backward_time,
            l1_decay_loss,
            l2_decay_loss,
            cost_loss,
            total_loss: cost_loss + l1_decay_loss + l2_decay_loss,
        })
    }
    /// Updates every parameter, returning the l1 and l2 decay losses.
    fn update(&mut self) -> (f64, f64) {
        let Self {
            network,
            options,
            k,
            gsum,
            xsum,
            ..
        } = self;
        let mut parameters = network.parameters();
        if gsum.is_empty() {
            let second_order = options.method.is_second_order();
            for parameter in parameters.iter() {
                gsum.push(vec![0.; parameter.len()]);
                xsum.push(if second_order {
                    vec![0.; parameter.len()]
                } else {
                    Vec::new()
                });
            }
        }
        let mut l1_decay_loss = 0.;
        let mut l2_decay_loss = 0.;
        for ((parameter, gsum), xsum) in parameters
            .iter_mut()
            .zip(gsum.iter_mut())
            .zip(xsum.iter_mut())
        {
            let (l1, l2) = batch_gradient(options, parameter);
            l1_decay_loss += l1;
            l2_decay_loss += l2;
            update_parameter(options, *k, parameter, gsum, xsum);
            parameter.gradients.iter_mut().for_each(|g| *g = 0.);
        }
        log::trace!(
            "update {}: l1 decay loss {l1_decay_loss}, l2 decay loss {l2_decay_loss}",
            k
        );
        (l1_decay_loss, l2_decay_loss)
    }
}

/// Replaces the accumulated gradient with the decayed batch gradient.
///
/// Returns the l1 and l2 decay losses.
fn batch_gradient(options: &TrainerOptions, parameter: &mut ParameterResponse) -> (f64, f64) {
    let l1_decay = options.l1_decay * parameter.l1_decay_mul;
    let l2_decay = options.l2_decay * parameter.l2_decay_mul;
    let batch_size = options.batch_size as f64;
    let mut l1_decay_loss = 0.;
    let mut l2_decay_loss = 0.;
    for (w, g) in parameter.values.iter().zip(parameter.gradients.iter_mut()) {
        l2_decay_loss += l2_decay * w * w / 2.;
        l1_decay_loss += l1_decay * w.abs();
        let l1_grad = if *w <= 0. { -l1_decay } else { l1_decay };
        let l2_grad = l2_decay * w;
        *g = (l2_grad + l1_grad + *g) / batch_size;
    }
    (l1_decay_loss, l2_decay_loss)
}

fn update_parameter(
    options: &TrainerOptions,
    k: usize,
    parameter: &mut ParameterResponse,
    gsum: &mut [f64],
    xsum: &mut [f64],
) {
    let TrainerOptions {
        method,
        learning_rate: lr,
        momentum,
        rho,
        eps,
        beta1,
        beta2,
        ..
    } = *options;
    let w = ArrayViewMut1::from(&mut *parameter.values);
    let dw = ArrayView1::from(&*parameter.gradients);
    let v = ArrayViewMut1::from(gsum);
    match method {
        Method::Sgd if momentum > 0. => {
            Zip::from(w).and(dw).and(v).for_each(|w, dw, v| {
                kernels::sgd_update_with_momentum(w, *dw, lr, momentum, v)
            });
        }
        Method::Sgd => {
            Zip::from(w)
                .and(dw)
                .for_each(|w, dw| kernels::sgd_update(w, *dw, lr));
        }
        Method::Adagrad => {
            Zip::from(w)
                .and(dw)
                .and(v)
                .for_each(|w, dw, v| kernels::adagrad_update(w, *dw, lr, eps, v));
        }
        Method::Windowgrad => {
            Zip::from(w).and(dw).and(v).for_each(|w, dw, v| {
                kernels::windowgrad_update(w, *dw, lr, rho, eps, v)
            });
        }
        Method::Nesterov => {
            Zip::from(w).and(dw).and(v).for_each(|w, dw, v| {
                kernels::nesterov_update(w, *dw, lr, momentum, v)
            });
        }
        Method::Adadelta => {
            let x = ArrayViewMut1::from(xsum);
            Zip::from(w)
                .and(dw)
                .and(v)
                .and(x)
                .for_each(|w, dw, v, x| kernels::adadelta_update(w, *dw, rho, eps, v, x));
        }
        Method::Adam => {
            let x = ArrayViewMut1::from(xsum);
            let bias_correction1 = 1. - beta1.powf(k as f64);
            let bias_correction2 = 1. - beta2.powf(k as f64);
            Zip::from(w).and(dw).and(v).and(x).for_each(|w, dw, v, x| {
                kernels::adam_update(
                    w,
                    *dw,
                    lr,
                    beta1,
                    beta2,
                    eps,
                    bias_correction1,
                    bias_correction2,
                    v,
                    x,
                )
            });
        }
    }
}

/// Per element update rules.
///
/// `w` is the parameter, `dw` the batch gradient, `v` and `x` the accumulators.
mod kernels {
    pub fn sgd_update(w: &mut f64, dw: f64, lr: f64) {
        *w += -lr * dw;
    }

    pub fn sgd_update_with_momentum(w: &mut f64, dw: f64, lr: f64, m: f64, v: &mut f64) {
        let dx = m * *v - lr * dw;
        *v = dx;
        *w += dx;
    }

    pub fn adagrad_update(w: &mut f64, dw: f64, lr: f64, eps: f64, v: &mut f64) {
        *v += dw * dw;
        *w += -lr / (v.sqrt() + eps) * dw;
    }

    pub fn windowgrad_update(w: &mut f64, dw: f64, lr: f64, rho: f64, eps: f64, v: &mut f64) {
        *v = rho * *v + (1. - rho) * dw * dw;
        *w += -lr / (*v + eps).sqrt() * dw;
    }

    // x lags behind v by one step
    pub fn adadelta_update(w: &mut f64, dw: f64, rho: f64, eps: f64, v: &mut f64, x: &mut f64) {
        *v = rho * *v + (1. - rho) * dw * dw;
        let dx = -((*x + eps) / (*v + eps)).sqrt() * dw;
        *x = rho * *x + (1. - rho) * dx * dx;
        *w += dx;
    }

    pub fn nesterov_update(w: &mut f64, dw: f64, lr: f64, m: f64, v: &mut f64) {
        let prev = *v;
        *v = m * *v + lr * dw;
        *w += m * prev - (1. + m) * *v;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn adam_update(
        w: &mut f64,
        dw: f64,
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        bias_correction1: f64,
        bias_correction2: f64,
        v: &mut f64,
        x: &mut f64,
    ) {
        *v = beta1 * *v + (1. - beta1) * dw;
        *x = beta2 * *x + (1. - beta2) * dw * dw;
        let corr1 = *v * bias_correction1;
        let corr2 = *x * bias_correction2;
        *w += -lr * corr1 / (corr2.sqrt() + eps);
    }
}
