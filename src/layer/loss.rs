use super::{
    check_dimensions, unsupported, Backward, Forward, LayerKind, Loss, RegressionConfig,
    RegressionLoss, SoftMaxConfig, SvmConfig,
};
use crate::{
    volume::{Dimensions, Volume},
    Error, Result,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The head layers take a flat input of one value per class / neuron.
fn head_dimensions(input: Dimensions, outputs: usize, kind: LayerKind) -> Result<Dimensions> {
    if outputs == 0 {
        return Err(Error::InvalidConfig(format!(
            "{kind} output count must be positive"
        )));
    }
    if input.size() != outputs {
        return Err(Error::InvalidConfig(format!(
            "{kind} expects {outputs} inputs, found {input}"
        )));
    }
    Ok(Dimensions::column(outputs))
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::OutOfRange { index, len })
    }
}

/// Softmax classifier.
///
/// Normalizes its input into class probabilities. The loss is the negative log
/// likelihood of the true class.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoftMaxLayer {
    config: SoftMaxConfig,
    input: Dimensions,
    output: Dimensions,
    probabilities: Vec<f64>,
}

impl SoftMaxLayer {
    /// Creates a softmax over `config.classes` inputs.
    ///
    /// **Errors**
    ///
    /// If there are no classes, or the input size is not the class count.
    pub fn new(input: Dimensions, config: SoftMaxConfig) -> Result<Self> {
        let output = head_dimensions(input, config.classes, LayerKind::SoftMax)?;
        Ok(Self {
            config,
            input,
            output,
            probabilities: Vec::new(),
        })
    }
    pub fn config(&self) -> &SoftMaxConfig {
        &self.config
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.input
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.output
    }
    /// The probabilities computed by the last forward pass.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }
    /// The most probable class of the last forward pass.
    ///
    /// Ties go to the lowest class. None if there has been no forward pass.
    pub fn prediction(&self) -> Option<usize> {
        let mut iter = self.probabilities.iter().copied().enumerate();
        let first = iter.next()?;
        let (class, _) = iter.fold(first, |best, (i, p)| if p > best.1 { (i, p) } else { best });
        Some(class)
    }
}

impl Forward for SoftMaxLayer {
    fn forward<R: Rng + ?Sized>(&mut self, input: &Volume, _: bool, _: &mut R) -> Result<Volume> {
        check_dimensions(self.input, input.dimensions())?;
        let x = input.values();
        let max = x.iter().copied().fold(x[0], f64::max);
        let mut e: Vec<f64> = x.iter().map(|x| (x - max).exp()).collect();
        let sum: f64 = e.iter().sum();
        e.iter_mut().for_each(|e| *e /= sum);
        self.probabilities = e.clone();
        Volume::from_values(self.output, e)
    }
}

impl Backward for SoftMaxLayer {
    fn backward(&mut self, _: &mut Volume, _: &Volume) -> Result<()> {
        unsupported("backward", LayerKind::SoftMax)
    }
}

impl Loss for SoftMaxLayer {
    fn loss(&mut self, input: &mut Volume, label: usize) -> Result<f64> {
        check_index(label, self.output.size())?;
        check_dimensions(self.input, input.dimensions())?;
        if self.probabilities.len() != self.output.size() {
            return Err(Error::MissingForward);
        }
        input.zero_grad();
        for (i, (dx, p)) in input
            .gradients_mut()
            .iter_mut()
            .zip(self.probabilities.iter())
            .enumerate()
        {
            let indicator = if i == label { 1. } else { 0. };
            *dx = -(indicator - p);
        }
        Ok(-self.probabilities[label].ln())
    }
}

/// Multiclass SVM classifier.
///
/// Passes the class scores through. The loss is the structured hinge loss with
/// a margin of 1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SvmLayer {
    config: SvmConfig,
    input: Dimensions,
    output: Dimensions,
}

impl SvmLayer {
    /// Creates an svm over `config.classes` scores.
    ///
    /// **Errors**
    ///
    /// If there are no classes, or the input size is not the class count.
    pub fn new(input: Dimensions, config: SvmConfig) -> Result<Self> {
        let output = head_dimensions(input, config.classes, LayerKind::Svm)?;
        Ok(Self {
            config,
            input,
            output,
        })
    }
    pub fn config(&self) -> &SvmConfig {
        &self.config
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.input
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.output
    }
}

impl Forward for SvmLayer {
    fn forward<R: Rng + ?Sized>(&mut self, input: &Volume, _: bool, _: &mut R) -> Result<Volume> {
        check_dimensions(self.input, input.dimensions())?;
        Volume::from_values(self.output, input.values().to_vec())
    }
}

impl Backward for SvmLayer {
    fn backward(&mut self, _: &mut Volume, _: &Volume) -> Result<()> {
        unsupported("backward", LayerKind::Svm)
    }
}

impl Loss for SvmLayer {
    fn loss(&mut self, input: &mut Volume, label: usize) -> Result<f64> {
        const MARGIN: f64 = 1.;
        check_index(label, self.output.size())?;
        check_dimensions(self.input, input.dimensions())?;
        input.zero_grad();
        let (x, dx) = input.values_and_gradients_mut();
        let y_score = x[label];
        let mut loss = 0.;
        for (i, x) in x.iter().enumerate() {
            if i == label {
                continue;
            }
            let violation = -y_score + x + MARGIN;
            if violation > 0. {
                dx[i] += 1.;
                dx[label] -= 1.;
                loss += violation;
            }
        }
        Ok(loss)
    }
}

/// Regression head.
///
/// Passes the predictions through. The loss is half the squared error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegressionLayer {
    config: RegressionConfig,
    input: Dimensions,
    output: Dimensions,
}

impl RegressionLayer {
    /// Creates a regression head over `config.neurons` predictions.
    ///
    /// **Errors**
    ///
    /// If there are no neurons, or the input size is not the neuron count.
    pub fn new(input: Dimensions, config: RegressionConfig) -> Result<Self> {
        let output = head_dimensions(input, config.neurons, LayerKind::Regression)?;
        Ok(Self {
            config,
            input,
            output,
        })
    }
    pub fn config(&self) -> &RegressionConfig {
        &self.config
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.input
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.output
    }
}

impl Forward for RegressionLayer {
    fn forward<R: Rng + ?Sized>(&mut self, input: &Volume, _: bool, _: &mut R) -> Result<Volume> {
        check_dimensions(self.input, input.dimensions())?;
        Volume::from_values(self.output, input.values().to_vec())
    }
}

impl Backward for RegressionLayer {
    fn backward(&mut self, _: &mut Volume, _: &Volume) -> Result<()> {
        unsupported("backward", LayerKind::Regression)
    }
}

impl RegressionLoss for RegressionLayer {
    fn multi_dimensional_loss(&mut self, input: &mut Volume, targets: &[f64]) -> Result<f64> {
        if targets.len() != self.output.size() {
            return Err(Error::LengthMismatch {
                expected: self.output.size(),
                found: targets.len(),
            });
        }
        check_dimensions(self.input, input.dimensions())?;
        input.zero_grad();
        let (x, dx) = input.values_and_gradients_mut();
        let mut loss = 0.;
        for ((x, dx), target) in x.iter().zip(dx.iter_mut()).zip(targets) {
            let dy = x - target;
            *dx = dy;
            loss += 0.5 * dy * dy;
        }
        Ok(loss)
    }
    fn dimensional_loss(&mut self, input: &mut Volume, index: usize, value: f64) -> Result<f64> {
        check_index(index, self.output.size())?;
        check_dimensions(self.input, input.dimensions())?;
        // the other dimensions are not supervised, their gradients stay 0
        input.zero_grad();
        let (x, dx) = input.values_and_gradients_mut();
        let dy = x[index] - value;
        dx[index] = dy;
        Ok(0.5 * dy * dy)
    }
}
