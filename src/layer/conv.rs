use super::{check_dimensions, Backward, ConvConfig, Forward, ParameterResponse, Parameters};
use crate::{
    volume::{Dimensions, Volume},
    Error, Result,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// floor((input + 2 * padding - kernel) / stride) + 1
pub(super) fn output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Result<usize> {
    if kernel == 0 || stride == 0 {
        return Err(Error::InvalidConfig(format!(
            "kernel {kernel} and stride {stride} must be positive"
        )));
    }
    let padded = input + 2 * padding;
    if padded < kernel {
        return Err(Error::InvalidConfig(format!(
            "kernel {kernel} is larger than the padded input {padded}"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

/// A position of a kernel that falls inside the input.
#[derive(Clone, Copy, Debug)]
pub(super) struct Tap {
    pub fx: usize,
    pub fy: usize,
    pub x: usize,
    pub y: usize,
}

/// The geometry of a sliding window over the spatial axes of an input.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub(super) struct Window {
    pub input: Dimensions,
    pub kernel_width: usize,
    pub kernel_height: usize,
    pub stride: usize,
    pub padding: usize,
}

impl Window {
    pub fn output_dimensions(&self, depth: usize) -> Result<Dimensions> {
        let width = output_size(self.input.width, self.kernel_width, self.stride, self.padding)?;
        let height = output_size(
            self.input.height,
            self.kernel_height,
            self.stride,
            self.padding,
        )?;
        Ok(Dimensions::new(width, height, depth))
    }
    /// The in bounds kernel positions of output (`ax`, `ay`), row by row.
    ///
    /// Positions in the padding are skipped, which is equivalent to padding
    /// with zeros for convolution and never lets them win a max.
    pub fn taps(&self, ax: usize, ay: usize) -> impl Iterator<Item = Tap> {
        let Self {
            input,
            kernel_width,
            kernel_height,
            stride,
            padding,
        } = *self;
        let x0 = (ax * stride) as isize - padding as isize;
        let y0 = (ay * stride) as isize - padding as isize;
        let (width, height) = (input.width as isize, input.height as isize);
        (0..kernel_height)
            .flat_map(move |fy| (0..kernel_width).map(move |fx| (fx, fy)))
            .filter_map(move |(fx, fy)| {
                let x = x0 + fx as isize;
                let y = y0 + fy as isize;
                if x >= 0 && x < width && y >= 0 && y < height {
                    Some(Tap {
                        fx,
                        fy,
                        x: x as usize,
                        y: y as usize,
                    })
                } else {
                    None
                }
            })
    }
}

/// Convolution layer.
///
/// Each of the `filters` filters spans the full input depth and produces one
/// output channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConvLayer {
    config: ConvConfig,
    window: Window,
    output: Dimensions,
    filters: Vec<Volume>,
    biases: Volume,
}

impl ConvLayer {
    /// Creates a convolution over inputs of `input` dimensions.
    ///
    /// Filters are drawn with [`Volume::random()`], biases are set to
    /// `config.bias`.
    ///
    /// **Errors**
    ///
    /// If the filter count, kernel or stride are 0, or the kernel does not fit
    /// in the padded input.
    pub fn new<R: Rng + ?Sized>(
        input: Dimensions,
        config: ConvConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if config.filters == 0 {
            return Err(Error::InvalidConfig(
                "conv filter count must be positive".to_string(),
            ));
        }
        if input.size() == 0 {
            return Err(Error::InvalidConfig(format!(
                "conv input dimensions {input} are empty"
            )));
        }
        let window = Window {
            input,
            kernel_width: config.kernel_width,
            kernel_height: config.kernel_height(),
            stride: config.stride,
            padding: config.padding,
        };
        let output = window.output_dimensions(config.filters)?;
        let filter_dimensions =
            Dimensions::new(window.kernel_width, window.kernel_height, input.depth);
        let filters = (0..config.filters)
            .map(|_| Volume::random(filter_dimensions, rng))
            .collect();
        let biases = Volume::filled(Dimensions::column(config.filters), config.bias);
        Ok(Self {
            config,
            window,
            output,
            filters,
            biases,
        })
    }
    pub fn config(&self) -> &ConvConfig {
        &self.config
    }
    pub fn input_dimensions(&self) -> Dimensions {
        self.window.input
    }
    pub fn output_dimensions(&self) -> Dimensions {
        self.output
    }
    /// The filters, one per output channel.
    pub fn filters(&self) -> &[Volume] {
        &self.filters
    }
    pub fn filters_mut(&mut self) -> &mut [Volume] {
        &mut self.filters
    }
    /// The biases, one per output channel.
    pub fn biases(&self) -> &Volume {
        &self.biases
    }
    pub fn biases_mut(&mut self) -> &mut Volume {
        &mut self.biases
    }
}

impl Forward for ConvLayer {
    fn forward<R: Rng + ?Sized>(&mut self, input: &Volume, _: bool, _: &mut R) -> Result<Volume> {
        let input_dimensions = self.window.input;
        check_dimensions(input_dimensions, input.dimensions())?;
        let depth = input_dimensions.depth;
        let mut output = Volume::zeros(self.output);
        let x = input.values();
        let y = output.values_mut();
        for (d, filter) in self.filters.iter().enumerate() {
            let fd = filter.dimensions();
            let w = filter.values();
            let bias = self.biases.values()[d];
            for ay in 0..self.output.height {
                for ax in 0..self.output.width {
                    let mut a = bias;
                    for tap in self.window.taps(ax, ay) {
                        let fi = fd.index(tap.fx, tap.fy, 0);
                        let xi = input_dimensions.index(tap.x, tap.y, 0);
                        a += w[fi..fi + depth]
                            .iter()
                            .zip(&x[xi..xi + depth])
                            .map(|(w, x)| w * x)
                            .sum::<f64>();
                    }
                    y[self.output.index(ax, ay, d)] = a;
                }
            }
        }
        Ok(output)
    }
}

impl Backward for ConvLayer {
    fn backward(&mut self, input: &mut Volume, output: &Volume) -> Result<()> {
        let input_dimensions = self.window.input;
        check_dimensions(input_dimensions, input.dimensions())?;
        check_dimensions(self.output, output.dimensions())?;
        let depth = input_dimensions.depth;
        input.zero_grad();
        let (x, dx) = input.values_and_gradients_mut();
        let dy = output.gradients();
        let db = self.biases.gradients_mut();
        for (d, filter) in self.filters.iter_mut().enumerate() {
            let fd = filter.dimensions();
            let (w, dw) = filter.values_and_gradients_mut();
            for ay in 0..self.output.height {
                for ax in 0..self.output.width {
                    let chain_grad = dy[self.output.index(ax, ay, d)];
                    for tap in self.window.taps(ax, ay) {
                        let fi = fd.index(tap.fx, tap.fy, 0);
                        let xi = input_dimensions.index(tap.x, tap.y, 0);
                        for fz in 0..depth {
                            dw[fi + fz] += x[xi + fz] * chain_grad;
                            dx[xi + fz] += w[fi + fz] * chain_grad;
                        }
                    }
                    db[d] += chain_grad;
                }
            }
        }
        Ok(())
    }
}

impl Parameters for ConvLayer {
    fn parameters_len(&self) -> usize {
        self.filters.len() + 1
    }
    fn collect_parameters<'a>(&'a mut self, parameters: &mut Vec<ParameterResponse<'a>>) {
        let ConvConfig {
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
