/*!
# volnet
A small neural network engine.

- [`Volume`](volume::Volume): a 3 dimensional tensor of values and their gradients.
- [`Layer`](layer::Layer): fully connected, convolution, max pool, activation,
dropout, maxout, and softmax / svm / regression heads.
- [`Network`](network::Network): assembles layer definitions into a pipeline and
runs the forward and backward passes.
- [`Trainer`](trainer::Trainer): accumulates gradients over mini batches and
updates parameters with sgd, momentum, nesterov, adagrad, windowgrad, adadelta
or adam.

# Example
```
use volnet::{
    layer::{FullyConnectedConfig, LayerDef, SoftMaxConfig},
    network::Network,
    trainer::{labeled_loss, Trainer},
    volume::{Dimensions, Volume},
};
# fn main() -> volnet::Result<()> {
let network = Network::with_seed(
    vec![
        LayerDef::input(Dimensions::column(2)),
        LayerDef::new(FullyConnectedConfig::new(4)),
        LayerDef::new(SoftMaxConfig::new(2)),
    ],
    0,
)?;
let mut trainer = Trainer::builder().learning_rate(0.1).build(network)?;
let input = Volume::from_values(Dimensions::column(2), vec![1., 0.])?;
let results = trainer.train(input, labeled_loss(1))?;
assert!(results.cost_loss > 0.);
# Ok(())
# }
```

# Logging
Diagnostics are emitted with the [`log`](https://docs.rs/log) facade. Install a
logger in the application to see them.
*/
#![forbid(unsafe_code)]

mod error;
pub use error::{Error, Result};

/// Layers.
pub mod layer;
/// Networks.
pub mod network;
/// Training.
pub mod trainer;
/// Volumes.
pub mod volume;

pub use network::Network;
pub use trainer::Trainer;
pub use volume::{Dimensions, Volume};
