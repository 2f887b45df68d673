use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use volnet::{
    layer::{
        Activation, ConvConfig, FullyConnectedConfig, LayerDef, PoolConfig, RegressionConfig,
        SoftMaxConfig, SvmConfig,
    },
    network::Network,
    trainer::{labeled_loss, regression_loss, Method, Trainer, TrainerBuilder},
    volume::{Dimensions, Volume},
};

fn column(values: &[f64]) -> Volume {
    let mut volume = Volume::zeros(Dimensions::column(values.len()));
    volume.values_mut().copy_from_slice(values);
    volume
}

/// Points labeled by the side of the line x + y = 0 they fall on.
fn separable(n: usize, seed: u64) -> Vec<(Volume, usize)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(n);
    while samples.len() < n {
        let x: f64 = rng.gen_range(-1. ..1.);
        let y: f64 = rng.gen_range(-1. ..1.);
        // leave a margin between the classes
        if (x + y).abs() < 0.1 {
            continue;
        }
        let label = usize::from(x + y > 0.);
        samples.push((column(&[x, y]), label));
    }
    samples
}

fn mean_cost(network: &mut Network, samples: &[(Volume, usize)]) -> Result<f64> {
    let mut total = 0.;
    for (input, label) in samples {
        total += network.cost_loss(input.clone(), *label)?;
    }
    Ok(total / samples.len() as f64)
}

fn accuracy(network: &mut Network, samples: &[(Volume, usize)]) -> Result<f64> {
    let mut correct = 0;
    for (input, label) in samples {
        network.forward(input.clone(), false)?;
        if network.prediction()? == *label {
            correct += 1;
        }
    }
    Ok(correct as f64 / samples.len() as f64)
}

fn train_classifier(
    defs: Vec<LayerDef>,
    builder: TrainerBuilder,
    samples: &[(Volume, usize)],
    epochs: usize,
) -> Result<(f64, f64, Trainer)> {
    let network = Network::with_seed(defs, 0)?;
    let mut trainer = builder.build(network)?;
    let before = mean_cost(trainer.network_mut(), samples)?;
    for _ in 0..epochs {
        for (input, label) in samples {
            trainer.train(input.clone(), labeled_loss(*label))?;
        }
    }
    let after = mean_cost(trainer.network_mut(), samples)?;
    Ok((before, after, trainer))
}

fn softmax_classifier() -> Vec<LayerDef> {
    vec![
        LayerDef::input(Dimensions::column(2)),
        LayerDef::new(FullyConnectedConfig::new(6)).with_activation(Activation::Tanh),
        LayerDef::new(SoftMaxConfig::new(2)),
    ]
}

#[test]
fn sgd_learns_separable_classes() -> Result<()> {
    let samples = separable(100, 0);
    let builder = Trainer::builder().learning_rate(0.01).momentum(0.9);
    let (before, after, mut trainer) =
        train_classifier(softmax_classifier(), builder, &samples, 20)?;
    assert!(after < before, "{before} -> {after}");
    assert!(accuracy(trainer.network_mut(), &samples)? > 0.9);
    assert_eq!(trainer.iteration(), 2000);
    Ok(())
}

#[test]
fn every_method_reduces_loss() -> Result<()> {
    let samples = separable(50, 1);
    let builders = [
        Trainer::builder().method(Method::Sgd).momentum(0.).learning_rate(0.05),
        Trainer::builder().method(Method::Nesterov).learning_rate(0.01),
        Trainer::builder().method(Method::Adagrad).learning_rate(0.1),
        Trainer::builder().method(Method::Windowgrad).learning_rate(0.01),
        Trainer::builder().method(Method::Adadelta).eps(1e-4),
        Trainer::builder().method(Method::Adam).learning_rate(0.001),
    ];
    for builder in builders {
        let method = builder.options().method;
        let (before, after, _) = train_classifier(softmax_classifier(), builder, &samples, 10)?;
        assert!(after < before, "{method}: {before} -> {after}");
    }
    Ok(())
}

#[test]
fn mini_batches_reduce_loss() -> Result<()> {
    let samples = separable(100, 2);
    let builder = Trainer::builder()
        .learning_rate(0.05)
        .batch_size(4)
        .decay(0., 0.001);
    let (before, after, _) = train_classifier(softmax_classifier(), builder, &samples, 20)?;
    assert!(after < before, "{before} -> {after}");
    Ok(())
}

#[test]
fn svm_reduces_loss() -> Result<()> {
    let samples = separable(100, 3);
    let defs = vec![
        LayerDef::input(Dimensions::column(2)),
        LayerDef::new(FullyConnectedConfig::new(6)).with_activation(Activation::Relu),
        LayerDef::new(SvmConfig::new(2)),
    ];
    let builder = Trainer::builder().learning_rate(0.01);
    let (before, after, _) = train_classifier(defs, builder, &samples, 10)?;
    assert!(after < before, "{before} -> {after}");
    Ok(())
}

/// 4x4 images with one lit pixel, labeled by the half it is in.
fn halves() -> Vec<(Volume, usize)> {
    let dimensions = Dimensions::new(4, 4, 1);
    let mut samples = Vec::new();
    for y in 0..4 {
        for x in 0..4 {
            let mut image = Volume::zeros(dimensions);
            image.values_mut()[dimensions.index(x, y, 0)] = 1.;
            samples.push((image, usize::from(x >= 2)));
        }
    }
    samples
}

#[test]
fn conv_pool_network_reduces_loss() -> Result<()> {
    let samples = halves();
    let defs = vec![
        LayerDef::input(Dimensions::new(4, 4, 1)),
        LayerDef::new(ConvConfig::new(4, 3).with_padding(1)).with_activation(Activation::Relu),
        LayerDef::new(PoolConfig::new(2)),
        LayerDef::new(SoftMaxConfig::new(2)),
    ];
    let builder = Trainer::builder().learning_rate(0.01);
    let (before, after, trainer) = train_classifier(defs, builder, &samples, 30)?;
    assert!(after < before, "{before} -> {after}");
    assert_eq!(trainer.network().output_dimensions(), Dimensions::column(2));
    Ok(())
}

#[test]
fn regression_learns_linear_function() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(4);
    let samples: Vec<(Volume, f64)> = (0..100)
        .map(|_| {
            let x: f64 = rng.gen_range(-1. ..1.);
            let y: f64 = rng.gen_range(-1. ..1.);
            (column(&[x, y]), 0.5 * x - y)
        })
        .collect();
    let network = Network::with_seed(
        vec![
            LayerDef::input(Dimensions::column(2)),
            LayerDef::new(FullyConnectedConfig::new(8)).with_activation(Activation::Tanh),
            LayerDef::new(RegressionConfig::new(1)),
        ],
        0,
    )?;
    let mut trainer = Trainer::builder().learning_rate(0.01).build(network)?;
    assert!(trainer.is_regression());
    let mut epoch_losses = Vec::new();
    for _ in 0..20 {
        let mut total = 0.;
        for (input, target) in &samples {
            total += trainer
                .train(input.clone(), regression_loss(&[*target]))?
                .cost_loss;
        }
        epoch_losses.push(total / samples.len() as f64);
    }
    let first = epoch_losses[0];
    let last = epoch_losses[epoch_losses.len() - 1];
    assert!(last < 0.5 * first, "{first} -> {last}");
    Ok(())
}

#[test]
fn dropout_network_trains() -> Result<()> {
    let samples = separable(20, 5);
    let network = Network::with_seed(
        vec![
            LayerDef::input(Dimensions::column(2)),
            LayerDef::new(FullyConnectedConfig::new(8))
                .with_activation(Activation::Relu)
                .with_dropout(0.5),
            LayerDef::new(SoftMaxConfig::new(2)),
        ],
        0,
    )?;
    let mut trainer = Trainer::builder().build(network)?;
    for (input, label) in &samples {
        let results = trainer.train(input.clone(), labeled_loss(*label))?;
        assert!(results.total_loss.is_finite());
    }
    let network = trainer.network_mut();
    let a = network.forward(samples[0].0.clone(), false)?.clone();
    let b = network.forward(samples[0].0.clone(), false)?.clone();
    assert_eq!(a, b);
    Ok(())
}
