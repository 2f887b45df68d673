use super::*;
use crate::layer::{
    ConvConfig, DropoutConfig, MaxoutConfig, PoolConfig, RegressionConfig, SoftMaxConfig,
    SvmConfig,
};
use anyhow::Result;
use approx::assert_relative_eq;

fn kinds(defs: &[LayerDef]) -> Vec<LayerKind> {
    defs.iter().map(LayerDef::kind).collect()
}

fn classifier(inputs: usize, hidden: usize, classes: usize) -> Vec<LayerDef> {
    vec![
        LayerDef::input(Dimensions::column(inputs)),
        LayerDef::new(FullyConnectedConfig::new(hidden)).with_activation(Activation::Tanh),
        LayerDef::new(SoftMaxConfig::new(classes)),
    ]
}

fn column(values: &[f64]) -> Volume {
    let mut volume = Volume::zeros(Dimensions::column(values.len()));
    volume.values_mut().copy_from_slice(values);
    volume
}

#[test]
fn expansion_inserts_head_layer() {
    let defs = activate_layers(vec![
        LayerDef::input(Dimensions::column(3)),
        LayerDef::new(FullyConnectedConfig::new(2)),
        LayerDef::new(SoftMaxConfig::new(2)),
    ]);
    assert_eq!(
        kinds(&defs),
        [
            LayerKind::Input,
            LayerKind::FullyConnected,
            LayerKind::FullyConnected,
            LayerKind::SoftMax
        ]
    );
    assert_eq!(
        defs[2].config,
        LayerConfig::FullyConnected(FullyConnectedConfig::new(2))
    );
    // heads are expanded again, one fully connected layer per pass
    let again = activate_layers(defs.clone());
    assert_eq!(again.len(), defs.len() + 1);
    assert_eq!(kinds(&again[..3]), kinds(&defs[..3]));
    assert_eq!(
        kinds(&again[3..]),
        [LayerKind::FullyConnected, LayerKind::SoftMax]
    );
    let defs = activate_layers(vec![LayerDef::new(SvmConfig::new(4))]);
    assert_eq!(
        defs[0].config,
        LayerConfig::FullyConnected(FullyConnectedConfig::new(4))
    );
    let defs = activate_layers(vec![LayerDef::new(RegressionConfig::new(5))]);
    assert_eq!(
        defs[0].config,
        LayerConfig::FullyConnected(FullyConnectedConfig::new(5))
    );
}

#[test]
fn expansion_of_options() {
    let fc = || LayerDef::new(FullyConnectedConfig::new(4));
    let cases = [
        (fc(), vec![LayerKind::FullyConnected]),
        (
            fc().with_activation(Activation::Sigmoid),
            vec![LayerKind::FullyConnected, LayerKind::Sigmoid],
        ),
        (
            fc().with_dropout(0.5),
            vec![LayerKind::FullyConnected, LayerKind::Dropout],
        ),
        (
            fc().with_activation(Activation::Tanh).with_dropout(0.5),
            vec![LayerKind::FullyConnected, LayerKind::Tanh, LayerKind::Dropout],
        ),
        (
            fc().with_activation(Activation::Maxout),
            vec![LayerKind::FullyConnected, LayerKind::Maxout],
        ),
        (
            fc().with_activation(Activation::Maxout)
                .with_maxout(4)
                .with_dropout(0.2),
            vec![LayerKind::FullyConnected, LayerKind::Maxout, LayerKind::Dropout],
        ),
        // a group size without a maxout activation has no effect
        (fc().with_maxout(4), vec![LayerKind::FullyConnected]),
    ];
    for (def, expected) in cases {
        let expanded = activate_layers(vec![def.clone()]);
        assert_eq!(kinds(&expanded), expected, "{def:?}");
        assert_eq!(activate_layers(expanded.clone()), expanded, "{def:?}");
    }
}

#[test]
fn expansion_configures_inserted_layers() {
    let defs = activate_layers(vec![
        LayerDef::new(ConvConfig::new(8, 3))
            .with_activation(Activation::Maxout)
            .with_maxout(4)
            .with_dropout(0.2),
        LayerDef::new(FullyConnectedConfig::new(6)).with_activation(Activation::Maxout),
    ]);
    assert_eq!(defs[1].config, LayerConfig::Maxout(MaxoutConfig::new(4)));
    assert_eq!(defs[2].config, LayerConfig::Dropout(DropoutConfig::new(0.2)));
    assert_eq!(defs[4].config, LayerConfig::Maxout(MaxoutConfig::new(2)));
    assert!(defs
        .iter()
        .all(|def| def.activation.is_none() && def.dropout.is_none() && def.maxout.is_none()));
}

#[test]
fn relu_raises_bias() {
    let defs = activate_layers(vec![
        LayerDef::new(FullyConnectedConfig::new(4)).with_activation(Activation::Relu),
        LayerDef::new(ConvConfig::new(4, 3)).with_activation(Activation::Relu),
        LayerDef::new(FullyConnectedConfig::new(4).with_bias(0.5))
            .with_activation(Activation::Relu),
        LayerDef::new(FullyConnectedConfig::new(4)).with_activation(Activation::Tanh),
    ]);
    let biases: Vec<f64> = defs
        .iter()
        .filter_map(|def| match &def.config {
            LayerConfig::FullyConnected(config) => Some(config.bias),
            LayerConfig::Conv(config) => Some(config.bias),
            _ => None,
        })
        .collect();
    assert_eq!(biases, [RELU_BIAS, RELU_BIAS, 0.5, 0.]);
}

#[test]
fn validation() {
    let input = || LayerDef::input(Dimensions::column(2));
    let fc = || LayerDef::new(FullyConnectedConfig::new(2));
    let softmax = || LayerDef::new(SoftMaxConfig::new(2));
    let invalid = [
        vec![input(), softmax()],
        vec![fc(), fc(), softmax()],
        vec![input(), fc(), fc()],
        vec![input(), softmax(), fc(), softmax()],
        vec![input(), input(), softmax()],
    ];
    for defs in invalid {
        assert!(
            matches!(
                Network::with_seed(defs.clone(), 0),
                Err(Error::InvalidNetwork(_))
            ),
            "{:?}",
            kinds(&defs)
        );
    }
    assert!(Network::with_seed(vec![input(), fc(), softmax()], 0).is_ok());
    // fails in the layer constructors
    let defs = vec![
        LayerDef::input(Dimensions::new(2, 2, 1)),
        LayerDef::new(ConvConfig::new(2, 3)),
        softmax(),
    ];
    assert!(matches!(
        Network::with_seed(defs, 0),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn assembly_threads_dimensions() -> Result<()> {
    let network = Network::with_seed(
        vec![
            LayerDef::input(Dimensions::new(8, 8, 3)),
            LayerDef::new(ConvConfig::new(4, 3).with_padding(1)).with_activation(Activation::Relu),
            LayerDef::new(PoolConfig::new(2)),
            LayerDef::new(FullyConnectedConfig::new(6))
                .with_activation(Activation::Maxout)
                .with_maxout(3),
            LayerDef::new(SvmConfig::new(5)),
        ],
        0,
    )?;
    let dimensions: Vec<Dimensions> = network
        .layers()
        .iter()
        .map(Layer::output_dimensions)
        .collect();
    assert_eq!(
        dimensions,
        [
            Dimensions::new(8, 8, 3),
            Dimensions::new(8, 8, 4),
            Dimensions::new(8, 8, 4),
            Dimensions::new(4, 4, 4),
            Dimensions::column(6),
            Dimensions::column(2),
            Dimensions::column(5),
            Dimensions::column(5),
        ]
    );
    for pair in network.layers().windows(2) {
        assert_eq!(pair[0].output_dimensions(), pair[1].input_dimensions());
    }
    assert_eq!(network.input_dimensions(), Dimensions::new(8, 8, 3));
    assert_eq!(network.output_dimensions(), Dimensions::column(5));
    assert!(!network.is_regression());
    Ok(())
}

#[test]
fn forward_threads_outputs() -> Result<()> {
    let mut network = Network::with_seed(classifier(3, 4, 2), 0)?;
    assert_eq!(network.len(), 5);
    assert!(network.output().is_none());
    let input = column(&[0.5, -1., 2.]);
    let output = network.forward(input.clone(), false)?.clone();
    assert_eq!(output.dimensions(), Dimensions::column(2));
    assert_relative_eq!(output.values().iter().sum::<f64>(), 1.);

    // the same pipeline, run layer by layer
    let mut rng = StdRng::seed_from_u64(1);
    let mut x = input;
    for layer in network.clone().layers_mut() {
        x = layer.forward(&x, false, &mut rng)?;
    }
    assert_eq!(x.values(), output.values());
    assert_eq!(network.output(), Some(&output));
    Ok(())
}

#[test]
fn forward_checks_input() -> Result<()> {
    let mut network = Network::with_seed(classifier(3, 4, 2), 0)?;
    assert!(matches!(
        network.forward(Volume::zeros(Dimensions::column(4)), false),
        Err(Error::DimensionMismatch { .. })
    ));
    Ok(())
}

#[test]
fn seeded_networks_are_equal() -> Result<()> {
    let mut a = Network::with_seed(classifier(3, 4, 2), 7)?;
    let mut b = Network::with_seed(classifier(3, 4, 2), 7)?;
    let input = column(&[1., 2., 3.]);
    assert_eq!(a.forward(input.clone(), false)?, b.forward(input, false)?);
    Ok(())
}

#[test]
fn prediction() -> Result<()> {
    let mut network = Network::with_seed(classifier(2, 4, 3), 0)?;
    assert!(matches!(network.prediction(), Err(Error::MissingForward)));
    let output = network.forward(column(&[1., -1.]), false)?.clone();
    let prediction = network.prediction()?;
    let max = output.values().iter().copied().fold(f64::MIN, f64::max);
    assert_eq!(output.values()[prediction], max);
    // a failed forward pass leaves no prediction
    assert!(network.forward(column(&[1., -1., 0.5, 2., 0.]), false).is_err());
    assert!(network.output().is_none());
    assert!(matches!(network.prediction(), Err(Error::MissingForward)));

    let mut svm = Network::with_seed(
        vec![
            LayerDef::input(Dimensions::column(2)),
            LayerDef::new(FullyConnectedConfig::new(2)),
            LayerDef::new(SvmConfig::new(2)),
        ],
        0,
    )?;
    svm.forward(column(&[1., -1.]), false)?;
    assert!(matches!(
        svm.prediction(),
        Err(Error::Unsupported {
            layer: LayerKind::Svm,
            ..
        })
    ));
    Ok(())
}

#[test]
fn backward_propagates_to_first_hidden_layer() -> Result<()> {
    let mut network = Network::with_seed(classifier(3, 4, 2), 0)?;
    assert!(matches!(network.backward(0), Err(Error::MissingForward)));
    let output = network.forward(column(&[0.5, -1., 2.]), true)?.clone();
    let loss = network.backward(1)?;
    assert_relative_eq!(loss, -output.values()[1].ln());
    // layers: input, fc, tanh, fc, softmax
    let parameters = network.parameters();
    assert_eq!(parameters.len(), 5 + 3);
    assert!(parameters
        .iter()
        .all(|p| p.gradients.iter().any(|g| *g != 0.)));
    assert!(network.backward(2).is_err());
    Ok(())
}

#[test]
fn cost_loss_does_not_propagate() -> Result<()> {
    let mut network = Network::with_seed(classifier(3, 4, 2), 0)?;
    let input = column(&[0.5, -1., 2.]);
    let loss = network.cost_loss(input.clone(), 0)?;
    let output = network.forward(input, false)?;
    assert_relative_eq!(loss, -output.values()[0].ln());
    assert!(network
        .parameters()
        .iter()
        .all(|p| p.gradients.iter().all(|g| *g == 0.)));
    Ok(())
}

#[test]
fn parameters_in_layer_order() -> Result<()> {
    let mut network = Network::with_seed(
        vec![
            LayerDef::input(Dimensions::new(4, 4, 1)),
            LayerDef::new(ConvConfig::new(2, 3)),
            LayerDef::new(SoftMaxConfig::new(3)),
        ],
        0,
    )?;
    // conv: 2 filters + biases, fc: 3 filters + biases
    assert_eq!(network.parameters_len(), 7);
    let lens: Vec<usize> = network.parameters().iter().map(|p| p.len()).collect();
    assert_eq!(lens, [9, 9, 2, 8, 8, 8, 3]);
    Ok(())
}

#[test]
fn regression_losses_propagate() -> Result<()> {
    let mut network = Network::with_seed(
        vec![
            LayerDef::input(Dimensions::column(2)),
            LayerDef::new(FullyConnectedConfig::new(3)).with_activation(Activation::Sigmoid),
            LayerDef::new(RegressionConfig::new(2)),
        ],
        0,
    )?;
    assert!(network.is_regression());
    let output = network.forward(column(&[0.5, 1.]), true)?.clone();
    let loss = network.multi_dimensional_loss(&[1., -1.])?;
    let expected =
        0.5 * (output.values()[0] - 1.).powi(2) + 0.5 * (output.values()[1] + 1.).powi(2);
    assert_relative_eq!(loss, expected);
    assert!(network.parameters()[0].gradients.iter().any(|g| *g != 0.));
    assert!(matches!(
        network.multi_dimensional_loss(&[1.]),
        Err(Error::LengthMismatch { .. })
    ));
    let loss = network.dimensional_loss(1, 0.)?;
    assert_relative_eq!(loss, 0.5 * output.values()[1].powi(2));
    assert!(network.dimensional_loss(2, 0.).is_err());
    assert!(matches!(
        network.backward(0),
        Err(Error::Unsupported { .. })
    ));

    let mut classifier = Network::with_seed(classifier(2, 2, 2), 0)?;
    classifier.forward(column(&[0., 1.]), false)?;
    assert!(matches!(
        classifier.multi_dimensional_loss(&[0., 1.]),
        Err(Error::Unsupported { .. })
    ));
    Ok(())
}
