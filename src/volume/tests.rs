use super::*;
use anyhow::Result;
use approx::assert_relative_eq;
use rand::{rngs::StdRng, SeedableRng};

#[test]
fn index_is_a_bijection() {
    let dimensions = Dimensions::new(3, 4, 5);
    let mut seen = vec![false; dimensions.size()];
    for y in 0..dimensions.height {
        for x in 0..dimensions.width {
            for d in 0..dimensions.depth {
                let i = dimensions.index(x, y, d);
                assert!(!seen[i], "{i} visited twice");
                seen[i] = true;
            }
        }
    }
    assert!(seen.into_iter().all(|x| x));
}

#[test]
fn depth_varies_fastest() {
    let dimensions = Dimensions::new(2, 2, 3);
    assert_eq!(dimensions.index(0, 0, 1), 1);
    assert_eq!(dimensions.index(1, 0, 0), 3);
    assert_eq!(dimensions.index(0, 1, 0), 6);
}

#[test]
fn set_then_get() -> Result<()> {
    let mut volume = Volume::zeros(Dimensions::new(3, 2, 4));
    volume.set(2, 1, 3, 7.5)?;
    assert_eq!(volume.get(2, 1, 3)?, 7.5);
    assert_eq!(volume.get_index(volume.dimensions().index(2, 1, 3))?, 7.5);
    volume.add(2, 1, 3, 0.5)?;
    volume.mul(2, 1, 3, 2.)?;
    assert_eq!(volume.get(2, 1, 3)?, 16.);
    volume.set_index(0, -1.)?;
    volume.add_index(0, -1.)?;
    volume.mul_index(0, 3.)?;
    assert_eq!(volume.get(0, 0, 0)?, -6.);
    Ok(())
}

#[test]
fn gradients_are_separate_from_values() -> Result<()> {
    let mut volume = Volume::filled(Dimensions::new(2, 2, 2), 1.);
    volume.set_grad(1, 1, 1, 3.)?;
    volume.add_grad(1, 1, 1, 1.)?;
    volume.add_grad_index(0, 2.)?;
    assert_eq!(volume.grad(1, 1, 1)?, 4.);
    assert_eq!(volume.grad_index(0)?, 2.);
    assert_eq!(volume.get(1, 1, 1)?, 1.);
    volume.set_grad_index(0, 5.)?;
    assert_eq!(volume.gradients()[0], 5.);
    volume.zero_grad();
    assert!(volume.gradients().iter().all(|g| *g == 0.));
    assert!(volume.values().iter().all(|x| *x == 1.));
    Ok(())
}

#[test]
fn out_of_range() {
    let mut volume = Volume::zeros(Dimensions::new(2, 2, 1));
    assert!(matches!(
        volume.get_index(4),
        Err(Error::OutOfRange { index: 4, len: 4 })
    ));
    assert!(matches!(
        volume.set(2, 0, 0, 1.),
        Err(Error::PositionOutOfRange { x: 2, .. })
    ));
    // in range of the flat array, but not of the depth axis
    assert!(volume.grad(0, 0, 1).is_err());
    assert!(volume.add_grad_index(10, 1.).is_err());
}

#[test]
fn filled_and_zeros() {
    let dimensions = Dimensions::new(2, 3, 1);
    let volume = Volume::filled(dimensions, 0.1);
    assert_eq!(volume.size(), 6);
    assert!(volume.values().iter().all(|x| *x == 0.1));
    assert_eq!(volume.gradients().len(), 6);
    let volume = Volume::zeros(dimensions);
    assert!(volume.values().iter().all(|x| *x == 0.));
}

#[test]
fn from_values() -> Result<()> {
    let volume = Volume::from_values(Dimensions::column(3), vec![1., 2., 3.])?;
    assert_eq!(volume.get(0, 0, 2)?, 3.);
    assert!(matches!(
        Volume::from_values(Dimensions::column(3), vec![1., 2.]),
        Err(Error::LengthMismatch {
            expected: 3,
            found: 2
        })
    ));
    assert!(matches!(
        Volume::from_values(Dimensions::new(2, 1, 1), vec![1.]),
        Err(Error::InvalidConfig(_))
    ));
    assert!(Volume::from_values(Dimensions::new(1, 2, 1), vec![1.]).is_err());
    Ok(())
}

#[test]
fn random_variance_matches_fan_in() {
    let mut rng = StdRng::seed_from_u64(0);
    let dimensions = Dimensions::new(10, 10, 100);
    let volume = Volume::random(dimensions, &mut rng);
    let n = volume.size() as f64;
    let mean = volume.values().iter().sum::<f64>() / n;
    let variance = volume
        .values()
        .iter()
        .map(|x| (x - mean) * (x - mean))
        .sum::<f64>()
        / n;
    assert_relative_eq!(mean, 0., epsilon = 1e-3);
    assert_relative_eq!(variance, 1. / n, max_relative = 0.05);
}

#[test]
fn random_is_seedable() {
    let dimensions = Dimensions::new(2, 2, 2);
    let a = Volume::random(dimensions, &mut StdRng::seed_from_u64(7));
    let b = Volume::random(dimensions, &mut StdRng::seed_from_u64(7));
    assert_eq!(a, b);
}

#[test]
fn clones() -> Result<()> {
    let mut volume = Volume::from_values(Dimensions::column(2), vec![1., 2.])?;
    volume.set_grad_index(1, 1.)?;
    let copy = volume.clone_values();
    assert_eq!(copy.values(), volume.values());
    assert_eq!(copy.gradients(), &[0., 0.]);
    let zeroed = volume.clone_zeroed();
    assert_eq!(zeroed.dimensions(), volume.dimensions());
    assert_eq!(zeroed.values(), &[0., 0.]);
    Ok(())
}

#[test]
fn add_from() -> Result<()> {
    let mut a = Volume::from_values(Dimensions::column(2), vec![1., 2.])?;
    let b = Volume::from_values(Dimensions::column(2), vec![10., 20.])?;
    a.add_from(&b)?;
    assert_eq!(a.values(), &[11., 22.]);
    a.add_from_scaled(&b, -0.5)?;
    assert_eq!(a.values(), &[6., 12.]);
    a.set_const(3.);
    assert_eq!(a.values(), &[3., 3.]);
    let c = Volume::zeros(Dimensions::column(3));
    assert!(matches!(
        a.add_from(&c),
        Err(Error::DimensionMismatch { .. })
    ));
    Ok(())
}

#[test]
fn array_view_uses_the_same_layout() -> Result<()> {
    let dimensions = Dimensions::new(3, 2, 2);
    let mut volume = Volume::zeros(dimensions);
    for (i, x) in volume.values_mut().iter_mut().enumerate() {
        *x = i as f64;
    }
    let array = volume.as_array()?;
    assert_eq!(array.dim(), (2, 3, 2));
    assert_eq!(array[[1, 2, 1]], volume.get(2, 1, 1)?);
    volume.as_array_mut()?[[0, 1, 0]] = -1.;
    assert_eq!(volume.get(1, 0, 0)?, -1.);
    assert_eq!(volume.grad_array()?.sum(), 0.);
    Ok(())
}

#[test]
fn serde() -> Result<()> {
    let volume = Volume::from_values(Dimensions::column(2), vec![0.5, -0.5])?;
    let json = serde_json::to_string(&volume)?;
    let volume2: Volume = serde_json::from_str(&json)?;
    assert_eq!(volume, volume2);
    let bad = r#"{
        "dimensions": {"width": 1, "height": 1, "depth": 2},
        "values": [1.0],
        "gradients": [0.0, 0.0]
    }"#;
    assert!(serde_json::from_str::<Volume>(bad).is_err());
    assert_eq!(Dimensions::new(4, 5, 6).to_string(), "4x5x6");
    Ok(())
}
