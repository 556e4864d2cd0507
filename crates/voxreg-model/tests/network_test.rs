use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use voxreg_model::{
    BackboneKind, KernelInit, LocalNetConfig, LossBundle, Method, ModelConfig, ModelError, ModelInputs,
    RegistrationModel, UNetConfig,
};

type B = NdArray<f32>;

fn random_inputs(batch: usize, moving: [usize; 3], fixed: [usize; 3], index_size: usize) -> ModelInputs<B> {
    let device = Default::default();
    let [mx, my, mz] = moving;
    let [fx, fy, fz] = fixed;
    ModelInputs::new(
        Tensor::random([batch, mx, my, mz], Distribution::Default, &device),
        Tensor::random([batch, fx, fy, fz], Distribution::Default, &device),
        Tensor::random([batch, mx, my, mz], Distribution::Default, &device),
        Tensor::zeros([batch, index_size], &device),
    )
}

fn local_config(method: Method, size: [usize; 3]) -> ModelConfig {
    let mut config = ModelConfig::new(size, size, method);
    config.local = LocalNetConfig::new()
        .with_num_channel_initial(2)
        .with_extract_levels(vec![0, 1]);
    config
}

#[test]
fn test_ddf_local_end_to_end() {
    let config = local_config(Method::Ddf, [8, 8, 8]);
    let model = RegistrationModel::<B>::new(&config, &Default::default()).unwrap();

    let inputs = random_inputs(4, [8, 8, 8], [8, 8, 8], 2);
    let output = model.forward(inputs.clone()).unwrap();

    assert_eq!(output.pred_fixed_label.dims(), [4, 8, 8, 8]);
    assert_eq!(output.ddf.as_ref().map(|d| d.dims()), Some([4, 3, 8, 8, 8]));
    assert!(output.dvf.is_none());

    let losses = model.losses(&inputs, &output, None).unwrap();
    let total: f32 = losses.total.clone().into_scalar();
    assert!(total.is_finite() && total >= 0.0, "total {total}");
    assert!(losses.get(LossBundle::<B>::WEIGHTED_IMAGE_SIMILARITY).is_some());
    assert!(losses.get(LossBundle::<B>::WEIGHTED_REGULARIZATION).is_some());
    assert!(losses.get(LossBundle::<B>::LABEL).is_none());
}

#[test]
fn test_zero_initialized_head_warps_identically() {
    let config = local_config(Method::Ddf, [8, 8, 8]);
    let model = RegistrationModel::<B>::new(&config, &Default::default()).unwrap();
    let inputs = random_inputs(2, [8, 8, 8], [8, 8, 8], 2);

    let output = model.forward(inputs.clone()).unwrap();
    let diff: f32 = (output.pred_fixed_label - inputs.moving_label).abs().max().into_scalar();
    assert!(diff < 1e-6);
}

#[test]
fn test_output_shape_matches_fixed_image() {
    let moving = [6, 9, 7];
    let fixed = [8, 6, 10];
    for backbone in [BackboneKind::Local, BackboneKind::UNet] {
        for method in [Method::Ddf, Method::Dvf, Method::Conditional, Method::Seg] {
            let mut config = ModelConfig::new(moving, fixed, method).with_integration_steps(3);
            config.backbone.name = backbone;
            config.backbone.out_kernel_initializer = KernelInit::GlorotUniform;
            config.local = LocalNetConfig::new()
                .with_num_channel_initial(2)
                .with_extract_levels(vec![0, 2]);
            config.unet = UNetConfig::new().with_num_channel_initial(2).with_depth(2);

            let model = RegistrationModel::<B>::new(&config, &Default::default()).unwrap();
            let output = model.forward(random_inputs(2, moving, fixed, 2)).unwrap();

            assert_eq!(output.pred_fixed_label.dims(), [2, 8, 6, 10], "{backbone} {method}");
            assert_eq!(output.ddf.is_some(), method.has_field());
            assert_eq!(output.dvf.is_some(), method == Method::Dvf);
        }
    }
}

#[test]
fn test_label_term_only_with_fixed_label() {
    let device = Default::default();
    let config = local_config(Method::Dvf, [8, 8, 8]);
    let model = RegistrationModel::<B>::new(&config, &device).unwrap();
    let inputs = random_inputs(2, [8, 8, 8], [8, 8, 8], 2);
    let output = model.forward(inputs.clone()).unwrap();

    let fixed_label = Tensor::<B, 4>::random([2, 8, 8, 8], Distribution::Default, &device);
    let losses = model.losses(&inputs, &output, Some(fixed_label)).unwrap();

    let names: Vec<String> = losses.terms.iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(
        names,
        vec![
            "loss/image_similarity",
            "loss/weighted_image_similarity",
            "loss/regularization",
            "loss/weighted_regularization",
            "loss/label",
            "loss/weighted_label",
        ]
    );

    let sum: f32 = names
        .iter()
        .filter(|n| n.starts_with("loss/weighted_"))
        .map(|n| losses.get(n).unwrap().clone().into_scalar())
        .sum();
    let total: f32 = losses.total.into_scalar();
    assert!((sum - total).abs() < 1e-5);
}

#[test]
fn test_zero_image_weight_skips_image_term() {
    let mut config = local_config(Method::Ddf, [8, 8, 8]);
    config.loss.similarity.image.weight = 0.0;
    let model = RegistrationModel::<B>::new(&config, &Default::default()).unwrap();
    let inputs = random_inputs(1, [8, 8, 8], [8, 8, 8], 2);
    let output = model.forward(inputs.clone()).unwrap();

    let losses = model.losses(&inputs, &output, None).unwrap();
    assert!(losses.get(LossBundle::<B>::IMAGE_SIMILARITY).is_none());
    assert!(losses.get(LossBundle::<B>::REGULARIZATION).is_some());
}

#[test]
fn test_segmentation_has_no_field_terms() {
    let device = Default::default();
    let config = local_config(Method::Seg, [8, 8, 8]);
    let model = RegistrationModel::<B>::new(&config, &device).unwrap();
    let inputs = random_inputs(2, [8, 8, 8], [8, 8, 8], 2);
    let output = model.forward(inputs.clone()).unwrap();

    let empty = model.losses(&inputs, &output, None).unwrap();
    assert!(empty.is_empty());
    let total: f32 = empty.total.into_scalar();
    assert_eq!(total, 0.0);

    let fixed_label = Tensor::<B, 4>::random([2, 8, 8, 8], Distribution::Default, &device);
    let metrics = model.metrics(&output, fixed_label).unwrap();
    let values = metrics.to_scalars();
    assert_eq!(values.len(), 4);
    assert!(values.iter().all(|(_, v)| v.is_finite()));
}

#[test]
fn test_wrong_input_shape_is_rejected() {
    let config = local_config(Method::Ddf, [8, 8, 8]);
    let model = RegistrationModel::<B>::new(&config, &Default::default()).unwrap();

    let inputs = random_inputs(2, [8, 8, 8], [8, 8, 6], 2);
    match model.forward(inputs) {
        Err(ModelError::ShapeMismatch { name, .. }) => assert_eq!(name, "fixed_image"),
        other => panic!("expected shape mismatch, got {other:?}"),
    }

    let inputs = random_inputs(2, [8, 8, 8], [8, 8, 8], 3);
    assert!(matches!(
        model.forward(inputs),
        Err(ModelError::ShapeMismatch { .. })
    ));
}
