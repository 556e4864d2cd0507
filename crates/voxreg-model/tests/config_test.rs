use burn::config::Config;
use burn_ndarray::NdArray;
use voxreg_model::{EnergyKind, LocalNetConfig, Method, ModelConfig, ModelError, RegistrationModel};

type B = NdArray<f32>;

#[test]
fn test_extract_level_beyond_depth_fails_at_build() {
    let mut config = ModelConfig::new([8, 8, 8], [8, 8, 8], Method::Ddf);
    config.local = LocalNetConfig::new()
        .with_num_channel_initial(2)
        .with_extract_levels(vec![3])
        .with_depth(Some(1));

    let err = RegistrationModel::<B>::new(&config, &Default::default()).unwrap_err();
    assert_eq!(err, ModelError::ExtractLevelOutOfRange { level: 3, max_level: 1 });
    assert!(err.is_configuration());
}

#[test]
fn test_unknown_method_is_named() {
    let json = r#"{
        "moving_image_size": [8, 8, 8],
        "fixed_image_size": [8, 8, 8],
        "method": "foo"
    }"#;
    let err = ModelConfig::from_json_str(json).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("foo"), "{err}");

    let err = "foo".parse::<Method>().unwrap_err();
    assert_eq!(err, ModelError::UnknownMethod("foo".to_string()));
}

#[test]
fn test_unknown_backbone_is_named() {
    let json = r#"{
        "moving_image_size": [8, 8, 8],
        "fixed_image_size": [8, 8, 8],
        "method": "ddf",
        "backbone": { "name": "resnet", "out_activation": "", "out_kernel_initializer": "zeros" }
    }"#;
    let err = ModelConfig::from_json_str(json).unwrap_err();
    assert!(err.to_string().contains("resnet"), "{err}");
}

#[test]
fn test_bending_needs_five_voxels() {
    let mut config = ModelConfig::new([4, 4, 4], [4, 8, 8], Method::Ddf);
    config.local = LocalNetConfig::new()
        .with_num_channel_initial(2)
        .with_extract_levels(vec![0]);
    assert!(RegistrationModel::<B>::new(&config, &Default::default()).is_err());

    config.loss.regularization.energy_type = EnergyKind::GradientL2;
    assert!(RegistrationModel::<B>::new(&config, &Default::default()).is_ok());

    // No field, no regularization constraint.
    config.loss.regularization.energy_type = EnergyKind::Bending;
    config.method = Method::Seg;
    assert!(RegistrationModel::<B>::new(&config, &Default::default()).is_ok());
}

#[test]
fn test_config_file_round_trip() {
    let mut config = ModelConfig::new([10, 12, 8], [8, 8, 8], Method::Dvf).with_integration_steps(5);
    config.local = LocalNetConfig::new().with_extract_levels(vec![1, 2]);

    let path = std::env::temp_dir().join(format!("voxreg-model-config-{}.json", std::process::id()));
    config.save(&path).unwrap();
    let loaded = ModelConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.method, Method::Dvf);
    assert_eq!(loaded.moving_image_size, [10, 12, 8]);
    assert_eq!(loaded.local.extract_levels, vec![1, 2]);
    assert_eq!(loaded.integration_steps, 5);

    let missing = ModelConfig::from_file(path.with_extension("missing"));
    assert!(matches!(missing, Err(ModelError::Config(_))));
}
