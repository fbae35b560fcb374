use approx::assert_abs_diff_eq;
use goes_rgb::core::calibrate::{
    brightness_temp_to_radiance, fallback_planck, radiance_to_brightness_temp, radiance_to_reflectance,
};
use goes_rgb::core::CalibrationEngine;
use goes_rgb::types::{CalibrationConstants, ChannelCode, ChannelRecord, PlanckConstants, RawPixels};
use chrono::{TimeZone, Utc};
use ndarray::{array, Array2};

#[test]
fn test_planck_round_trip_all_ir_bands() {
    let _ = env_logger::builder().is_test(true).try_init();

    let temperatures = array![[190.0f32, 220.5], [265.25, 310.0]];
    for band in 7..=16u8 {
        let code = ChannelCode::new(band).expect("valid band");
        let constants = CalibrationConstants::default();
        let radiance = brightness_temp_to_radiance(&temperatures, code, &constants)
            .expect("radiance from temperature");
        let recovered = radiance_to_brightness_temp(&radiance, code, &constants)
            .expect("temperature from radiance");

        for (t, r) in temperatures.iter().zip(recovered.iter()) {
            assert_abs_diff_eq!(*t, *r, epsilon = 1e-3);
        }
        println!("{}: round trip ok", code);
    }
}

#[test]
fn test_record_constants_take_precedence() {
    let _ = env_logger::builder().is_test(true).try_init();

    let c13 = fallback_planck(ChannelCode::C13);
    let shifted = PlanckConstants {
        bc1: c13.bc1 + 1.0,
        ..c13
    };
    let radiance = Array2::from_elem((2, 2), 100.0f32);

    let fallback = radiance_to_brightness_temp(&radiance, ChannelCode::C13, &CalibrationConstants::default())
        .expect("fallback calibration");
    let explicit =
        radiance_to_brightness_temp(&radiance, ChannelCode::C13, &CalibrationConstants::with_planck(shifted))
            .expect("explicit calibration");

    // bc1 is subtracted before dividing by bc2
    assert_abs_diff_eq!(
        fallback[[0, 0]] - explicit[[0, 0]],
        (1.0 / c13.bc2) as f32,
        epsilon = 1e-3
    );
}

#[test]
fn test_partial_constants_fall_back_to_table() {
    let radiance = Array2::from_elem((2, 2), 50.0f32);
    let partial = CalibrationConstants {
        planck_fk1: Some(1.0),
        ..CalibrationConstants::default()
    };
    let a = radiance_to_brightness_temp(&radiance, ChannelCode::C10, &partial).expect("partial");
    let b = radiance_to_brightness_temp(&radiance, ChannelCode::C10, &CalibrationConstants::default())
        .expect("default");
    assert_eq!(a, b);
}

#[test]
fn test_reflectance_paths() {
    let radiance = array![[0.0f32, 50.0], [100.0, f32::NAN]];

    let scaled = radiance_to_reflectance(&radiance, Some(0.002));
    assert_abs_diff_eq!(scaled[[1, 0]], 0.2, epsilon = 1e-6);

    let normalized = radiance_to_reflectance(&radiance, None);
    assert_abs_diff_eq!(normalized[[0, 1]], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(normalized[[1, 0]], 1.0, epsilon = 1e-6);

    let zeros = Array2::<f32>::zeros((3, 3));
    assert_eq!(radiance_to_reflectance(&zeros, None), zeros);
}

#[test]
fn test_engine_dispatches_by_class() {
    let start = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
    let engine = CalibrationEngine::new();

    let visible = ChannelRecord::radiance(ChannelCode::C02, Array2::from_elem((2, 2), 200.0), start)
        .with_calibration(CalibrationConstants::with_kappa0(0.0025));
    let out = engine.calibrate(&visible).expect("visible calibration");
    assert_abs_diff_eq!(out.data[[0, 0]], 0.5, epsilon = 1e-6);

    let l2 = ChannelRecord::calibrated(ChannelCode::C13, Array2::from_elem((2, 2), 285.0), start);
    assert!(matches!(l2.data, RawPixels::Calibrated(_)));
    let out = engine.calibrate(&l2).expect("pre-calibrated passthrough");
    assert_eq!(out.data[[1, 1]], 285.0);
}
