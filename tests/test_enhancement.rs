use goes_rgb::core::enhance::{CombinedLut, TemperatureCurve, LUT_MAX_CELSIUS, LUT_MIN_CELSIUS};
use goes_rgb::core::{EnhancedChannel, EnhancementEngine};
use goes_rgb::core::calibrate::CalibratedChannel;
use goes_rgb::types::{ChannelClass, ChannelCode, ChannelFamily};
use ndarray::{array, Array2};

fn pixel(image: &ndarray::Array3<u8>, r: usize, c: usize) -> [u8; 3] {
    [image[[r, c, 0]], image[[r, c, 1]], image[[r, c, 2]]]
}

#[test]
fn test_table_boundary_colors() {
    let _ = env_logger::builder().is_test(true).try_init();

    let cases = [
        (ChannelCode::C07, [122, 122, 122], [0, 0, 0]),
        (ChannelCode::C08, [9, 239, 227], [0, 0, 0]),
        (ChannelCode::C13, [255, 255, 255], [5, 5, 5]),
        (ChannelCode::C06, [0, 0, 0], [255, 255, 255]),
    ];

    for (code, cold, warm) in cases {
        let lut = CombinedLut::build(code);
        assert_eq!(lut.lookup(LUT_MIN_CELSIUS as f32), cold, "{} cold end", code);
        assert_eq!(lut.lookup(LUT_MAX_CELSIUS as f32), warm, "{} warm end", code);
        // beyond the table range clamps to the boundary entry
        assert_eq!(lut.lookup(-400.0), cold, "{} below range", code);
        assert_eq!(lut.lookup(400.0), warm, "{} above range", code);
        println!("{}: cold {:?} warm {:?}", code, cold, warm);
    }
}

#[test]
fn test_curves_are_monotonic() {
    let rising = [
        ChannelFamily::WaterVapor,
        ChannelFamily::LongwaveWindow,
        ChannelFamily::Unclassified,
    ];
    for family in rising {
        let curve = TemperatureCurve::for_family(family);
        assert!(
            curve.values().windows(2).all(|w| w[0] <= w[1]),
            "{:?} curve should not decrease",
            family
        );
    }

    // the shortwave curve is inverted: warmer is darker
    let shortwave = TemperatureCurve::for_family(ChannelFamily::ShortwaveIr);
    assert!(shortwave.values().windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(shortwave.values()[0], 255);
    assert_eq!(shortwave.values()[shortwave.values().len() - 1], 0);
}

#[test]
fn test_tables_rebuild_byte_identical() {
    for band in 7..=16u8 {
        let code = ChannelCode::new(band).expect("valid band");
        let a = CombinedLut::build(code).to_bytes();
        let b = CombinedLut::build(code).to_bytes();
        assert_eq!(a, b, "{} table differs between builds", code);
    }

    let first = EnhancementEngine::default();
    let second = EnhancementEngine::default();
    assert_eq!(
        first.combined_lut(ChannelCode::C13).expect("table").to_bytes(),
        second.combined_lut(ChannelCode::C13).expect("table").to_bytes()
    );
}

#[test]
fn test_enhance_by_class() {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = EnhancementEngine::default();

    let ir = CalibratedChannel {
        code: ChannelCode::C13,
        class: ChannelClass::Ir,
        data: array![[123.15f32, 423.15], [f32::NAN, 300.0]],
    };
    match engine.enhance(&ir).expect("ir enhancement") {
        EnhancedChannel::Color(rgb) => {
            assert_eq!(rgb.dim(), (2, 2, 3));
            assert_eq!(pixel(&rgb, 0, 0), [255, 255, 255]);
            assert_eq!(pixel(&rgb, 0, 1), [5, 5, 5]);
            assert_eq!(pixel(&rgb, 1, 0), [0, 0, 0]);
        }
        other => panic!("expected color output, got {} bands", other.bands()),
    }

    let visible = CalibratedChannel {
        code: ChannelCode::C02,
        class: ChannelClass::Visible,
        data: Array2::from_elem((3, 4), 0.25),
    };
    match engine.enhance(&visible).expect("visible enhancement") {
        EnhancedChannel::Gray(gray) => {
            assert_eq!(gray.dim(), (3, 4));
            assert!(gray.iter().all(|&v| v == 127));
        }
        other => panic!("expected gray output, got {} bands", other.bands()),
    }
}

#[test]
fn test_fast_and_direct_paths_agree_on_flat_regions() {
    let fast = EnhancementEngine::new(true);
    let direct = EnhancementEngine::new(false);
    // outside every family's breakpoint span
    let kelvin = array![[273.15f32 - 145.0, 273.15 + 145.0]];
    for code in [ChannelCode::C07, ChannelCode::C09, ChannelCode::C14] {
        assert_eq!(
            fast.enhance_ir(&kelvin, code).expect("fast"),
            direct.enhance_ir(&kelvin, code).expect("direct"),
            "{}",
            code
        );
    }
}
