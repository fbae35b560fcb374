//! RGB recipe catalog and per-product compositing formulas
//!
//! Formulas read calibrated values (kelvin for IR, reflectance for visible)
//! in recipe order and produce unit-interval R, G, B per pixel.

use crate::core::enhance::CombinedLut;
use crate::core::render::{normalize, render_rgb, unit_to_u8};
use crate::types::{ChannelCode, GoesError, GoesResult, RgbImage};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Zenith angle assumed when no solar grid is available (twilight)
pub const DEFAULT_TWILIGHT_SZA_DEG: f32 = 80.0;
/// Full daylight below this zenith angle
pub const DAY_SZA_DEG: f32 = 70.0;
/// Full night above this zenith angle
pub const NIGHT_SZA_DEG: f32 = 90.0;

const KELVIN_OFFSET: f32 = 273.15;

/// Catalog grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Core,
    Basic,
    Atmospheric,
    Hazards,
    Weather,
    Composite,
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProductCategory::Core => "core",
            ProductCategory::Basic => "basic",
            ProductCategory::Atmospheric => "atmospheric",
            ProductCategory::Hazards => "hazards",
            ProductCategory::Weather => "weather",
            ProductCategory::Composite => "composite",
        };
        write!(f, "{}", name)
    }
}

/// Every RGB product the compositor knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RgbProductKind {
    Geocolor,
    CloudMicrophysics,
    TrueColor,
    DayCloudPhase,
    Airmass,
    SimpleWaterVapor,
    DifferentialWaterVapor,
    Dust,
    Ash,
    FireTemperature,
    DayLandCloudFire,
    DaySnowFog,
    NightMicrophysics,
    SplitWindow,
    SplitWindowDifference,
    DaySnowFogNightFog,
    Sandwich,
}

/// Static catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbRecipe {
    pub kind: RgbProductKind,
    pub name: &'static str,
    /// Inputs in the order the formula consumes them
    pub channels: &'static [ChannelCode],
    pub category: ProductCategory,
    pub formula: &'static str,
    /// Blends a day and a night rendition by solar zenith angle
    pub day_night: bool,
}

macro_rules! recipe {
    ($kind:ident, $name:expr, [$($ch:ident),+], $cat:ident, $formula:expr, $dn:expr) => {
        RgbRecipe {
            kind: RgbProductKind::$kind,
            name: $name,
            channels: &[$(ChannelCode::$ch),+],
            category: ProductCategory::$cat,
            formula: $formula,
            day_night: $dn,
        }
    };
}

static CATALOG: [RgbRecipe; 17] = [
    recipe!(Geocolor, "geocolor", [C01, C02, C03, C07, C13], Core, "true color by day, IR cloud and fog by night", true),
    recipe!(CloudMicrophysics, "cloud_microphysics", [C02, C05, C07, C13, C15], Core, "day cloud phase by day, night microphysics by night", true),
    recipe!(TrueColor, "true_color", [C01, C02, C03], Basic, "synthetic green, cos(SZA) corrected, gamma 2.2", true),
    recipe!(DayCloudPhase, "day_cloud_phase", [C02, C05, C13], Basic, "C13 7.5..-53.5 C / C02 0..0.78 / C05 0.01..0.59", false),
    recipe!(Airmass, "airmass", [C08, C10, C12, C13], Atmospheric, "C08-C10 / C12-C13 / C08 inverted", false),
    recipe!(SimpleWaterVapor, "simple_water_vapor", [C08, C09, C10], Atmospheric, "(T+70)/120 per channel", false),
    recipe!(DifferentialWaterVapor, "differential_water_vapor", [C08, C10], Atmospheric, "(C08-C10+20)/40 gray", false),
    recipe!(Dust, "dust", [C11, C13, C14, C15], Hazards, "C15-C13 / C14-C11 gamma 2.5 / C13", false),
    recipe!(Ash, "ash", [C11, C13, C15], Hazards, "C15-C13 / C13-C11 / C11", false),
    recipe!(FireTemperature, "fire_temperature", [C07, C06, C05], Hazards, "C07 gamma 0.4 / C06 / C05", false),
    recipe!(DayLandCloudFire, "day_land_cloud_fire", [C06, C03, C02], Hazards, "C06 / C03 / C02 reflectance", false),
    recipe!(DaySnowFog, "day_snow_fog", [C03, C05, C07, C13], Weather, "C03 / C05 / C07-C13, gamma 1.7", false),
    recipe!(NightMicrophysics, "night_microphysics", [C07, C13, C15], Weather, "C15-C13 / C13-C07 / C13", false),
    recipe!(SplitWindow, "split_window", [C13, C15], Weather, "C13-C15 diverging ramp", false),
    recipe!(SplitWindowDifference, "split_window_difference", [C13, C15], Weather, "(C13-C15+10)/20 gray", false),
    recipe!(DaySnowFogNightFog, "day_snow_fog_night_fog", [C03, C05, C07, C13], Weather, "day snow/fog by day, C13-C07 fog by night", true),
    recipe!(Sandwich, "sandwich", [C02, C13], Composite, "C02 texture with cold C13 tops colorized", true),
];

impl RgbProductKind {
    pub const ALL: [RgbProductKind; 17] = [
        RgbProductKind::Geocolor,
        RgbProductKind::CloudMicrophysics,
        RgbProductKind::TrueColor,
        RgbProductKind::DayCloudPhase,
        RgbProductKind::Airmass,
        RgbProductKind::SimpleWaterVapor,
        RgbProductKind::DifferentialWaterVapor,
        RgbProductKind::Dust,
        RgbProductKind::Ash,
        RgbProductKind::FireTemperature,
        RgbProductKind::DayLandCloudFire,
        RgbProductKind::DaySnowFog,
        RgbProductKind::NightMicrophysics,
        RgbProductKind::SplitWindow,
        RgbProductKind::SplitWindowDifference,
        RgbProductKind::DaySnowFogNightFog,
        RgbProductKind::Sandwich,
    ];

    pub fn recipe(self) -> &'static RgbRecipe {
        // CATALOG is declared in the same order as ALL
        &CATALOG[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.recipe().name
    }

    pub fn channels(self) -> &'static [ChannelCode] {
        self.recipe().channels
    }

    pub fn category(self) -> ProductCategory {
        self.recipe().category
    }

    pub fn is_day_night(self) -> bool {
        self.recipe().day_night
    }
}

impl fmt::Display for RgbProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RgbProductKind {
    type Err = GoesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RgbProductKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| GoesError::UnknownProduct(s.to_string()))
    }
}

/// The whole catalog
pub fn catalog() -> &'static [RgbRecipe] {
    &CATALOG
}

/// Calibrated inputs for one product, all of one shape
pub struct CompositeInputs<'a> {
    /// Views in recipe order
    pub channels: Vec<ArrayView2<'a, f32>>,
    /// Solar zenith (degrees) at the product shape, if known
    pub sza: Option<ArrayView2<'a, f32>>,
}

impl<'a> CompositeInputs<'a> {
    pub fn shape(&self) -> (usize, usize) {
        self.channels.first().map(|c| c.dim()).unwrap_or((0, 0))
    }
}

/// Weight of the day rendition: 1 below 70 deg, 0 beyond 90 deg.
/// Unknown angles count as twilight.
#[inline]
pub fn day_weight(sza: f32) -> f32 {
    let sza = if sza.is_finite() { sza } else { DEFAULT_TWILIGHT_SZA_DEG };
    ((NIGHT_SZA_DEG - sza) / (NIGHT_SZA_DEG - DAY_SZA_DEG)).clamp(0.0, 1.0)
}

#[inline]
fn blend(day: [f32; 3], night: [f32; 3], w: f32) -> [f32; 3] {
    [
        day[0] * w + night[0] * (1.0 - w),
        day[1] * w + night[1] * (1.0 - w),
        day[2] * w + night[2] * (1.0 - w),
    ]
}

#[inline]
fn gamma(value: f32, g: f32) -> f32 {
    value.clamp(0.0, 1.0).powf(1.0 / g)
}

#[inline]
fn celsius(kelvin: f32) -> f32 {
    kelvin - KELVIN_OFFSET
}

fn true_color_day(blue: f32, red: f32, nir: f32, sza: f32) -> [f32; 3] {
    let cos = sza.to_radians().cos().max(0.1);
    let green = 0.45 * red + 0.1 * nir + 0.45 * blue;
    let correct = |v: f32| gamma(v / cos, 2.2);
    [correct(red), correct(green), correct(blue)]
}

fn day_cloud_phase(t13: f32, c02: f32, c05: f32) -> [f32; 3] {
    [
        normalize(celsius(t13), 7.5, -53.5),
        normalize(c02, 0.0, 0.78),
        normalize(c05, 0.01, 0.59),
    ]
}

fn night_microphysics(t07: f32, t13: f32, t15: f32) -> [f32; 3] {
    [
        normalize(t15 - t13, -6.7, 2.6),
        normalize(t13 - t07, -3.1, 5.2),
        normalize(t13, 243.55, 292.65),
    ]
}

fn day_snow_fog(c03: f32, c05: f32, t07: f32, t13: f32) -> [f32; 3] {
    const G: f32 = 1.7;
    [gamma(c03, G), gamma(c05 / 0.7, G), gamma((t07 - t13) / 30.0, G)]
}

/// Cold IR rendered bright, with a blue-gray tint where C13-C07 flags fog
fn night_ir_fog(t07: f32, t13: f32) -> [f32; 3] {
    let gray = normalize(t13, 300.0, 200.0);
    let fog = normalize(t13 - t07, 0.0, 5.0) * 0.6;
    const FOG: [f32; 3] = [0.55, 0.7, 0.85];
    [
        gray * (1.0 - fog) + FOG[0] * fog,
        gray * (1.0 - fog) + FOG[1] * fog,
        gray * (1.0 - fog) + FOG[2] * fog,
    ]
}

/// Evaluate `pixel(values, sza)` everywhere. `values` holds the inputs in
/// recipe order; `sza` is the solar zenith or the twilight default.
fn pixelwise<F>(inputs: &CompositeInputs<'_>, pixel: F) -> RgbImage
where
    F: Fn(&[f32], f32) -> [f32; 3] + Sync + Send,
{
    let (rows, cols) = inputs.shape();
    let n = inputs.channels.len().min(5);
    let channels = &inputs.channels;
    let sza = inputs.sza.as_ref();

    render_rgb(rows, cols, |r, c| {
        let mut values = [f32::NAN; 5];
        for (slot, view) in values.iter_mut().zip(channels.iter()).take(n) {
            *slot = view[[r, c]];
        }
        let angle = sza.map_or(DEFAULT_TWILIGHT_SZA_DEG, |s| s[[r, c]]);
        let rgb = pixel(&values[..n], angle);
        [unit_to_u8(rgb[0]), unit_to_u8(rgb[1]), unit_to_u8(rgb[2])]
    })
}

/// Build one product from inputs already checked for presence and shape
pub fn compose(kind: RgbProductKind, inputs: &CompositeInputs<'_>) -> GoesResult<RgbImage> {
    let expected = kind.channels().len();
    if inputs.channels.len() != expected {
        return Err(GoesError::Processing(format!(
            "{} expects {} inputs, got {}",
            kind,
            expected,
            inputs.channels.len()
        )));
    }
    let shape = inputs.shape();
    if let Some(view) = inputs.channels.iter().find(|v| v.dim() != shape) {
        return Err(GoesError::ShapeMismatch {
            context: kind.to_string(),
            expected: shape,
            found: view.dim(),
        });
    }

    let image = match kind {
        RgbProductKind::Geocolor => pixelwise(inputs, |v, sza| {
            let day = true_color_day(v[0], v[1], v[2], sza);
            let night = night_ir_fog(v[3], v[4]);
            blend(day, night, day_weight(sza))
        }),
        RgbProductKind::CloudMicrophysics => pixelwise(inputs, |v, sza| {
            let day = day_cloud_phase(v[3], v[0], v[1]);
            let night = night_microphysics(v[2], v[3], v[4]);
            blend(day, night, day_weight(sza))
        }),
        RgbProductKind::TrueColor => pixelwise(inputs, |v, sza| {
            blend(true_color_day(v[0], v[1], v[2], sza), [0.0; 3], day_weight(sza))
        }),
        RgbProductKind::DayCloudPhase => pixelwise(inputs, |v, _| day_cloud_phase(v[2], v[0], v[1])),
        RgbProductKind::Airmass => pixelwise(inputs, |v, _| {
            [
                normalize(v[0] - v[1], -26.2, 0.6),
                normalize(v[2] - v[3], -43.2, 6.7),
                normalize(v[0], 243.9, 208.5),
            ]
        }),
        RgbProductKind::SimpleWaterVapor => pixelwise(inputs, |v, _| {
            let ramp = |t: f32| normalize(celsius(t), -70.0, 50.0);
            [ramp(v[0]), ramp(v[1]), ramp(v[2])]
        }),
        RgbProductKind::DifferentialWaterVapor => pixelwise(inputs, |v, _| {
            let g = normalize(v[0] - v[1], -20.0, 20.0);
            [g, g, g]
        }),
        RgbProductKind::Dust => pixelwise(inputs, |v, _| {
            [
                normalize(v[3] - v[1], -6.7, 2.6),
                gamma(normalize(v[2] - v[0], -0.5, 20.0), 2.5),
                normalize(v[1], 261.2, 288.7),
            ]
        }),
        RgbProductKind::Ash => pixelwise(inputs, |v, _| {
            [
                normalize(v[2] - v[1], -4.0, 4.0),
                normalize(v[1] - v[0], -2.0, 10.0),
                normalize(celsius(v[0]), -30.0, 110.0),
            ]
        }),
        RgbProductKind::FireTemperature => pixelwise(inputs, |v, _| {
            [
                gamma(normalize(v[0], 273.0, 333.0), 0.4),
                normalize(v[1], 0.0, 1.0),
                normalize(v[2], 0.0, 0.75),
            ]
        }),
        RgbProductKind::DayLandCloudFire => pixelwise(inputs, |v, _| {
            [v[0].clamp(0.0, 1.0), v[1].clamp(0.0, 1.0), v[2].clamp(0.0, 1.0)]
        }),
        RgbProductKind::DaySnowFog => pixelwise(inputs, |v, _| day_snow_fog(v[0], v[1], v[2], v[3])),
        RgbProductKind::NightMicrophysics => {
            pixelwise(inputs, |v, _| night_microphysics(v[0], v[1], v[2]))
        }
        RgbProductKind::SplitWindow => pixelwise(inputs, |v, _| {
            let n = normalize(v[0] - v[1], -3.0, 10.0);
            [n, 1.0 - (n - 0.5).abs() * 2.0, 1.0 - n]
        }),
        RgbProductKind::SplitWindowDifference => pixelwise(inputs, |v, _| {
            let g = normalize(v[0] - v[1], -10.0, 10.0);
            [g, g, g]
        }),
        RgbProductKind::DaySnowFogNightFog => pixelwise(inputs, |v, sza| {
            let day = day_snow_fog(v[0], v[1], v[2], v[3]);
            let fog = 1.0 - normalize(v[3] - v[2], -90.0, 15.0);
            let night = [fog * 0.3, fog * 0.8, fog * 0.9];
            blend(day, night, day_weight(sza))
        }),
        RgbProductKind::Sandwich => {
            let lut = CombinedLut::build(ChannelCode::C13);
            pixelwise(inputs, move |v, sza| {
                let t = celsius(v[1]);
                let day_gray = v[0].clamp(0.0, 1.0).sqrt();
                let night_gray = normalize(v[1], 300.0, 200.0);
                let gray = day_gray * day_weight(sza) + night_gray * (1.0 - day_weight(sza));
                let alpha = if t <= -15.0 { normalize(t, -15.0, -45.0) * 0.5 + 0.5 } else { 0.0 };
                let color = lut.lookup(t);
                let tint = |k: usize| color[k] as f32 / 255.0;
                [
                    gray * (1.0 - alpha) + tint(0) * alpha,
                    gray * (1.0 - alpha) + tint(1) * alpha,
                    gray * (1.0 - alpha) + tint(2) * alpha,
                ]
            })
        }
    };

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_matches_kinds() {
        assert_eq!(catalog().len(), 17);
        for kind in RgbProductKind::ALL {
            assert_eq!(kind.recipe().kind, kind);
            assert_eq!(kind.name().parse::<RgbProductKind>().unwrap(), kind);
        }
        let names: HashSet<_> = catalog().iter().map(|r| r.name).collect();
        assert_eq!(names.len(), 17);
        assert!(matches!(
            "rainbow".parse::<RgbProductKind>(),
            Err(GoesError::UnknownProduct(_))
        ));
    }

    #[test]
    fn test_recipe_channels() {
        assert_eq!(
            RgbProductKind::TrueColor.channels(),
            &[ChannelCode::C01, ChannelCode::C02, ChannelCode::C03]
        );
        assert_eq!(
            RgbProductKind::FireTemperature.channels(),
            &[ChannelCode::C07, ChannelCode::C06, ChannelCode::C05]
        );
        assert_eq!(RgbProductKind::Airmass.category(), ProductCategory::Atmospheric);
        assert!(RgbProductKind::Sandwich.is_day_night());
        assert!(!RgbProductKind::Ash.is_day_night());
    }

    #[test]
    fn test_day_weight_band() {
        assert_eq!(day_weight(30.0), 1.0);
        assert_eq!(day_weight(70.0), 1.0);
        assert_eq!(day_weight(80.0), 0.5);
        assert_eq!(day_weight(95.0), 0.0);
        assert_eq!(day_weight(f32::NAN), 0.5);
    }

    #[test]
    fn test_split_window_difference_gray() {
        let t13 = Array2::from_elem((2, 2), 280.0f32);
        let t15 = Array2::from_elem((2, 2), 280.0f32);
        let inputs = CompositeInputs {
            channels: vec![t13.view(), t15.view()],
            sza: None,
        };
        let image = compose(RgbProductKind::SplitWindowDifference, &inputs).unwrap();
        assert_eq!(image.dim(), (2, 2, 3));
        assert_eq!(image[[0, 0, 0]], 128);
        assert_eq!(image[[1, 1, 2]], 128);
    }

    #[test]
    fn test_ash_formula() {
        // T15-T13 = 0 -> 0.5, T13-T11 = 4 -> 0.5, T11 = 40 C -> 0.5
        let t11 = Array2::from_elem((1, 1), 313.15f32);
        let t13 = Array2::from_elem((1, 1), 317.15f32);
        let t15 = Array2::from_elem((1, 1), 317.15f32);
        let inputs = CompositeInputs {
            channels: vec![t11.view(), t13.view(), t15.view()],
            sza: None,
        };
        let image = compose(RgbProductKind::Ash, &inputs).unwrap();
        for band in 0..3 {
            assert!((image[[0, 0, band]] as i32 - 128).abs() <= 1);
        }
    }

    #[test]
    fn test_true_color_night_is_black() {
        let refl = Array2::from_elem((2, 2), 0.5f32);
        let sza = Array2::from_elem((2, 2), 120.0f32);
        let inputs = CompositeInputs {
            channels: vec![refl.view(), refl.view(), refl.view()],
            sza: Some(sza.view()),
        };
        let image = compose(RgbProductKind::TrueColor, &inputs).unwrap();
        assert!(image.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let a = Array2::from_elem((2, 2), 280.0f32);
        let b = Array2::from_elem((4, 4), 280.0f32);
        let inputs = CompositeInputs {
            channels: vec![a.view(), b.view()],
            sza: None,
        };
        assert!(matches!(
            compose(RgbProductKind::SplitWindow, &inputs),
            Err(GoesError::ShapeMismatch { .. })
        ));
    }
}
