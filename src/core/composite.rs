use crate::core::resample::resample_to_shape;
use crate::core::rgb_formulas::{compose, CompositeInputs, ProductCategory, RgbProductKind};
use crate::core::solar::SolarAngleGrid;
use crate::core::store::ChannelStore;
use crate::types::{ChannelCode, GoesError, GoesResult, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Instant;

/// Largest relative difference between row and column scale factors that
/// still counts as one grid at another resolution
const ASPECT_TOLERANCE: f64 = 0.01;

/// A finished RGB product
#[derive(Debug, Clone)]
pub struct RgbProduct {
    pub kind: RgbProductKind,
    pub image: RgbImage,
    pub channels: Vec<ChannelCode>,
    pub category: ProductCategory,
    pub build_time_s: f64,
    /// A solar grid (rather than the twilight default) drove day/night blending
    pub used_solar_angles: bool,
}

impl RgbProduct {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn shape(&self) -> (usize, usize) {
        let (r, c, _) = self.image.dim();
        (r, c)
    }
}

/// Per-category counts in the build report
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryReport {
    pub built: Vec<String>,
    pub failed: Vec<String>,
}

/// All products of one run plus the reasons any were skipped
#[derive(Debug, Clone, Default)]
pub struct RgbProductSet {
    pub products: BTreeMap<RgbProductKind, RgbProduct>,
    pub failures: BTreeMap<String, String>,
    pub total_time_s: f64,
}

impl RgbProductSet {
    pub fn get(&self, name: &str) -> Option<&RgbProduct> {
        name.parse::<RgbProductKind>()
            .ok()
            .and_then(|kind| self.products.get(&kind))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.products.keys().map(|k| k.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn failure(&self, name: &str) -> Option<&str> {
        self.failures.get(name).map(String::as_str)
    }

    pub fn size_bytes(&self) -> usize {
        self.products.values().map(|p| p.image.len()).sum()
    }

    /// Built and failed products grouped by catalog category
    pub fn by_category(&self) -> BTreeMap<ProductCategory, CategoryReport> {
        let mut report: BTreeMap<ProductCategory, CategoryReport> = BTreeMap::new();
        for product in self.products.values() {
            report
                .entry(product.category)
                .or_default()
                .built
                .push(product.name().to_string());
        }
        for name in self.failures.keys() {
            if let Ok(kind) = name.parse::<RgbProductKind>() {
                report
                    .entry(kind.category())
                    .or_default()
                    .failed
                    .push(name.clone());
            }
        }
        report
    }
}

/// Builds named RGB products from calibrated channels
#[derive(Debug, Clone)]
pub struct CompositingEngine {
    parallel: bool,
}

impl Default for CompositingEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl CompositingEngine {
    /// `parallel` builds independent products concurrently
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    /// Build a product by catalog name
    pub fn build(
        &self,
        name: &str,
        store: &ChannelStore,
        solar: Option<&SolarAngleGrid>,
    ) -> GoesResult<RgbProduct> {
        let kind: RgbProductKind = name.parse()?;
        self.build_kind(kind, store, solar)
    }

    pub fn build_kind(
        &self,
        kind: RgbProductKind,
        store: &ChannelStore,
        solar: Option<&SolarAngleGrid>,
    ) -> GoesResult<RgbProduct> {
        let start = Instant::now();
        let required = kind.channels();

        let missing = store.missing(required);
        if !missing.is_empty() {
            return Err(GoesError::MissingChannels {
                product: kind.name().to_string(),
                missing,
            });
        }

        let arrays: Vec<&Array2<f32>> = required
            .iter()
            .filter_map(|code| store.calibrated(*code))
            .collect();
        let target = arrays
            .iter()
            .map(|a| a.dim())
            .max_by_key(|(r, c)| r * c)
            .unwrap_or((0, 0));

        let mut aligned: Vec<Cow<'_, Array2<f32>>> = Vec::with_capacity(arrays.len());
        for (code, array) in required.iter().zip(arrays.iter()) {
            aligned.push(align_to(kind, *code, array, target)?);
        }

        let sza = if kind.is_day_night() {
            solar.map(|grid| {
                if grid.shape() == target {
                    Cow::Borrowed(&grid.sza)
                } else {
                    Cow::Owned(grid.resized(target).sza)
                }
            })
        } else {
            None
        };

        let inputs = CompositeInputs {
            channels: aligned.iter().map(|a| a.view()).collect(),
            sza: sza.as_ref().map(|s| s.view()),
        };
        let image = compose(kind, &inputs)?;

        let build_time_s = start.elapsed().as_secs_f64();
        log::info!(
            "Built {} {}x{} in {:.3}s",
            kind,
            target.1,
            target.0,
            build_time_s
        );

        Ok(RgbProduct {
            kind,
            image,
            channels: required.to_vec(),
            category: kind.category(),
            build_time_s,
            used_solar_angles: inputs.sza.is_some(),
        })
    }

    /// Build the requested products (all of the catalog when `None`).
    /// Each product succeeds or fails on its own.
    pub fn build_requested(
        &self,
        requested: Option<&[String]>,
        store: &ChannelStore,
        solar: Option<&SolarAngleGrid>,
    ) -> RgbProductSet {
        let start = Instant::now();
        let mut set = RgbProductSet::default();

        let mut kinds = Vec::new();
        match requested {
            None => kinds.extend(RgbProductKind::ALL),
            Some(names) => {
                for name in names {
                    match name.parse::<RgbProductKind>() {
                        Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                        Ok(_) => {}
                        Err(e) => {
                            log::warn!("Skipping product: {}", e);
                            set.failures.insert(name.clone(), e.to_string());
                        }
                    }
                }
            }
        }

        let results = self.run_builds(&kinds, store, solar);
        for (kind, result) in kinds.into_iter().zip(results) {
            match result {
                Ok(product) => {
                    set.products.insert(kind, product);
                }
                Err(e) => {
                    log::warn!("{} not built: {}", kind, e);
                    set.failures.insert(kind.name().to_string(), e.to_string());
                }
            }
        }

        set.total_time_s = start.elapsed().as_secs_f64();
        log::info!(
            "RGB compositing: {} built, {} skipped in {:.2}s",
            set.len(),
            set.failures.len(),
            set.total_time_s
        );
        set
    }

    fn run_builds(
        &self,
        kinds: &[RgbProductKind],
        store: &ChannelStore,
        solar: Option<&SolarAngleGrid>,
    ) -> Vec<GoesResult<RgbProduct>> {
        #[cfg(feature = "parallel")]
        if self.parallel && kinds.len() > 1 {
            use rayon::prelude::*;
            return kinds
                .par_iter()
                .map(|kind| self.build_kind(*kind, store, solar))
                .collect();
        }

        kinds
            .iter()
            .map(|kind| self.build_kind(*kind, store, solar))
            .collect()
    }
}

/// Bring one input onto the product grid. Inputs that are the same scene at
/// another resolution are resampled; a different aspect ratio is an error.
fn align_to<'a>(
    kind: RgbProductKind,
    code: ChannelCode,
    array: &'a Array2<f32>,
    target: (usize, usize),
) -> GoesResult<Cow<'a, Array2<f32>>> {
    let shape = array.dim();
    if shape == target {
        return Ok(Cow::Borrowed(array));
    }
    let row_scale = target.0 as f64 / shape.0.max(1) as f64;
    let col_scale = target.1 as f64 / shape.1.max(1) as f64;
    let skew = (row_scale - col_scale).abs() / row_scale.max(col_scale);
    if shape.0 == 0 || shape.1 == 0 || skew > ASPECT_TOLERANCE {
        return Err(GoesError::ShapeMismatch {
            context: format!("{} input {}", kind, code),
            expected: target,
            found: shape,
        });
    }
    log::debug!("{}: resampling {} {:?} -> {:?}", kind, code, shape, target);
    Ok(Cow::Owned(resample_to_shape(array, target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibrate::CalibratedChannel;
    use crate::core::enhance::EnhancedChannel;
    use crate::core::resample::ResolutionRequirement;
    use crate::core::solar::{fallback_grid, SolarMethod};
    use crate::core::store::{ChannelMetadata, StoredChannel};
    use crate::types::DataLevel;
    use chrono::{TimeZone, Utc};
    use ndarray::Array3;

    fn put(store: &mut ChannelStore, code: ChannelCode, data: Array2<f32>) {
        let shape = data.dim();
        let calibrated = CalibratedChannel {
            code,
            class: code.class(),
            data,
        };
        let metadata = ChannelMetadata {
            code,
            class: code.class(),
            band_id: code.band(),
            data_level: DataLevel::Level1b,
            native_shape: shape,
            shape,
            requirement: ResolutionRequirement::Native,
            time_coverage_start: Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap(),
            time_coverage_end: None,
            orbital_slot: "GOES-East".to_string(),
            source: None,
            geotransform: None,
            processing_time_s: 0.0,
            calibrated_bytes: calibrated.size_bytes(),
            enhanced_bytes: 0,
            compressed: true,
        };
        store
            .insert(StoredChannel {
                calibrated,
                enhanced: EnhancedChannel::Color(Array3::zeros((shape.0, shape.1, 3))),
                metadata,
            })
            .unwrap();
    }

    #[test]
    fn test_missing_channels_reported() {
        let mut store = ChannelStore::new();
        put(&mut store, ChannelCode::C01, Array2::from_elem((4, 4), 0.3));
        put(&mut store, ChannelCode::C02, Array2::from_elem((4, 4), 0.3));
        let engine = CompositingEngine::new(false);
        match engine.build("true_color", &store, None) {
            Err(GoesError::MissingChannels { product, missing }) => {
                assert_eq!(product, "true_color");
                assert_eq!(missing, vec![ChannelCode::C03]);
            }
            other => panic!("unexpected result {:?}", other.map(|p| p.name())),
        }
    }

    #[test]
    fn test_unknown_product() {
        let store = ChannelStore::new();
        let engine = CompositingEngine::default();
        assert!(matches!(
            engine.build("no_such_rgb", &store, None),
            Err(GoesError::UnknownProduct(_))
        ));
        let set = engine.build_requested(Some(&["no_such_rgb".to_string()]), &store, None);
        assert!(set.is_empty());
        assert!(set.failure("no_such_rgb").is_some());
    }

    #[test]
    fn test_mixed_resolution_inputs_are_aligned() {
        let mut store = ChannelStore::new();
        put(&mut store, ChannelCode::C08, Array2::from_elem((8, 8), 240.0));
        put(&mut store, ChannelCode::C09, Array2::from_elem((2, 2), 245.0));
        put(&mut store, ChannelCode::C10, Array2::from_elem((8, 8), 250.0));
        let product = CompositingEngine::new(false)
            .build("simple_water_vapor", &store, None)
            .unwrap();
        assert_eq!(product.shape(), (8, 8));
    }

    #[test]
    fn test_inconsistent_aspect_is_shape_mismatch() {
        let mut store = ChannelStore::new();
        put(&mut store, ChannelCode::C13, Array2::from_elem((8, 8), 280.0));
        put(&mut store, ChannelCode::C15, Array2::from_elem((2, 6), 280.0));
        assert!(matches!(
            CompositingEngine::new(false).build("split_window", &store, None),
            Err(GoesError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_day_night_uses_resized_solar_grid() {
        let mut store = ChannelStore::new();
        put(&mut store, ChannelCode::C02, Array2::from_elem((8, 8), 0.6));
        put(&mut store, ChannelCode::C13, Array2::from_elem((8, 8), 230.0));
        let solar = fallback_grid(SolarMethod::Simple, (4, 4), None, None);
        let product = CompositingEngine::new(false)
            .build("sandwich", &store, Some(&solar))
            .unwrap();
        assert!(product.used_solar_angles);
        assert_eq!(product.shape(), (8, 8));

        let without = CompositingEngine::new(false)
            .build("sandwich", &store, None)
            .unwrap();
        assert!(!without.used_solar_angles);
    }

    #[test]
    fn test_failures_do_not_block_other_products() {
        let mut store = ChannelStore::new();
        put(&mut store, ChannelCode::C13, Array2::from_elem((4, 4), 280.0));
        put(&mut store, ChannelCode::C15, Array2::from_elem((4, 4), 278.0));
        let set = CompositingEngine::default().build_requested(None, &store, None);
        assert!(set.contains("split_window"));
        assert!(set.contains("split_window_difference"));
        assert!(set.failure("airmass").is_some());
        assert_eq!(set.len() + set.failures.len(), 17);
        let weather = &set.by_category()[&ProductCategory::Weather];
        assert_eq!(weather.built.len(), 2);
    }
}
