//! Scene orchestration
//!
//! One run loads every requested channel (sequential I/O), fans the channels
//! out to a bounded worker pool for calibration, resampling and enhancement,
//! merges the results into a [`ChannelStore`], computes solar geometry once
//! and finally builds the RGB products. A failing channel or product is
//! recorded and skipped; only a scene with no loadable channel fails the run.

use crate::config::ProcessingConfig;
use crate::core::calibrate::CalibrationEngine;
use crate::core::composite::{CompositingEngine, RgbProductSet};
use crate::core::enhance::EnhancementEngine;
use crate::core::projection::ProjectionAuthority;
use crate::core::resample::{reference_shape, resample_to_shape, ResamplingEngine};
use crate::core::solar::{SolarGeometryEngine, SolarMethod};
use crate::core::store::{ChannelMetadata, ChannelStore, StoreSummary, StoredChannel};
use crate::io::{ChannelSource, SceneDescriptor};
use crate::types::{
    ChannelCode, ChannelRecord, CoordinateData, DataLevel, DomainType, GoesError, GoesResult,
    RawPixels,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// Processing strategy for a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPath {
    /// Summary or level-2 inputs; accepts pre-calibrated data
    Level2Aware,
    /// Full disk at native resolution
    EnhancedFullDisk,
    /// Sector scenes reconciled through the requirement table
    StandardConus,
}

impl ProcessingPath {
    pub fn name(self) -> &'static str {
        match self {
            ProcessingPath::Level2Aware => "level2_aware",
            ProcessingPath::EnhancedFullDisk => "enhanced_full_disk",
            ProcessingPath::StandardConus => "standard_conus",
        }
    }

    pub fn solar_method(self) -> SolarMethod {
        match self {
            ProcessingPath::StandardConus => SolarMethod::Simple,
            ProcessingPath::Level2Aware | ProcessingPath::EnhancedFullDisk => SolarMethod::Masked,
        }
    }

    /// Sector for the resolution requirement table
    fn resampling_domain(self, configured: DomainType) -> DomainType {
        match self {
            ProcessingPath::EnhancedFullDisk => DomainType::FullDisk,
            _ => configured,
        }
    }

    /// Radiance is brought to the target grid before calibration
    fn resamples_radiance(self) -> bool {
        self == ProcessingPath::StandardConus
    }
}

impl fmt::Display for ProcessingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Pick the processing path from what is known before loading
pub fn select_path(scene: &SceneDescriptor, domain: DomainType) -> ProcessingPath {
    if scene.has_summary || scene.data_level == DataLevel::Level2 {
        ProcessingPath::Level2Aware
    } else if domain == DomainType::FullDisk {
        ProcessingPath::EnhancedFullDisk
    } else {
        ProcessingPath::StandardConus
    }
}

/// Independent unit of per-channel work
#[derive(Debug, Clone)]
pub struct ChannelTask {
    pub code: ChannelCode,
    pub record: ChannelRecord,
    pub target_shape: (usize, usize),
    pub reference_shape: (usize, usize),
}

/// Channel that could not be loaded or processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFailure {
    pub channel: ChannelCode,
    pub reason: String,
}

/// Wall-clock time spent in each phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub load_s: f64,
    pub process_s: f64,
    pub solar_s: f64,
    pub compositing_s: f64,
    pub total_s: f64,
}

/// End-of-run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub path: ProcessingPath,
    pub domain_type: DomainType,
    pub workers: usize,
    pub channels_succeeded: Vec<ChannelCode>,
    pub channels_failed: Vec<ChannelFailure>,
    pub reference_shape: Option<(usize, usize)>,
    pub solar_angles: bool,
    pub solar_fallback: bool,
    pub products_built: Vec<String>,
    pub products_failed: BTreeMap<String, String>,
    pub timings: PhaseTimings,
    pub total_size_mb: f64,
    pub store: StoreSummary,
}

impl ProcessingSummary {
    pub fn channel_count(&self) -> usize {
        self.channels_succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.channels_failed.len()
    }

    pub fn to_json(&self) -> GoesResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GoesError::Processing(format!("failed to serialize summary: {}", e)))
    }
}

/// Everything a run produces
#[derive(Debug)]
pub struct SceneOutput {
    pub store: ChannelStore,
    pub products: RgbProductSet,
    pub projection: ProjectionAuthority,
    pub summary: ProcessingSummary,
}

/// Successful task result
struct ProcessedChannel {
    stored: StoredChannel,
    coordinates: Option<CoordinateData>,
}

/// Shared, read-only state seen by every task
struct TaskContext<'a> {
    path: ProcessingPath,
    calibration: &'a CalibrationEngine,
    enhancement: &'a EnhancementEngine,
    resampler: ResamplingEngine,
    projection: &'a ProjectionAuthority,
    compressed: bool,
}

/// Runs scenes according to a [`ProcessingConfig`]
#[derive(Debug)]
pub struct Orchestrator {
    config: ProcessingConfig,
    calibration: CalibrationEngine,
    /// Lives as long as the orchestrator so enhancement tables are built once
    enhancement: EnhancementEngine,
}

impl Orchestrator {
    pub fn new(config: ProcessingConfig) -> Self {
        let enhancement = EnhancementEngine::new(config.enable_fast_ir_luts);
        Self {
            config,
            calibration: CalibrationEngine::new(),
            enhancement,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn enhancement(&self) -> &EnhancementEngine {
        &self.enhancement
    }

    /// Process one scene from `source`
    pub fn run(&self, source: &dyn ChannelSource) -> GoesResult<SceneOutput> {
        self.config.validate()?;
        let run_start = Instant::now();
        let mut timings = PhaseTimings::default();

        let scene = source.scene();
        let path = select_path(&scene, self.config.domain_type);
        log::info!(
            "Processing {} scene via {} path ({} workers)",
            self.config.domain_type,
            path,
            self.config.worker_count()
        );

        // I/O phase
        let load_start = Instant::now();
        let mut failures = Vec::new();
        let records = self.load_records(source, &mut failures)?;
        timings.load_s = load_start.elapsed().as_secs_f64();
        log::info!(
            "Loaded {} channels in {:.2}s ({} failed)",
            records.len(),
            timings.load_s,
            failures.len()
        );

        let scan_time = records.values().next().map(|r| r.time_coverage_start);
        let resampler = ResamplingEngine::new(path.resampling_domain(self.config.domain_type));
        let tasks = build_tasks(records, &resampler);
        let reference = tasks.first().map(|t| t.reference_shape);

        // Compute phase
        let projection = ProjectionAuthority::new();
        let process_start = Instant::now();
        let context = TaskContext {
            path,
            calibration: &self.calibration,
            enhancement: &self.enhancement,
            resampler,
            projection: &projection,
            compressed: self.config.compress_stored_data,
        };
        let outcomes = self.execute(tasks, &context)?;

        let mut store = ChannelStore::new();
        let mut succeeded = Vec::new();
        for (code, outcome) in outcomes {
            match outcome.and_then(|processed| {
                let coordinates = processed.coordinates;
                store.insert(processed.stored)?;
                Ok(coordinates)
            }) {
                Ok(coordinates) => {
                    if let Some(coords) = coordinates {
                        store.capture_coordinates(code, coords);
                    }
                    succeeded.push(code);
                }
                Err(e) => {
                    log::warn!("{} skipped: {}", code, e);
                    failures.push(ChannelFailure {
                        channel: code,
                        reason: e.to_string(),
                    });
                }
            }
        }
        match store.assign_geotransforms(&projection) {
            Ok(n) => log::debug!("Assigned geotransforms to {} channels", n),
            Err(e) => log::warn!("Geotransforms not assigned: {}", e),
        }
        timings.process_s = process_start.elapsed().as_secs_f64();
        log::info!(
            "Processed {} channels in {:.2}s",
            succeeded.len(),
            timings.process_s
        );

        // Solar geometry, once per scene
        let solar_start = Instant::now();
        if self.config.enable_solar_angles {
            if let Some(shape) = reference.or_else(|| store.dominant_shape()) {
                let engine = SolarGeometryEngine::new(path.solar_method());
                let grid = engine.compute(store.coordinates(), shape, scan_time.as_ref());
                store.set_solar_angles(grid);
            }
        } else {
            log::debug!("Solar angles disabled");
        }
        timings.solar_s = solar_start.elapsed().as_secs_f64();

        // Compositing
        let compositing_start = Instant::now();
        let products = CompositingEngine::new(self.config.enable_parallel_processing).build_requested(
            self.config.requested_rgb_products.as_deref(),
            &store,
            store.solar_angles(),
        );
        timings.compositing_s = compositing_start.elapsed().as_secs_f64();
        timings.total_s = run_start.elapsed().as_secs_f64();

        let store_summary = store.summary();
        let total_size_mb =
            store_summary.total_size_mb + products.size_bytes() as f64 / (1024.0 * 1024.0);
        failures.sort_by_key(|f| f.channel);

        let summary = ProcessingSummary {
            path,
            domain_type: self.config.domain_type,
            workers: self.config.worker_count(),
            channels_succeeded: succeeded,
            channels_failed: failures,
            reference_shape: reference,
            solar_angles: store.solar_angles().is_some(),
            solar_fallback: store.solar_angles().map_or(false, |s| s.is_fallback),
            products_built: products.names().iter().map(|n| n.to_string()).collect(),
            products_failed: products.failures.clone(),
            timings,
            total_size_mb,
            store: store_summary,
        };
        log::info!(
            "Scene complete in {:.2}s: {} channels ({} failed), {} products, {:.1} MB",
            timings.total_s,
            summary.channel_count(),
            summary.failure_count(),
            summary.products_built.len(),
            summary.total_size_mb
        );

        Ok(SceneOutput {
            store,
            products,
            projection,
            summary,
        })
    }

    /// Load the requested (or all available) channels one at a time
    fn load_records(
        &self,
        source: &dyn ChannelSource,
        failures: &mut Vec<ChannelFailure>,
    ) -> GoesResult<BTreeMap<ChannelCode, ChannelRecord>> {
        let available = source.available_channels();
        let wanted = match self.config.parsed_channels()? {
            Some(requested) => {
                for code in requested.iter().filter(|c| !available.contains(c)) {
                    log::warn!("{} requested but not available", code);
                    failures.push(ChannelFailure {
                        channel: *code,
                        reason: "channel not available from source".to_string(),
                    });
                }
                requested
                    .into_iter()
                    .filter(|c| available.contains(c))
                    .collect::<Vec<_>>()
            }
            None => available,
        };

        let mut records = BTreeMap::new();
        for code in wanted {
            if records.contains_key(&code) {
                continue;
            }
            match source.load(code) {
                Ok(record) if record.code != code => {
                    let e = GoesError::LoadFailure {
                        channel: code,
                        reason: format!("source returned {}", record.code),
                    };
                    log::warn!("{}", e);
                    failures.push(ChannelFailure {
                        channel: code,
                        reason: e.to_string(),
                    });
                }
                Ok(record) => {
                    log::debug!("Loaded {} {:?}", code, record.native_shape());
                    records.insert(code, record);
                }
                Err(e) => {
                    log::warn!("{}", e);
                    failures.push(ChannelFailure {
                        channel: code,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if records.is_empty() {
            return Err(GoesError::NoChannelsLoaded);
        }
        Ok(records)
    }

    /// Run tasks on a bounded pool, or sequentially for a single task or
    /// when parallelism is off. Results come back in task order.
    fn execute(
        &self,
        tasks: Vec<ChannelTask>,
        context: &TaskContext<'_>,
    ) -> GoesResult<Vec<(ChannelCode, GoesResult<ProcessedChannel>)>> {
        let workers = self.config.worker_count();

        #[cfg(feature = "parallel")]
        if workers > 1 && tasks.len() > 1 {
            use rayon::prelude::*;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| GoesError::Processing(format!("failed to build worker pool: {}", e)))?;
            log::debug!("Dispatching {} channel tasks to {} workers", tasks.len(), workers);
            return Ok(pool.install(|| {
                tasks
                    .into_par_iter()
                    .map(|task| (task.code, process_task(task, context)))
                    .collect()
            }));
        }

        log::debug!("Running {} channel tasks sequentially ({} workers)", tasks.len(), workers);
        Ok(tasks
            .into_iter()
            .map(|task| (task.code, process_task(task, context)))
            .collect())
    }
}

/// One task per loaded record, in band order
fn build_tasks(
    records: BTreeMap<ChannelCode, ChannelRecord>,
    resampler: &ResamplingEngine,
) -> Vec<ChannelTask> {
    let targets: BTreeMap<ChannelCode, (usize, usize)> = records
        .iter()
        .map(|(code, record)| (*code, resampler.target_shape(*code, record.native_shape())))
        .collect();
    let reference = reference_shape(&targets).unwrap_or((0, 0));

    records
        .into_iter()
        .map(|(code, record)| ChannelTask {
            code,
            target_shape: targets.get(&code).copied().unwrap_or_else(|| record.native_shape()),
            reference_shape: reference,
            record,
        })
        .collect()
}

/// calibrate -> resample -> enhance for one channel (radiance is resampled
/// first on the standard path)
fn process_task(task: ChannelTask, context: &TaskContext<'_>) -> GoesResult<ProcessedChannel> {
    let start = Instant::now();
    let ChannelTask {
        code,
        record,
        target_shape,
        ..
    } = task;

    if let Some(coords) = &record.coordinates {
        if let Err(e) = context
            .projection
            .ensure_initialized(&coords.projection, &coords.x, &coords.y)
        {
            log::warn!("{}: projection not initialized from coordinates: {}", code, e);
        }
    }

    let native_shape = record.native_shape();
    let calibrated = match &record.data {
        RawPixels::Radiance(radiance) if context.path.resamples_radiance() => {
            let pixels = record.data.map_array(resample_to_shape(radiance, target_shape));
            context
                .calibration
                .calibrate_pixels(code, &pixels, &record.calibration)?
        }
        _ => {
            let mut channel = context.calibration.calibrate(&record)?;
            if channel.shape() != target_shape {
                channel.data = resample_to_shape(&channel.data, target_shape);
            }
            channel
        }
    };
    if calibrated.shape() != native_shape {
        log::debug!(
            "{}: {:?} {:?} -> {:?}",
            code,
            context.resampler.requirement(code),
            native_shape,
            calibrated.shape()
        );
    }

    let enhanced = context.enhancement.enhance(&calibrated)?;
    let processing_time_s = start.elapsed().as_secs_f64();

    let metadata = ChannelMetadata {
        code,
        class: calibrated.class,
        band_id: code.band(),
        data_level: record.data_level,
        native_shape,
        shape: calibrated.shape(),
        requirement: context.resampler.requirement(code),
        time_coverage_start: record.time_coverage_start,
        time_coverage_end: record.time_coverage_end,
        orbital_slot: record.orbital_slot.clone(),
        source: record.source.clone(),
        geotransform: None,
        processing_time_s,
        calibrated_bytes: calibrated.size_bytes(),
        enhanced_bytes: enhanced.size_bytes(),
        compressed: context.compressed,
    };
    log::debug!("{} processed in {:.3}s", code, processing_time_s);

    Ok(ProcessedChannel {
        stored: StoredChannel {
            calibrated,
            enhanced,
            metadata,
        },
        coordinates: record.coordinates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::InMemorySource;
    use crate::types::{CalibrationConstants, PlanckConstants, ProjectionMetadata};
    use chrono::{TimeZone, Utc};
    use ndarray::{Array1, Array2};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
    }

    fn ir(code: ChannelCode, n: usize) -> ChannelRecord {
        ChannelRecord::radiance(code, Array2::from_elem((n, n), 90.0), start())
    }

    fn coordinates(n: usize) -> CoordinateData {
        CoordinateData {
            x: Array1::linspace(-0.05, 0.05, n),
            y: Array1::linspace(0.12, 0.06, n),
            projection: ProjectionMetadata::default(),
        }
    }

    #[test]
    fn test_path_selection() {
        let l1 = SceneDescriptor::default();
        assert_eq!(select_path(&l1, DomainType::Conus), ProcessingPath::StandardConus);
        assert_eq!(select_path(&l1, DomainType::Mesoscale), ProcessingPath::StandardConus);
        assert_eq!(select_path(&l1, DomainType::FullDisk), ProcessingPath::EnhancedFullDisk);

        let summary = SceneDescriptor {
            has_summary: true,
            ..SceneDescriptor::default()
        };
        assert_eq!(select_path(&summary, DomainType::FullDisk), ProcessingPath::Level2Aware);

        let l2 = SceneDescriptor {
            data_level: DataLevel::Level2,
            has_summary: false,
        };
        assert_eq!(select_path(&l2, DomainType::Conus), ProcessingPath::Level2Aware);
    }

    #[test]
    fn test_tasks_carry_targets_and_reference() {
        let mut records = BTreeMap::new();
        records.insert(ChannelCode::C13, ir(ChannelCode::C13, 4));
        records.insert(ChannelCode::C02, ir(ChannelCode::C02, 16));
        let tasks = build_tasks(records, &ResamplingEngine::new(DomainType::Conus));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].code, ChannelCode::C02);
        assert_eq!(tasks[0].target_shape, (16, 16));
        assert_eq!(tasks[1].target_shape, (16, 16));
        assert!(tasks.iter().all(|t| t.reference_shape == (16, 16)));
    }

    #[test]
    fn test_no_loadable_channel_fails_run() {
        let source = InMemorySource::default().with_unreadable(ChannelCode::C13, "truncated file");
        let result = Orchestrator::new(ProcessingConfig::default()).run(&source);
        assert!(matches!(result, Err(GoesError::NoChannelsLoaded)));
    }

    #[test]
    fn test_load_failure_is_isolated() {
        let source = InMemorySource::default()
            .with_record(ir(ChannelCode::C13, 4).with_coordinates(coordinates(4)))
            .with_record(ir(ChannelCode::C15, 4))
            .with_unreadable(ChannelCode::C14, "checksum mismatch");
        let output = Orchestrator::new(ProcessingConfig::default()).run(&source).unwrap();

        assert_eq!(output.store.len(), 2);
        assert_eq!(output.summary.channels_failed.len(), 1);
        assert_eq!(output.summary.channels_failed[0].channel, ChannelCode::C14);
        assert!(output.products.contains("split_window"));
        assert!(output.projection.is_initialized());
        assert!(output
            .store
            .get(ChannelCode::C15)
            .and_then(|c| c.metadata.geotransform)
            .is_some());
    }

    #[test]
    fn test_requested_channels_filter_and_report() {
        let config = ProcessingConfig {
            requested_channels: Some(vec!["C13".to_string(), "C16".to_string()]),
            enable_parallel_processing: false,
            ..ProcessingConfig::default()
        };
        let source = InMemorySource::default()
            .with_record(ir(ChannelCode::C13, 4))
            .with_record(ir(ChannelCode::C15, 4));
        let output = Orchestrator::new(config).run(&source).unwrap();
        assert_eq!(output.store.codes(), vec![ChannelCode::C13]);
        assert_eq!(output.summary.channels_failed[0].channel, ChannelCode::C16);
    }

    #[test]
    fn test_calibration_failure_skips_channel() {
        let malformed = CalibrationConstants::with_planck(PlanckConstants {
            fk1: -1.0,
            fk2: 1000.0,
            bc1: 0.1,
            bc2: 0.999,
        });
        let source = InMemorySource::default()
            .with_record(ir(ChannelCode::C13, 4))
            .with_record(ir(ChannelCode::C14, 4).with_calibration(malformed));
        let output = Orchestrator::new(ProcessingConfig::default()).run(&source).unwrap();
        assert_eq!(output.store.codes(), vec![ChannelCode::C13]);
        assert_eq!(output.summary.failure_count(), 1);
        assert!(output.summary.channels_failed[0].reason.contains("Planck"));
    }

    #[test]
    fn test_full_disk_keeps_native_resolution() {
        let config = ProcessingConfig::for_domain(DomainType::FullDisk);
        let source = InMemorySource::default()
            .with_record(ir(ChannelCode::C13, 4).with_calibration(CalibrationConstants::default()))
            .with_record(ChannelRecord::radiance(
                ChannelCode::C02,
                Array2::from_elem((16, 16), 0.5),
                start(),
            ));
        let output = Orchestrator::new(config).run(&source).unwrap();
        assert_eq!(output.summary.path, ProcessingPath::EnhancedFullDisk);
        assert_eq!(output.store.get(ChannelCode::C13).unwrap().metadata.shape, (4, 4));
        assert_eq!(output.summary.reference_shape, Some((16, 16)));
        let solar = output.store.solar_angles().unwrap();
        assert_eq!(solar.method, SolarMethod::Masked);
        assert_eq!(solar.shape(), (16, 16));
    }

    #[test]
    fn test_solar_disabled() {
        let config = ProcessingConfig {
            enable_solar_angles: false,
            ..ProcessingConfig::default()
        };
        let source = InMemorySource::default().with_record(ir(ChannelCode::C13, 4));
        let output = Orchestrator::new(config).run(&source).unwrap();
        assert!(output.store.solar_angles().is_none());
        assert!(!output.summary.solar_angles);
    }

    #[test]
    fn test_summary_serializes() {
        let source = InMemorySource::default().with_record(ir(ChannelCode::C13, 4));
        let output = Orchestrator::new(ProcessingConfig::default()).run(&source).unwrap();
        let json = output.summary.to_json().unwrap();
        assert!(json.contains("\"path\": \"standard_conus\""));
        assert!(json.contains("\"C13\""));
    }
}
