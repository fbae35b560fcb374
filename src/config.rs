//! Processing configuration

use crate::types::{ChannelCode, DomainType, GoesError, GoesResult};
use serde::{Deserialize, Serialize};

/// Options controlling one scene run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Scan sector of the input files
    pub domain_type: DomainType,
    /// Size of the per-channel worker pool
    pub max_parallel_workers: usize,
    pub enable_parallel_processing: bool,
    pub enable_solar_angles: bool,
    /// Use the combined temperature-to-color table instead of evaluating both stages per pixel
    pub enable_fast_ir_luts: bool,
    /// Report stored arrays in their compact representation (f32 calibrated, u8 enhanced)
    pub compress_stored_data: bool,
    /// Channel codes to process; `None` means every available channel
    pub requested_channels: Option<Vec<String>>,
    /// Product names to build; `None` means every catalog product
    pub requested_rgb_products: Option<Vec<String>>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            domain_type: DomainType::Conus,
            max_parallel_workers: 4,
            enable_parallel_processing: true,
            enable_solar_angles: true,
            enable_fast_ir_luts: true,
            compress_stored_data: true,
            requested_channels: None,
            requested_rgb_products: None,
        }
    }
}

impl ProcessingConfig {
    pub fn for_domain(domain_type: DomainType) -> Self {
        Self {
            domain_type,
            ..Self::default()
        }
    }

    /// Check worker count and channel names before a run starts
    pub fn validate(&self) -> GoesResult<()> {
        if self.max_parallel_workers == 0 {
            return Err(GoesError::Configuration(
                "max_parallel_workers must be at least 1".to_string(),
            ));
        }
        self.parsed_channels().map(|_| ())
    }

    /// Requested channels as typed codes
    pub fn parsed_channels(&self) -> GoesResult<Option<Vec<ChannelCode>>> {
        match &self.requested_channels {
            None => Ok(None),
            Some(names) => names
                .iter()
                .map(|name| {
                    name.parse::<ChannelCode>().map_err(|_| {
                        GoesError::Configuration(format!("unknown channel '{}' in requested_channels", name))
                    })
                })
                .collect::<GoesResult<Vec<_>>>()
                .map(Some),
        }
    }

    /// Effective worker count; 1 when parallelism is disabled
    pub fn worker_count(&self) -> usize {
        if self.enable_parallel_processing {
            self.max_parallel_workers.max(1)
        } else {
            1
        }
    }

    pub fn from_json(text: &str) -> GoesResult<Self> {
        let config: ProcessingConfig = serde_json::from_str(text)
            .map_err(|e| GoesError::Configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProcessingConfig::default();
        assert_eq!(config.domain_type, DomainType::Conus);
        assert_eq!(config.max_parallel_workers, 4);
        assert!(config.enable_parallel_processing);
        assert!(config.enable_solar_angles);
        assert!(config.enable_fast_ir_luts);
        assert!(config.compress_stored_data);
        assert!(config.requested_channels.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = ProcessingConfig::from_json(
            r#"{"domain_type": "full_disk", "requested_channels": ["C02", "C13"]}"#,
        )
        .unwrap();
        assert_eq!(config.domain_type, DomainType::FullDisk);
        assert_eq!(config.max_parallel_workers, 4);
        assert_eq!(
            config.parsed_channels().unwrap(),
            Some(vec![ChannelCode::C02, ChannelCode::C13])
        );
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ProcessingConfig::default();
        config.max_parallel_workers = 0;
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::default();
        config.requested_channels = Some(vec!["C42".to_string()]);
        assert!(matches!(config.validate(), Err(GoesError::Configuration(_))));
    }

    #[test]
    fn test_worker_count() {
        let mut config = ProcessingConfig::default();
        assert_eq!(config.worker_count(), 4);
        config.enable_parallel_processing = false;
        assert_eq!(config.worker_count(), 1);
    }
}
