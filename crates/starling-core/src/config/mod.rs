//! Configuration types shared by the starling binary and library.

mod vars;

pub use vars::interpolate;

use serde::{Deserialize, Serialize};

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Metrics configuration for the optional Prometheus endpoint.
///
/// A batch run is short-lived, so the exporter is off unless an address is
/// configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener (e.g. "0.0.0.0:9090").
    #[serde(default)]
    pub address: Option<String>,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_names() {
        let parsed: ParquetCompression = serde_yaml::from_str("zstd").unwrap();
        assert_eq!(parsed, ParquetCompression::Zstd);
        assert_eq!(ParquetCompression::default(), ParquetCompression::Snappy);
        assert!(serde_yaml::from_str::<ParquetCompression>("brotli").is_err());
    }

    #[test]
    fn test_metrics_disabled_by_default() {
        let config: MetricsConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.address, None);
    }
}
