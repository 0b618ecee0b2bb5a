//! Chart package parsing.
//!
//! A chart package is a gzipped tarball whose top-level directory contains
//! a `Chart.yaml`. Only that file is read.

use chartmill_core::{ChartMetadata, ParseError};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Component;

/// Keys the index writes itself; a `Chart.yaml` cannot override them.
const RESERVED_KEYS: &[&str] = &["urls", "created", "digest", "removed"];

/// Upper bound on the size of a `Chart.yaml` we are willing to buffer.
const MAX_CHART_YAML_BYTES: u64 = 1024 * 1024;

/// Extracts chart metadata from package bytes.
pub trait ChartParser: Send + Sync {
    fn parse_metadata(&self, content: &[u8]) -> Result<ChartMetadata, ParseError>;
}

/// Parser for gzip+tar chart packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarballChartParser;

impl TarballChartParser {
    pub fn new() -> Self {
        Self
    }
}

impl ChartParser for TarballChartParser {
    fn parse_metadata(&self, content: &[u8]) -> Result<ChartMetadata, ParseError> {
        if content.len() < 2 || content[0] != 0x1f || content[1] != 0x8b {
            return Err(ParseError::NotGzip {
                reason: "missing gzip magic bytes".to_string(),
            });
        }

        let mut archive = tar::Archive::new(GzDecoder::new(content));
        let entries = archive.entries().map_err(invalid_archive)?;

        for entry in entries {
            let entry = entry.map_err(invalid_archive)?;
            let is_chart_yaml = {
                let path = entry.path().map_err(invalid_archive)?;
                let parts: Vec<Component<'_>> = path.components().collect();
                parts.len() == 2
                    && matches!(parts[0], Component::Normal(_))
                    && parts[1].as_os_str() == "Chart.yaml"
            };
            if !is_chart_yaml {
                continue;
            }

            let mut raw = String::new();
            entry
                .take(MAX_CHART_YAML_BYTES)
                .read_to_string(&mut raw)
                .map_err(|e| ParseError::InvalidChartYaml {
                    reason: e.to_string(),
                })?;
            return metadata_from_yaml(&raw);
        }

        Err(ParseError::MissingChartYaml)
    }
}

fn invalid_archive(err: std::io::Error) -> ParseError {
    ParseError::InvalidArchive {
        reason: err.to_string(),
    }
}

/// Turn the text of a `Chart.yaml` into metadata.
pub fn metadata_from_yaml(raw: &str) -> Result<ChartMetadata, ParseError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| ParseError::InvalidChartYaml {
            reason: e.to_string(),
        })?;
    let serde_yaml::Value::Mapping(mapping) = value else {
        return Err(ParseError::InvalidChartYaml {
            reason: "top level is not a mapping".to_string(),
        });
    };

    let mut name = None;
    let mut version = None;
    let mut extra = BTreeMap::new();

    for (key, value) in mapping {
        let serde_yaml::Value::String(key) = key else {
            continue;
        };
        match key.as_str() {
            "name" => name = scalar_string(&value),
            "version" => version = scalar_string(&value),
            k if RESERVED_KEYS.contains(&k) => {}
            _ => {
                extra.insert(key, value);
            }
        }
    }

    let name = name.ok_or_else(|| ParseError::MissingField {
        field: "name".to_string(),
    })?;
    let version = version.ok_or_else(|| ParseError::MissingField {
        field: "version".to_string(),
    })?;
    if name.contains('/') || version.contains('/') {
        return Err(ParseError::InvalidChartYaml {
            reason: "name and version must not contain '/'".to_string(),
        });
    }

    Ok(ChartMetadata {
        name,
        version,
        extra,
    })
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    let s = match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}
