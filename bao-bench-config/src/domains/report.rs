//! Report output configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Where and how the end-of-run report is written
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,

    /// Write the report to this file instead of stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human readable table
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "table" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(format!("Invalid report format: {}", s)),
        }
    }
}

impl Validatable for ReportConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(ref path) = self.output {
            if path.as_os_str().is_empty() {
                return Err(self.validation_error("output path cannot be empty"));
            }
            if path.is_dir() {
                return Err(self.validation_error(format!(
                    "output path {} is a directory",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "report"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_format_from_str() {
        assert_eq!(ReportFormat::from_str("JSON").unwrap(), ReportFormat::Json);
        assert_eq!(ReportFormat::from_str("table").unwrap(), ReportFormat::Text);
        assert!(ReportFormat::from_str("csv").is_err());
    }

    #[test]
    fn test_directory_output_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReportConfig {
            format: ReportFormat::Json,
            output: Some(dir.path().to_path_buf()),
        };
        assert!(config.validate().is_err());
    }
}
