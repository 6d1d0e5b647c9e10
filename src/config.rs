//! Application configuration
//!
//! Loaded from an optional YAML file. Every key has a default, so an empty or
//! partial file is valid. Binaries apply CLI flags and `COSTSHEET_*`
//! environment overrides on top.

use crate::error::CostResult;
use crate::excel::TemplateLayout;
use crate::store::DEFAULT_STORE_FILE;
use crate::types::DEFAULT_LABOR_RATE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default template location, relative to the working directory
pub const DEFAULT_TEMPLATE_FILE: &str = "template.xlsx";

/// Default API password
pub const DEFAULT_ACCESS_KEY: &str = "ssep2025";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub template_path: PathBuf,
    pub store_path: PathBuf,
    /// Rate used for process lines without a basis rate
    pub default_labor_rate: f64,
    pub access_key: String,
    pub host: String,
    pub port: u16,
    pub layout: TemplateLayout,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from(DEFAULT_TEMPLATE_FILE),
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            default_labor_rate: DEFAULT_LABOR_RATE,
            access_key: DEFAULT_ACCESS_KEY.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            layout: TemplateLayout::default(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_file(path: &Path) -> CostResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> CostResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Config file when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> CostResult<Self> {
        match path {
            Some(p) => Self::from_yaml_file(p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::RowBlock;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.template_path, PathBuf::from("template.xlsx"));
        assert_eq!(config.store_path, PathBuf::from("saved_results.json"));
        assert_eq!(config.default_labor_rate, 3500.0);
        assert_eq!(config.access_key, "ssep2025");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(AppConfig::from_yaml_str("").unwrap(), AppConfig::default());
        assert_eq!(AppConfig::from_yaml_str("  \n").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_yaml_with_nested_layout() {
        let yaml = r#"
template_path: /srv/costsheet/template.xlsx
port: 9000
layout:
  process_block:
    first: 30
    last: 50
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.template_path, PathBuf::from("/srv/costsheet/template.xlsx"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.layout.process_block, RowBlock::new(30, 50));
        assert_eq!(config.layout.material_block, RowBlock::new(9, 24));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "access_key: secret").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.access_key, "secret");
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/costsheet.yaml"))).is_err());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(AppConfig::from_yaml_str("port: [not a number").is_err());
    }
}
