//! INI configuration adapter.
//!
//! Keys are read case-insensitively. Blank values count as absent, so
//! `payout_min_profit =` behaves like a missing key.

use crate::domain::error::PropEvalError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

const INLINE_SOURCE: &str = "<inline>";

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
    source: String,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PropEvalError> {
        let source = path.as_ref().display().to_string();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| PropEvalError::ConfigParse {
                file: source.clone(),
                reason,
            })?;
        Ok(Self { config, source })
    }

    pub fn from_string(content: &str) -> Result<Self, PropEvalError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| PropEvalError::ConfigParse {
                file: INLINE_SOURCE.to_string(),
                reason,
            })?;
        Ok(Self {
            config,
            source: INLINE_SOURCE.to_string(),
        })
    }

    /// Path the settings were read from, or `<inline>`.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn value(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.value(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.value(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.value(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.value(section, key)
            .and_then(|v| Self::parse_bool(&v))
            .unwrap_or(default)
    }

    fn get_optional_double(&self, section: &str, key: &str) -> Option<f64> {
        self.value(section, key)
            .map(|v| v.parse().unwrap_or(f64::NAN))
    }
}
