//! INI file configuration adapter.

use crate::domain::error::MultitraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }

    fn malformed(section: &str, key: &str, reason: String) -> MultitraderError {
        MultitraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, MultitraderError> {
        self.config
            .getint(section, key)
            .map_err(|e| Self::malformed(section, key, e))
    }

    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, MultitraderError> {
        let value = self
            .config
            .getfloat(section, key)
            .map_err(|e| Self::malformed(section, key, e))?;
        match value {
            Some(v) if !v.is_finite() => Err(Self::malformed(
                section,
                key,
                format!("{v} is not a finite number"),
            )),
            other => Ok(other),
        }
    }

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, MultitraderError> {
        match self.config.get(section, key) {
            None => Ok(None),
            Some(v) => Self::parse_bool(&v).map(Some).ok_or_else(|| {
                Self::malformed(section, key, format!("expected true/false, got '{v}'"))
            }),
        }
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}
