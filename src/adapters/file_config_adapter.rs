//! INI file configuration adapter.
//!
//! Section and key lookups are case-insensitive, so `rules = BuyDip` finds
//! `[rule.buydip]`. Typed getters trim the raw value before parsing.

use crate::domain::error::DivtraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DivtraderError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path).map_err(|reason| DivtraderError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut ini = Ini::new();
        ini.read(content.to_string())?;
        Ok(Self { ini })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    fn parsed<T: std::str::FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse::<T>().ok())
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(&section.to_lowercase(), &key.to_lowercase())
            .map(|v| v.trim().to_string())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.parsed(section, key).unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.parsed::<f64>(section, key)
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .and_then(|v| Self::parse_bool(&v))
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        self.ini.sections()
    }
}
