use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use color_eyre::eyre::{eyre, Result};
use serde::Deserialize;

use crate::cli::ConfigOverrides;
use crate::utils::{get_config_dir, get_export_dir, PROJECT_NAME};

const CONFIG: &str = include_str!("../.config/config.json5");

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub time_zone: String,
    #[serde(default)]
    pub retention: Option<usize>,
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
}

impl Config {
    /// Loads the embedded defaults, then any config file in the config
    /// directory, then `GAS_DASHBOARD_*` environment variables.
    pub fn new() -> Result<Self> {
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(CONFIG, config::FileFormat::Json5));

        let config_files = [
            ("config.json5", config::FileFormat::Json5),
            ("config.json", config::FileFormat::Json),
            ("config.yaml", config::FileFormat::Yaml),
            ("config.toml", config::FileFormat::Toml),
            ("config.ini", config::FileFormat::Ini),
        ];
        let mut found_config = false;
        for (file, format) in &config_files {
            let path = config_dir.join(file);
            found_config |= path.exists();
            builder = builder.add_source(config::File::from(path).format(*format).required(false));
        }
        if !found_config {
            log::debug!("No configuration file found in {}", config_dir.display());
        }

        builder = builder.add_source(
            config::Environment::with_prefix(PROJECT_NAME.as_str()).try_parsing(true),
        );

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies command line overrides on top of the loaded configuration.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        if let Some(base_url) = &overrides.base_url {
            self.base_url.clone_from(base_url);
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.poll_interval_ms = interval;
        }
        if let Some(time_zone) = &overrides.time_zone {
            self.time_zone.clone_from(time_zone);
        }
        if overrides.retention.is_some() {
            self.retention = overrides.retention;
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects settings the dashboard cannot run with.
    fn validate(&self) -> Result<()> {
        self.time_zone()?;
        if self.retention == Some(0) {
            return Err(eyre!("retention must keep at least one row"));
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|e| eyre!("Invalid time zone {:?}: {e}", self.time_zone))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Where snapshot exports go unless configured otherwise.
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(get_export_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn defaults() -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(CONFIG, config::FileFormat::Json5))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn embedded_defaults_parse() {
        let config = defaults();
        assert_eq!(config.base_url, "http://212.227.175.162:1880/drone-data");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.time_zone().unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(config.retention, None);
    }

    #[test]
    fn overrides_replace_loaded_values() {
        let overrides = ConfigOverrides {
            base_url: Some("http://localhost:8080/data".into()),
            timeout_secs: Some(2),
            poll_interval_ms: None,
            time_zone: Some("Europe/Vienna".into()),
            retention: Some(100),
        };
        let config = defaults().with_overrides(&overrides).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/data");
        assert_eq!(config.timeout_secs, 2);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.retention, Some(100));
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        let overrides = ConfigOverrides {
            time_zone: Some("Mars/Olympus_Mons".into()),
            ..Default::default()
        };
        assert!(defaults().with_overrides(&overrides).is_err());
    }

    #[test]
    fn zero_retention_is_rejected() {
        let overrides = ConfigOverrides {
            retention: Some(0),
            ..Default::default()
        };
        let error = defaults().with_overrides(&overrides).unwrap_err();
        assert!(error.to_string().contains("retention"));
    }
}
