use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_INTERVAL_MS: u64 = 6000;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AppConfig {
    pub log_level: String,
    /// Pause between polling cycles. Each cycle makes two requests, so the
    /// default keeps within a 20 requests/minute quota.
    pub interval_ms: u64,
    pub endpoint: String,
    pub capture_width: u32,
    pub debug_console: bool,
    pub data_dir: PathBuf,
}

pub struct AppConfigOverrides {
    pub log_level: Option<String>,
    pub interval_ms: Option<u64>,
    pub endpoint: Option<String>,
    pub capture_width: Option<u32>,
    pub data_dir: Option<PathBuf>,
    pub debug_console: bool,
}

pub fn default_config_path() -> PathBuf {
    settings::default_data_dir().join("config.toml")
}

impl AppConfig {
    pub fn load_from(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(default_config_path);
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .build()
            .unwrap_or_default();

        let log_level = cfg
            .get_string("log_level")
            .unwrap_or_else(|_| "info".to_string());
        let interval_ms = cfg
            .get_int("interval_ms")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(DEFAULT_INTERVAL_MS);
        let endpoint = cfg
            .get_string("endpoint")
            .unwrap_or_else(|_| api_client::DEFAULT_BASE_URL.to_string());
        let capture_width = cfg
            .get_int("capture_width")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(capture::DEFAULT_WIDTH);
        let debug_console = cfg.get_bool("debug_console").unwrap_or(false);
        let data_dir = cfg
            .get_string("data_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|_| settings::default_data_dir());

        Self {
            log_level,
            interval_ms,
            endpoint,
            capture_width,
            debug_console,
            data_dir,
        }
    }

    pub fn apply_overrides(mut self, ov: &AppConfigOverrides) -> Self {
        if let Some(l) = &ov.log_level {
            self.log_level = l.clone();
        }
        if let Some(i) = ov.interval_ms {
            self.interval_ms = i;
        }
        if let Some(e) = &ov.endpoint {
            self.endpoint = e.clone();
        }
        if let Some(w) = ov.capture_width {
            self.capture_width = w;
        }
        if let Some(d) = &ov.data_dir {
            self.data_dir = d.clone();
        }
        if ov.debug_console {
            self.debug_console = true;
        }
        self
    }

    pub fn save_to(&self, path: Option<PathBuf>) -> std::io::Result<()> {
        let path = path.unwrap_or_else(default_config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = toml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(Some(dir.path().join("missing.toml")));
        assert_eq!(cfg.interval_ms, DEFAULT_INTERVAL_MS);
        assert_eq!(cfg.endpoint, api_client::DEFAULT_BASE_URL);
        assert_eq!(cfg.capture_width, capture::DEFAULT_WIDTH);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_out_of_range_numbers_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "interval_ms = -5\ncapture_width = 5000000000\n").unwrap();

        let cfg = AppConfig::load_from(Some(path));
        assert_eq!(cfg.interval_ms, DEFAULT_INTERVAL_MS);
        assert_eq!(cfg.capture_width, capture::DEFAULT_WIDTH);
    }

    #[test]
    fn test_save_load_and_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = AppConfig::load_from(Some(path.clone()));
        cfg.interval_ms = 12000;
        cfg.log_level = "debug".into();
        cfg.save_to(Some(path.clone())).unwrap();

        let loaded = AppConfig::load_from(Some(path)).apply_overrides(&AppConfigOverrides {
            log_level: None,
            interval_ms: Some(3000),
            endpoint: Some("http://localhost:9".into()),
            capture_width: None,
            data_dir: None,
            debug_console: false,
        });
        assert_eq!(loaded.log_level, "debug");
        assert_eq!(loaded.interval_ms, 3000);
        assert_eq!(loaded.endpoint, "http://localhost:9");
        assert!(!loaded.debug_console);
    }
}
