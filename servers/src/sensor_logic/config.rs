use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Sensor Replay HTTP/SSE Server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "SENSOR_HOST", help = "Address to bind the HTTP server to.")]
    pub host: Option<String>,

    #[clap(long, env = "SENSOR_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "SENSOR_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "SENSOR_DATA_PATH", help = "Path to the CSV file with the sensor readings to replay.")]
    pub data_path: Option<PathBuf>,

    #[clap(long, env = "SENSOR_REPLAY_INTERVAL_MS", help = "Milliseconds between replay ticks.")]
    pub replay_interval_ms: Option<u64>,

    #[clap(long, env = "SENSOR_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "SENSOR_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "TLS_CERT_PATH", help = "Path to the TLS certificate file.")]
    pub tls_cert_path: Option<PathBuf>,

    #[clap(long, env = "TLS_KEY_PATH", help = "Path to the TLS private key file.")]
    pub tls_key_path: Option<PathBuf>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            data_path: other.data_path.or(self.data_path),
            replay_interval_ms: other.replay_interval_ms.or(self.replay_interval_ms),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            tls_cert_path: other.tls_cert_path.or(self.tls_cert_path),
            tls_key_path: other.tls_key_path.or(self.tls_key_path),
        }
    }

    // Every unset field falls back here, so the defaults live in one place
    // instead of being scattered across the call sites.

    pub fn host(&self) -> String {
        self.host.clone().unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(3000)
    }

    pub fn data_path(&self) -> PathBuf {
        self.data_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("data/sensor_data.csv"))
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms.unwrap_or(2000))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }
}

pub fn load_config() -> Config {
    // 1. Parse CLI arguments (which include env vars) first, so a
    //    --config-path override is honored when locating the file.
    let cli_args = Config::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_sensor.conf"));

    // 2. Load from config file (server_sensor.conf) if present.
    let mut current_config = Config::default();

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<Config>(&config_str) {
                current_config = current_config.merge(file_config);
            } else {
                log::warn!("Failed to parse config file: {}. Falling back to other sources.", config_file_path.display());
            }
        } else {
            log::warn!("Failed to read config file: {}. Falling back to other sources.", config_file_path.display());
        }
    } else {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", config_file_path.display());
    }

    // 3. Environment variables and CLI arguments override the file.
    current_config.merge(cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_fall_back_to_the_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), 3000);
        assert_eq!(config.data_path(), PathBuf::from("data/sensor_data.csv"));
        assert_eq!(config.replay_interval(), Duration::from_millis(2000));
        assert_eq!(config.log_dir(), PathBuf::from("./logs"));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn merge_prefers_the_overriding_config() {
        let base = Config {
            port: Some(3000),
            log_level: Some("info".to_string()),
            ..Default::default()
        };
        let overriding = Config {
            port: Some(8080),
            data_path: Some(PathBuf::from("other.csv")),
            ..Default::default()
        };

        let merged = base.merge(overriding);
        assert_eq!(merged.port(), 8080);
        assert_eq!(merged.data_path(), PathBuf::from("other.csv"));
        // Fields the override left unset keep the base value.
        assert_eq!(merged.log_level(), "info");
    }

    #[test]
    fn file_config_accepts_camel_case_keys() {
        let json = r#"{"port": 4000, "replayIntervalMs": 500, "dataPath": "fixture.csv"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.port(), 4000);
        assert_eq!(config.replay_interval(), Duration::from_millis(500));
        assert_eq!(config.data_path(), PathBuf::from("fixture.csv"));
    }
}
