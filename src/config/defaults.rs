use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: None,
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            mqtt: None,
            meters: Vec::new(),
            chargers: Vec::new(),
            loadpoints: Vec::new(),
            update_interval_ms: 5000,
            observe_interval_ms: 2000,
            call_timeout_ms: 1000,
        }
    }
}
