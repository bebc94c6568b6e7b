//! Test configuration builder writing `main.toml` into a temp directory

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestConfigBuilder {
    temp_dir: TempDir,
    time_zone: String,
    dst: (String, String),
    standard: (String, String),
    detector_schedule: String,
}

pub struct TestConfig {
    // Held so the directory outlives the test
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestConfig {
    pub fn dir(&self) -> &str {
        self.config_dir.to_str().unwrap()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            time_zone: "America/New_York".to_string(),
            dst: ("06:00:00".to_string(), "08:00:00".to_string()),
            standard: ("07:00:00".to_string(), "09:00:00".to_string()),
            detector_schedule: "0 0 * * * *".to_string(),
        }
    }

    pub fn with_time_zone(mut self, zone: &str) -> Self {
        self.time_zone = zone.to_string();
        self
    }

    pub fn with_dst_window(mut self, start: &str, end: &str) -> Self {
        self.dst = (start.to_string(), end.to_string());
        self
    }

    pub fn with_detector_schedule(mut self, schedule: &str) -> Self {
        self.detector_schedule = schedule.to_string();
        self
    }

    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        let main_toml = format!(
            r#"
port = 9100
database_path = "{db}"

[window]
time_zone = "{zone}"
dst_start = "{dst_start}"
dst_end = "{dst_end}"
standard_start = "{st_start}"
standard_end = "{st_end}"

[queues]
stop = "retirement-stop"
start = "retirement-start"

[triggers]
stop = "retirement-stop-poller"
start = "retirement-start-poller"

[compute]
base_url = "http://127.0.0.1:9999"
api_token = "token"

[schedule]
detector = "{detector}"
"#,
            db = self.temp_dir.path().join("coordinator.db").display(),
            zone = self.time_zone,
            dst_start = self.dst.0,
            dst_end = self.dst.1,
            st_start = self.standard.0,
            st_end = self.standard.1,
            detector = self.detector_schedule,
        );
        fs::write(config_dir.join("main.toml"), main_toml).expect("Failed to write main.toml");

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}
