use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::portal::{DEFAULT_GRADEBOOK_PATH, DEFAULT_LOGIN_PATH};

pub const USERNAME_ENV: &str = "GRADEBOOK_USERNAME";
pub const PASSWORD_ENV: &str = "GRADEBOOK_PASSWORD";
pub const REPORTS_DEST_ENV: &str = "GRADEBOOK_REPORTS_DEST";
pub const CHANGES_DEST_ENV: &str = "GRADEBOOK_CHANGES_DEST";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub destinations: DestinationsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_gradebook_path")]
    pub gradebook_path: String,
}

#[derive(Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Destination identifiers handed to the notification sink, usually webhook URLs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DestinationsConfig {
    #[serde(default)]
    pub reports: String,
    #[serde(default)]
    pub changes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    #[serde(default = "default_change_interval_secs")]
    pub change_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub reports_destination: Option<String>,
    pub changes_destination: Option<String>,
}

impl ConfigOverrides {
    pub fn from_env() -> Self {
        let read = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            username: read(USERNAME_ENV),
            password: read(PASSWORD_ENV),
            reports_destination: read(REPORTS_DEST_ENV),
            changes_destination: read(CHANGES_DEST_ENV),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/gradebook-watch/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(username) = overrides.username {
            self.credentials.username = username;
        }
        if let Some(password) = overrides.password {
            self.credentials.password = password;
        }
        if let Some(reports) = overrides.reports_destination {
            self.destinations.reports = reports;
        }
        if let Some(changes) = overrides.changes_destination {
            self.destinations.changes = changes;
        }
    }

    /// Everything the scheduler cannot run without.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.credentials.username.trim().is_empty() {
            missing.push("credentials.username");
        }
        if self.credentials.password.is_empty() {
            missing.push("credentials.password");
        }
        if self.destinations.reports.trim().is_empty() {
            missing.push("destinations.reports");
        }
        if self.destinations.changes.trim().is_empty() {
            missing.push("destinations.changes");
        }
        if !missing.is_empty() {
            return Err(anyhow!("missing configuration: {}", missing.join(", ")));
        }
        if self.schedule.report_interval_secs == 0 || self.schedule.change_interval_secs == 0 {
            return Err(anyhow!("schedule intervals must be positive"));
        }
        Ok(())
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn default_template() -> String {
        let template = r#"[portal]
base_url = "https://studentvue.example.org"
login_path = "/PXP2_Login_Student.aspx?regenerateSessionId=True"
gradebook_path = "/PXP2_Gradebook.aspx?AGU=0"

# Prefer GRADEBOOK_USERNAME / GRADEBOOK_PASSWORD in the environment.
[credentials]
username = ""
password = ""

[destinations]
reports = ""
changes = ""

[schedule]
report_interval_secs = 21600
change_interval_secs = 900

[server]
host = "127.0.0.1"
port = 3030
"#;
        template.to_string()
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            login_path: default_login_path(),
            gradebook_path: default_gradebook_path(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
            change_interval_secs: default_change_interval_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_base_url() -> String {
    "https://studentvue.example.org".to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_gradebook_path() -> String {
    DEFAULT_GRADEBOOK_PATH.to_string()
}

fn default_report_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_change_interval_secs() -> u64 {
    15 * 60
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3030
}
