use std::collections::BTreeMap;
use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Process-wide worker configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `redis` or `memory`
    pub queue_type: String,
    pub queue_address: String,
    pub queue_name: String,
    /// Seconds to block on a single fetch.
    pub poll_interval: u64,
    /// Maximum probe attempts per job.
    pub retries: u32,
    /// Seconds to sleep between failed attempts.
    pub retry_delay: u64,
    /// Per-probe deadline in seconds.
    pub timeout: u64,
    /// Comma-separated alerter names.
    pub alerter: String,
    pub alerter_targets: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_type: "redis".into(),
            queue_address: "redis://127.0.0.1:6379".into(),
            queue_name: "warden:jobs".into(),
            poll_interval: 5,
            retries: 5,
            retry_delay: 0,
            timeout: 30,
            alerter: "file".into(),
            alerter_targets: BTreeMap::new(),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/warden/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, SettingsError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(SettingsError::ConfigPathUnavailable);
    };

    Ok(path.join("warden/config.toml"))
}

/// Destination used when `[alerter_targets]` has no entry for a well-known alerter.
fn default_alerter_target(name: &str) -> &'static str {
    match name {
        "file" => "alerts.log",
        "redis" => "redis://127.0.0.1:6379",
        "webhook" => "http://127.0.0.1:8080/alerts",
        _ => "",
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Worker Settings:")?;
        write_title_1(f, "Queue")?;
        write_1(f, "Type", &self.queue_type)?;
        write_1(f, "Address", &self.queue_address)?;
        write_1(f, "Name", &self.queue_name)?;
        write_1(f, "Poll Interval (s)", &self.poll_interval)?;
        write_title_1(f, "Probes")?;
        write_1(f, "Retries", &self.retries)?;
        write_1(f, "Retry Delay (s)", &self.retry_delay)?;
        write_1(f, "Timeout (s)", &self.timeout)?;
        write_title_1(f, "Alerters")?;
        for name in self.alerters() {
            write_1(f, name, &self.alerter_target(name))?;
        }

        Ok(())
    }
}

impl Settings {
    /// Load settings from a TOML file
    ///
    /// Creates a default config in ~/.config/warden/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let settings = Settings::from_config(None::<&path::Path>)?;
    /// println!("{}", settings);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, SettingsError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let settings = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(SettingsError::ReadFailed)?;
            Self::from_toml(&raw_string)?
        } else {
            let settings = Self::default();
            settings.write_config(&config_path)?;
            settings
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Self, SettingsError> {
        toml::from_str(raw).map_err(|err| SettingsError::ParseFailed(err.to_string()))
    }

    /// Serialize and write settings to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), SettingsError> {
        let config_str: String =
            toml::to_string_pretty(self).map_err(|err| SettingsError::ParseFailed(err.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(SettingsError::WriteFailed)
    }

    /// Reject values the dispatcher cannot work with.
    ///
    /// A retry budget of zero would leave a job without any outcome at all, so it is
    /// refused here instead of being read as "always pass" or "always fail".
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.retries == 0 {
            return Err(SettingsError::Invalid("retries must be at least 1".into()));
        }
        if self.timeout == 0 {
            return Err(SettingsError::Invalid("timeout must be at least 1 second".into()));
        }
        if self.poll_interval == 0 {
            return Err(SettingsError::Invalid("poll_interval must be at least 1 second".into()));
        }
        if self.alerters().next().is_none() {
            return Err(SettingsError::Invalid("at least one alerter must be configured".into()));
        }
        Ok(())
    }

    /// Configured alerter names, in listed order.
    pub fn alerters(&self) -> impl Iterator<Item = &str> {
        self.alerter.split(',').map(str::trim).filter(|name| !name.is_empty())
    }

    /// Destination for the named alerter, falling back to a built-in default.
    pub fn alerter_target(&self, name: &str) -> String {
        self.alerter_targets
            .get(name)
            .cloned()
            .unwrap_or_else(|| default_alerter_target(name).to_string())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
