use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use thiserror::Error;

use crate::client::PropagationPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Engine-wide settings. Every field has a default so partial documents load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default = "default_poll_interval", with = "duration_ms")]
    pub poll_interval: Duration,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_true")]
    pub template: bool,

    #[serde(default = "default_compiler")]
    pub default_compiler: String,

    #[serde(default)]
    pub skip_delete: bool,

    #[serde(default, with = "option_duration_ms")]
    pub delay_before_cleanup: Option<Duration>,

    #[serde(default)]
    pub deletion_propagation: PropagationPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_apply_timeout", with = "duration_ms")]
    pub apply: Duration,
    #[serde(default = "default_assert_timeout", with = "duration_ms")]
    pub assert: Duration,
    #[serde(default = "default_cleanup_timeout", with = "duration_ms")]
    pub cleanup: Duration,
    #[serde(default = "default_delete_timeout", with = "duration_ms")]
    pub delete: Duration,
    #[serde(default = "default_error_timeout", with = "duration_ms")]
    pub error: Duration,
    #[serde(default = "default_exec_timeout", with = "duration_ms")]
    pub exec: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            apply: default_apply_timeout(),
            assert: default_assert_timeout(),
            cleanup: default_cleanup_timeout(),
            delete: default_delete_timeout(),
            error: default_error_timeout(),
            exec: default_exec_timeout(),
        }
    }
}

impl Timeouts {
    fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> {
        [
            ("apply", self.apply),
            ("assert", self.assert),
            ("cleanup", self.cleanup),
            ("delete", self.delete),
            ("error", self.error),
            ("exec", self.exec),
        ]
        .into_iter()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            poll_interval: default_poll_interval(),
            namespace: default_namespace(),
            template: default_true(),
            default_compiler: default_compiler(),
            skip_delete: false,
            delay_before_cleanup: None,
            deletion_propagation: PropagationPolicy::default(),
        }
    }
}

impl Configuration {
    /// Loads a JSON or YAML file, picked by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }
        if let Some((name, _)) = self.timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(ConfigError::Invalid(format!(
                "timeouts.{} must be positive",
                name
            )));
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }
        Ok(())
    }
}

// デフォルト値の定義
fn default_apply_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_assert_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_cleanup_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_delete_timeout() -> Duration {
    Duration::from_secs(15)
}
fn default_error_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_exec_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_namespace() -> String {
    "chainsaw".to_string()
}
fn default_compiler() -> String {
    "jp".to_string()
}
fn default_true() -> bool {
    true
}

// Duration型のシリアライズ/デシリアライズヘルパー
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub(crate) mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
