use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dialer_core::rules::RetryPolicy;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const APP_DIR: &str = "dialer";
const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;
pub const MAX_CONCURRENCY_LIMIT: usize = 1000;
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_STUCK_THRESHOLD_SECS: i64 = 5 * 60;
pub const DEFAULT_ANSWERED_STUCK_THRESHOLD_SECS: i64 = 2 * 60 * 60;
pub const DEFAULT_RECOVERY_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RING_TIMEOUT_SECS: u32 = 30;
pub const DEFAULT_TOKEN_ENV: &str = "DIALER_TELEPHONY_TOKEN";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub retry: RetryPolicy,
    pub telephony: TelephonyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub concurrency_limit: usize,
    pub tick_interval_secs: u64,
    pub stuck_threshold_secs: i64,
    /// Silence allowed on an answered call before recovery closes it.
    pub answered_stuck_threshold_secs: i64,
    /// `None` disables the recurring stuck-lead sweep.
    pub recovery_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelephonyConfig {
    pub endpoint: Option<Url>,
    pub from_number: Option<String>,
    pub callback_base_url: Option<Url>,
    pub ring_timeout_secs: u32,
    pub auth_token_env: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig {
                concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
                tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
                stuck_threshold_secs: DEFAULT_STUCK_THRESHOLD_SECS,
                answered_stuck_threshold_secs: DEFAULT_ANSWERED_STUCK_THRESHOLD_SECS,
                recovery_interval_secs: Some(DEFAULT_RECOVERY_INTERVAL_SECS),
            },
            retry: RetryPolicy::default(),
            telephony: TelephonyConfig {
                endpoint: None,
                from_number: None,
                callback_base_url: None,
                ring_timeout_secs: DEFAULT_RING_TIMEOUT_SECS,
                auth_token_env: DEFAULT_TOKEN_ENV.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing home directory")]
    MissingHomeDir,
    #[error("invalid config path: {0}")]
    InvalidConfigPath(PathBuf),
    #[error("config file not found: {0}")]
    MissingConfigFile(PathBuf),
    #[error("config file permissions too permissive: {0}")]
    InsecurePermissions(PathBuf),
    #[error("invalid dispatcher.concurrency_limit value: {0}")]
    InvalidConcurrencyLimit(usize),
    #[error("invalid dispatcher.{field} value: {value}")]
    InvalidInterval { field: &'static str, value: i64 },
    #[error("invalid retry settings: {0}")]
    InvalidRetry(#[from] dialer_core::CoreError),
    #[error("invalid telephony.{field}: {message}")]
    InvalidTelephonyField {
        field: &'static str,
        message: String,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    dispatcher: Option<DispatcherFile>,
    retry: Option<RetryFile>,
    telephony: Option<TelephonyFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DispatcherFile {
    concurrency_limit: Option<usize>,
    tick_interval_secs: Option<u64>,
    stuck_threshold_secs: Option<i64>,
    answered_stuck_threshold_secs: Option<i64>,
    recovery_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryFile {
    max_attempts: Option<i32>,
    no_answer_delay_secs: Option<i64>,
    busy_delay_secs: Option<i64>,
    failed_delay_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TelephonyFile {
    endpoint: Option<String>,
    from_number: Option<String>,
    callback_base_url: Option<String>,
    ring_timeout_secs: Option<u32>,
    auth_token_env: Option<String>,
}

pub fn load(config_path: Option<PathBuf>) -> Result<AppConfig> {
    let required = config_path.is_some();
    let path = match resolve_config_path(config_path) {
        Ok(path) => path,
        Err(ConfigError::MissingHomeDir) if !required => return Ok(AppConfig::default()),
        Err(ConfigError::InvalidConfigPath(_)) if !required => return Ok(AppConfig::default()),
        Err(err) => return Err(err),
    };
    match load_at_path(&path, required)? {
        Some(config) => Ok(config),
        None => Ok(AppConfig::default()),
    }
}

pub fn resolve_config_path(custom: Option<PathBuf>) -> Result<PathBuf> {
    match custom {
        Some(path) => {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidConfigPath(path));
            }
            Ok(path)
        }
        None => {
            let base = if let Some(dir) = env::var_os("XDG_CONFIG_HOME") {
                let path = PathBuf::from(dir);
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::InvalidConfigPath(path));
                }
                path
            } else {
                let home = dirs::home_dir().ok_or(ConfigError::MissingHomeDir)?;
                home.join(".config")
            };
            Ok(base.join(APP_DIR).join(CONFIG_FILENAME))
        }
    }
}

pub fn parse_str(contents: &str, path: &Path) -> Result<AppConfig> {
    let parsed: ConfigFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    merge_config(parsed)
}

fn load_at_path(path: &Path, required: bool) -> Result<Option<AppConfig>> {
    if !path.exists() {
        if required {
            return Err(ConfigError::MissingConfigFile(path.to_path_buf()));
        }
        return Ok(None);
    }

    ensure_permissions(path)?;
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(parse_str(&contents, path)?))
}

fn merge_config(parsed: ConfigFile) -> Result<AppConfig> {
    let mut config = AppConfig::default();

    if let Some(dispatcher) = parsed.dispatcher {
        merge_dispatcher(&mut config.dispatcher, dispatcher)?;
    }

    if let Some(retry) = parsed.retry {
        if let Some(value) = retry.max_attempts {
            config.retry.max_attempts = value;
        }
        if let Some(value) = retry.no_answer_delay_secs {
            config.retry.no_answer_delay_secs = value;
        }
        if let Some(value) = retry.busy_delay_secs {
            config.retry.busy_delay_secs = value;
        }
        if let Some(value) = retry.failed_delay_secs {
            config.retry.failed_delay_secs = value;
        }
        config.retry.validate()?;
    }

    if let Some(telephony) = parsed.telephony {
        merge_telephony(&mut config.telephony, telephony)?;
    }

    Ok(config)
}

fn merge_dispatcher(config: &mut DispatcherConfig, file: DispatcherFile) -> Result<()> {
    if let Some(limit) = file.concurrency_limit {
        if limit == 0 || limit > MAX_CONCURRENCY_LIMIT {
            return Err(ConfigError::InvalidConcurrencyLimit(limit));
        }
        config.concurrency_limit = limit;
    }
    if let Some(secs) = file.tick_interval_secs {
        if secs == 0 {
            return Err(ConfigError::InvalidInterval {
                field: "tick_interval_secs",
                value: 0,
            });
        }
        config.tick_interval_secs = secs;
    }
    if let Some(secs) = file.stuck_threshold_secs {
        if secs <= 0 {
            return Err(ConfigError::InvalidInterval {
                field: "stuck_threshold_secs",
                value: secs,
            });
        }
        config.stuck_threshold_secs = secs;
    }
    if let Some(secs) = file.answered_stuck_threshold_secs {
        if secs <= 0 {
            return Err(ConfigError::InvalidInterval {
                field: "answered_stuck_threshold_secs",
                value: secs,
            });
        }
        config.answered_stuck_threshold_secs = secs;
    }
    if let Some(secs) = file.recovery_interval_secs {
        config.recovery_interval_secs = if secs == 0 { None } else { Some(secs) };
    }
    Ok(())
}

fn merge_telephony(config: &mut TelephonyConfig, file: TelephonyFile) -> Result<()> {
    if let Some(raw) = file.endpoint {
        config.endpoint = Some(parse_http_url("endpoint", &raw)?);
    }
    if let Some(raw) = file.callback_base_url {
        config.callback_base_url = Some(parse_http_url("callback_base_url", &raw)?);
    }
    if let Some(raw) = file.from_number {
        let normalized = dialer_core::normalize_phone(&raw).ok_or_else(|| {
            ConfigError::InvalidTelephonyField {
                field: "from_number",
                message: format!("not a dialable number: {raw}"),
            }
        })?;
        config.from_number = Some(normalized);
    }
    if let Some(secs) = file.ring_timeout_secs {
        if secs == 0 {
            return Err(ConfigError::InvalidTelephonyField {
                field: "ring_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        config.ring_timeout_secs = secs;
    }
    if let Some(name) = file.auth_token_env {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidTelephonyField {
                field: "auth_token_env",
                message: "cannot be empty".to_string(),
            });
        }
        config.auth_token_env = trimmed.to_string();
    }
    Ok(())
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidTelephonyField {
        field,
        message: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidTelephonyField {
            field,
            message: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}

#[cfg(unix)]
fn ensure_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mode = metadata.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(ConfigError::InsecurePermissions(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
