use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SENDER: &str = "CAD@CABARRUSCOUNTY.US";
pub const DEFAULT_SUBJECT_PREFIX: &str = "Dispatch Report";
pub const DEFAULT_DISPLAY_SECS: u64 = 12;
pub const DEFAULT_BACKOFF_SECS: u64 = 5;
pub const DEFAULT_IDLE_SECS: u64 = 60;
pub const DEFAULT_ROTATE_MINS: u64 = 30;

/// On-disk configuration. Every field is optional so the file can be
/// partial; the `EMAIL_*` environment variables (how the deployed panel is
/// configured) fill in or override the rest.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub mail_host: Option<String>,
    pub mail_address: Option<String>,
    pub mail_password: Option<String>,
    pub dispatch_sender: Option<String>,
    pub subject_prefix: Option<String>,
    pub display_secs: Option<u64>,
    pub ledger_path: Option<String>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub address: String,
    pub password: String,
    pub sender: String,
    pub subject_prefix: String,
    pub display_time: Duration,
    pub ledger_path: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join("dispatch-display"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_ledger_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("processed.txt");
    Ok(p)
}

/// Loads the config file (writing a template on first run) and resolves it
/// against the environment. Missing required settings are the one fatal
/// startup condition.
pub fn load_settings() -> Result<Settings> {
    resolve(read_config_file()?, EnvOverrides::from_process_env())
}

fn read_config_file() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        // write a template for hosts configured by file instead of env
        let sample = Config {
            dispatch_sender: Some(DEFAULT_SENDER.to_string()),
            subject_prefix: Some(DEFAULT_SUBJECT_PREFIX.to_string()),
            display_secs: Some(DEFAULT_DISPLAY_SECS),
            ..Default::default()
        };
        let tom = toml::to_string_pretty(&sample)?;
        if let Err(e) = fs::write(&path, tom) {
            log::warn!("could not write template config to {}: {e}", path.display());
        }
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&path)?;
    toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
}

pub struct EnvOverrides {
    pub host: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
}

impl EnvOverrides {
    pub fn from_process_env() -> Self {
        Self {
            host: env::var("EMAIL_HOST").ok(),
            address: env::var("EMAIL_ADDRESS").ok(),
            password: env::var("EMAIL_PASSWORD").ok(),
        }
    }

    pub fn none() -> Self {
        Self {
            host: None,
            address: None,
            password: None,
        }
    }
}

pub fn resolve(cfg: Config, env: EnvOverrides) -> Result<Settings> {
    let host = env
        .host
        .or(cfg.mail_host)
        .ok_or_else(|| anyhow!("EMAIL_HOST not set (env, or mail_host in config)"))?;
    let address = env
        .address
        .or(cfg.mail_address)
        .ok_or_else(|| anyhow!("EMAIL_ADDRESS not set (env, or mail_address in config)"))?;
    let password = env
        .password
        .or(cfg.mail_password)
        .ok_or_else(|| anyhow!("EMAIL_PASSWORD not set (env, or mail_password in config)"))?;

    let ledger_path = match cfg.ledger_path {
        Some(p) => PathBuf::from(p),
        None => default_ledger_path()?,
    };

    Ok(Settings {
        host,
        address,
        password,
        sender: cfg
            .dispatch_sender
            .unwrap_or_else(|| DEFAULT_SENDER.to_string()),
        subject_prefix: cfg
            .subject_prefix
            .unwrap_or_else(|| DEFAULT_SUBJECT_PREFIX.to_string()),
        display_time: Duration::from_secs(cfg.display_secs.unwrap_or(DEFAULT_DISPLAY_SECS)),
        ledger_path,
    })
}
