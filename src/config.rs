use std::env;

use log::LevelFilter;
use reqwest::Url;
use thiserror::Error;


const BACKEND_URL: &str = "BACKEND_URL";
const BACKEND_ANON_KEY: &str = "BACKEND_ANON_KEY";
const STORAGE_BUCKET: &str = "STORAGE_BUCKET";
const REPORT_TABLE: &str = "REPORT_TABLE";
const SERVER_ADDRESS: &str = "SERVER_ADDRESS";
const SERVER_PORT: &str = "SERVER_PORT";
const LOG_LEVEL: &str = "LOG_LEVEL";
const REQUIRE_REPORT_IMAGE: &str = "REQUIRE_REPORT_IMAGE";
const SENTRY_DSN: &str = "SENTRY_DSN";

const DEFAULT_BUCKET: &str = "pollution-images";
const DEFAULT_TABLE: &str = "pollution_reports";
const DEFAULT_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;


#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        reason: String,
    },
}

impl ConfigError {
    fn invalid<R: ToString>(name: &'static str, reason: R) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.to_string(),
        }
    }
}


/// Where the managed backend lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: String,
    pub bucket: String,
    pub table: String,
}


#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend: BackendConfig,
    pub address: String,
    pub port: u16,
    pub log_level: LevelFilter,
    /// Whether a report needs a photo before it is saved.
    pub require_image: bool,
    pub sentry_dsn: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Reads every setting through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String> {

        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let url = read(BACKEND_URL).ok_or(ConfigError::Missing(BACKEND_URL))?;
        let parsed = Url::parse(&url).map_err(|err| ConfigError::invalid(BACKEND_URL, err))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::invalid(BACKEND_URL, "expected an http or https URL"));
        }

        let api_key = read(BACKEND_ANON_KEY).ok_or(ConfigError::Missing(BACKEND_ANON_KEY))?;

        let port = match read(SERVER_PORT) {
            Some(port) => port.parse::<u16>().map_err(|err| ConfigError::invalid(SERVER_PORT, err))?,
            None => DEFAULT_PORT,
        };

        let log_level = match read(LOG_LEVEL) {
            Some(level) => level.parse::<LevelFilter>().map_err(|err| ConfigError::invalid(LOG_LEVEL, err))?,
            None => LevelFilter::Info,
        };

        let require_image = match read(REQUIRE_REPORT_IMAGE) {
            Some(flag) => parse_flag(&flag)
                .ok_or_else(|| ConfigError::invalid(REQUIRE_REPORT_IMAGE, "expected true or false"))?,
            None => true,
        };

        let sentry_dsn = read(SENTRY_DSN);
        if let Some(dsn) = &sentry_dsn {
            dsn.parse::<sentry::types::Dsn>()
                .map_err(|err| ConfigError::invalid(SENTRY_DSN, err))?;
        }

        Ok(Config {
            backend: BackendConfig {
                url,
                api_key,
                bucket: read(STORAGE_BUCKET).unwrap_or_else(|| DEFAULT_BUCKET.to_owned()),
                table: read(REPORT_TABLE).unwrap_or_else(|| DEFAULT_TABLE.to_owned()),
            },
            address: read(SERVER_ADDRESS).unwrap_or_else(|| DEFAULT_ADDRESS.to_owned()),
            port,
            log_level,
            require_image,
            sentry_dsn,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
