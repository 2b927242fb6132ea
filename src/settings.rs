use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, warn};

use crate::calendar::microsoft::PLACEHOLDER_CLIENT_ID;
use crate::calendar::MAX_BATCH_SIZE;

/// Prefix of the environment variables that override a setting.
const ENV_PREFIX: &str = "MED_REMINDER_";

/// Default settings, overridden key by key from the environment.
const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("client_id", PLACEHOLDER_CLIENT_ID),
    ("authority", "https://login.microsoftonline.com/consumers"),
    ("graph_base_url", "https://graph.microsoft.com/v1.0"),
    ("time_zone", "UTC"),
    ("batch_size", "20"),
    ("keyring_service", "com.med-reminder.microsoft-oauth"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown time zone {0:?}")]
    InvalidTimeZone(String),

    #[error("batch size {0:?} is not a positive integer")]
    InvalidBatchSize(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Azure app registration (application) ID.
    pub client_id: String,
    /// Identity platform authority, e.g. `https://login.microsoftonline.com/consumers`.
    pub authority: String,
    pub graph_base_url: String,
    /// Zone the dosage slots are interpreted in.
    pub time_zone: Tz,
    /// Events per Graph `$batch` call. Validated by the dispatcher, not here.
    pub batch_size: usize,
    pub keyring_service: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: PLACEHOLDER_CLIENT_ID.to_string(),
            authority: default_value("authority").to_string(),
            graph_base_url: default_value("graph_base_url").to_string(),
            time_zone: Tz::UTC,
            batch_size: MAX_BATCH_SIZE,
            keyring_service: default_value("keyring_service").to_string(),
        }
    }
}

fn default_value(key: &str) -> &'static str {
    DEFAULT_SETTINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
        .unwrap_or_default()
}

/// Environment variable that overrides `key`, e.g. `MED_REMINDER_TIME_ZONE`.
pub fn env_var_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())
}

/// Resolve the local zone from a `TZ` value and the system zone lookup.
///
/// `TZ` may be a bare IANA name or the POSIX `:/usr/share/zoneinfo/<name>`
/// form. Returns `None` when neither yields a known zone.
fn local_time_zone(tz_var: Option<String>, system: Result<String, String>) -> Option<Tz> {
    if let Some(raw) = tz_var.filter(|v| !v.trim().is_empty()) {
        match parse_tz_var(&raw) {
            Some(tz) => return Some(tz),
            None => warn!(tz = %raw, "ignoring TZ that does not name an IANA zone"),
        }
    }

    match system {
        Ok(name) => match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                warn!(zone = %name, "system time zone is not a known IANA zone");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "could not determine the system time zone");
            None
        }
    }
}

fn parse_tz_var(raw: &str) -> Option<Tz> {
    let name = raw.trim().trim_start_matches(':');
    let name = match name.find("zoneinfo/") {
        Some(idx) => &name[idx + "zoneinfo/".len()..],
        None => name,
    };
    name.parse().ok()
}

impl Settings {
    /// Build settings from the process environment (after loading `.env`).
    ///
    /// Without `MED_REMINDER_TIME_ZONE` the schedule zone is the local one:
    /// `TZ` if it names an IANA zone, else the system zone, else UTC.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| {
            let value = std::env::var(env_var_name(key)).ok();
            if value.is_none() && key == "time_zone" {
                let system = iana_time_zone::get_timezone().map_err(|e| e.to_string());
                return local_time_zone(std::env::var("TZ").ok(), system)
                    .map(|tz| tz.name().to_string());
            }
            value
        })
    }

    /// Build settings from defaults, overriding each key with `lookup(key)`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default_value(key).to_string())
        };

        let time_zone_raw = get("time_zone");
        let time_zone: Tz = time_zone_raw
            .parse()
            .map_err(|_| SettingsError::InvalidTimeZone(time_zone_raw.clone()))?;

        let batch_size_raw = get("batch_size");
        let batch_size = batch_size_raw
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| SettingsError::InvalidBatchSize(batch_size_raw.clone()))?;

        let settings = Self {
            client_id: get("client_id"),
            authority: get("authority"),
            graph_base_url: get("graph_base_url"),
            time_zone,
            batch_size,
            keyring_service: get("keyring_service"),
        };
        debug!(?settings, "loaded settings");
        Ok(settings)
    }

    /// Settings as (key, value) pairs for display.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", self.client_id.clone()),
            ("authority", self.authority.clone()),
            ("graph_base_url", self.graph_base_url.clone()),
            ("time_zone", self.time_zone.name().to_string()),
            ("batch_size", self.batch_size.to_string()),
            ("keyring_service", self.keyring_service.clone()),
        ]
    }
}
