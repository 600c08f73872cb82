extern crate chrono_tz;
extern crate serde;
extern crate serde_json;

use crate::result::ConfigError;
use crate::structs::{Direction, StopFilter};

pub const API_KEY_ENV: &str = "MBTA_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyPlacement {
    Header,
    Query,
}

impl Default for ApiKeyPlacement {
    fn default() -> ApiKeyPlacement {
        return ApiKeyPlacement::Header;
    }
}

/// How `arrival_time` strings are turned into instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// RFC 3339, honoring the offset the feed sends.
    OffsetAware,
    /// Date and time-of-day cut out at fixed positions and read as wall-clock
    /// time in the configured timezone. The offset suffix is ignored.
    LocalWallClock,
}

impl Default for TimestampMode {
    fn default() -> TimestampMode {
        return TimestampMode::OffsetAware;
    }
}

#[derive(Debug, Deserialize)]
struct DirectionFile {
    name: String,
    stop: String,
}

// Layout of the JSON config file, before validation.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_api_base_url")]
    api_base_url: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_key_placement: ApiKeyPlacement,
    directions: Vec<DirectionFile>,
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default)]
    timestamp_mode: TimestampMode,
    #[serde(default = "default_timezone")]
    timezone: String,
}

fn default_api_base_url() -> String {
    return "https://api-v3.mbta.com".to_string();
}

fn default_poll_interval_secs() -> u64 {
    return 15;
}

fn default_request_timeout_secs() -> u64 {
    return 5;
}

fn default_timezone() -> String {
    return "America/New_York".to_string();
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: String,
    pub api_key_placement: ApiKeyPlacement,
    pub directions: [Direction; 2],
    pub poll_interval: std::time::Duration,
    pub request_timeout: std::time::Duration,
    pub timestamp_mode: TimestampMode,
    pub timezone: chrono_tz::Tz,
}

impl Config {
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Config, ConfigError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let raw: ConfigFile = serde_json::from_reader(reader)?;
        return Config::validate(raw, std::env::var(API_KEY_ENV).ok());
    }

    pub fn from_json(json: &str, env_api_key: Option<String>) -> Result<Config, ConfigError> {
        let raw: ConfigFile = serde_json::from_str(json)?;
        return Config::validate(raw, env_api_key);
    }

    fn validate(raw: ConfigFile, env_api_key: Option<String>) -> Result<Config, ConfigError> {
        let ConfigFile{
            api_base_url, api_key, api_key_placement, directions,
            poll_interval_secs, request_timeout_secs, timestamp_mode, timezone,
        } = raw;

        // The environment wins so the key can stay out of checked-in configs.
        let api_key = env_api_key
            .filter(|k| !k.trim().is_empty())
            .or(api_key)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        // Sent verbatim in a header or query string.
        if !api_key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ConfigError::InvalidApiKey);
        }

        let api_base_url = api_base_url.trim().trim_end_matches('/').to_string();
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(api_base_url));
        }

        if directions.len() != 2 {
            return Err(ConfigError::WrongDirectionCount(directions.len()));
        }
        let mut validated = vec![];
        for (i, d) in directions.iter().enumerate() {
            if d.name.trim().is_empty() {
                return Err(ConfigError::EmptyDirectionName(i));
            }
            validated.push(Direction{
                name: d.name.trim().to_string(),
                stop: StopFilter::new(&d.stop)?,
            });
        }
        let second = validated.pop().ok_or(ConfigError::WrongDirectionCount(1))?;
        let first = validated.pop().ok_or(ConfigError::WrongDirectionCount(0))?;

        if poll_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("poll_interval_secs"));
        }
        if request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("request_timeout_secs"));
        }

        let tz: chrono_tz::Tz = timezone.parse()
            .map_err(|_| ConfigError::UnknownTimezone(timezone.clone()))?;

        return Ok(Config{
            api_base_url: api_base_url,
            api_key: api_key,
            api_key_placement: api_key_placement,
            directions: [first, second],
            poll_interval: std::time::Duration::from_secs(poll_interval_secs),
            request_timeout: std::time::Duration::from_secs(request_timeout_secs),
            timestamp_mode: timestamp_mode,
            timezone: tz,
        });
    }
}

#[cfg(test)]
pub fn test_config() -> Config {
    return Config::from_json(
        r#"{"api_key": "test-key",
            "directions": [{"name": "Forest Hills", "stop": "70028"},
                           {"name": "Oak Grove", "stop": "70029"}]}"#,
        None).expect("test config");
}
