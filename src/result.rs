extern crate anyhow;
extern crate thiserror;

use crate::structs::StopFilter;

pub type TrackerResult<T> = anyhow::Result<T>;

pub fn make_error(msg: &str) -> anyhow::Error {
    return anyhow::anyhow!(msg.to_string());
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} while fetching {url}")]
    Status { status: u16, url: String },
    #[error("timed out after {after:?} while fetching {url}")]
    Timeout { url: String, after: std::time::Duration },
    #[error("transport error while fetching {url}: {message}")]
    Transport { url: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid prediction JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected at least {expected} predictions, found {found}")]
    TooFewPredictions { expected: usize, found: usize },
    #[error("prediction #{index} has no arrival_time")]
    MissingArrivalTime { index: usize },
    #[error("prediction #{index} has malformed arrival_time '{value}'")]
    MalformedArrivalTime { index: usize, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("api_key is missing (set it in the config or in MBTA_API_KEY)")]
    MissingApiKey,
    #[error("api_key may only contain ASCII letters, digits, '-' and '_'")]
    InvalidApiKey,
    #[error("api_base_url '{0}' must start with http:// or https://")]
    InvalidBaseUrl(String),
    #[error("exactly 2 directions are required, found {0}")]
    WrongDirectionCount(usize),
    #[error("direction #{0} has an empty name")]
    EmptyDirectionName(usize),
    #[error("invalid stop filter '{0}'")]
    InvalidStopFilter(String),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

/// Why a poll cycle was abandoned.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("fetching stop {stop}: {source}")]
    Fetch {
        stop: StopFilter,
        #[source]
        source: FetchError,
    },
    #[error("parsing stop {stop}: {source}")]
    Parse {
        stop: StopFilter,
        #[source]
        source: ParseError,
    },
}
