extern crate reqwest;

use crate::config::{ApiKeyPlacement, Config};
use crate::result::{self, FetchError};
use crate::structs::StopFilter;

use anyhow::Context;

const API_KEY_HEADER: &str = "x-api-key";
const USER_AGENT: &str = "subwaytracker (+https://github.com/mrjones)";

/// One outbound prediction request. `redacted_url` is safe to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionRequest {
    pub url: String,
    pub redacted_url: String,
    pub api_key_header: Option<(&'static str, String)>,
}

pub type FetchFn = std::sync::Arc<dyn Fn(&PredictionRequest) -> Result<String, FetchError> + Send + Sync>;

pub struct ArrivalFetcher {
    api_base_url: String,
    api_key: String,
    api_key_placement: ApiKeyPlacement,
    fetch_fn: FetchFn,
}

impl ArrivalFetcher {
    pub fn new(config: &Config) -> result::TrackerResult<ArrivalFetcher> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("while building HTTP client")?;
        let timeout = config.request_timeout;
        let fetch_fn: FetchFn = std::sync::Arc::new(move |request: &PredictionRequest| {
            return real_fetch(&client, timeout, request);
        });
        return Ok(ArrivalFetcher::with_fetch_fn(config, fetch_fn));
    }

    pub fn with_fetch_fn(config: &Config, fetch_fn: FetchFn) -> ArrivalFetcher {
        return ArrivalFetcher{
            api_base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            api_key_placement: config.api_key_placement,
            fetch_fn: fetch_fn,
        };
    }

    pub fn request_for(&self, stop: &StopFilter) -> PredictionRequest {
        let base = format!(
            "{}/predictions?filter[stop]={}&include=schedule",
            self.api_base_url, stop.as_str());

        match self.api_key_placement {
            ApiKeyPlacement::Header => {
                return PredictionRequest{
                    url: base.clone(),
                    redacted_url: base,
                    api_key_header: Some((API_KEY_HEADER, self.api_key.clone())),
                };
            },
            ApiKeyPlacement::Query => {
                return PredictionRequest{
                    url: format!("{}&api_key={}", base, self.api_key),
                    redacted_url: format!("{}&api_key=REDACTED", base),
                    api_key_header: None,
                };
            },
        }
    }

    /// Blocking. Exactly one request, no retries.
    pub fn fetch(&self, stop: &StopFilter) -> Result<String, FetchError> {
        let request = self.request_for(stop);
        debug!("Fetching {}", request.redacted_url);
        return (self.fetch_fn)(&request);
    }
}

fn real_fetch(client: &reqwest::blocking::Client, timeout: std::time::Duration, request: &PredictionRequest) -> Result<String, FetchError> {
    let mut builder = client.get(&request.url)
        .header(reqwest::header::ACCEPT, "application/vnd.api+json");
    if let Some((name, value)) = &request.api_key_header {
        builder = builder.header(*name, value.as_str());
    }

    let response = builder.send()
        .map_err(|err| transport_error(&request.redacted_url, timeout, err))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status{
            status: status.as_u16(),
            url: request.redacted_url.clone(),
        });
    }

    return response.text()
        .map_err(|err| transport_error(&request.redacted_url, timeout, err));
}

fn transport_error(url: &str, timeout: std::time::Duration, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout{url: url.to_string(), after: timeout};
    }
    // The error's own URL may carry the key.
    return FetchError::Transport{
        url: url.to_string(),
        message: err.without_url().to_string(),
    };
}

#[cfg(test)]
mod tests {
    extern crate tiny_http;

    use super::*;
    use crate::config;

    fn stop(id: &str) -> StopFilter {
        return StopFilter::new(id).expect("stop");
    }

    fn config_for(base_url: &str, placement: &str) -> Config {
        let json = format!(r#"{{
            "api_base_url": "{}", "api_key": "abc123", "api_key_placement": "{}",
            "request_timeout_secs": 1,
            "directions": [{{"name": "A", "stop": "70028"}}, {{"name": "B", "stop": "70029"}}]
        }}"#, base_url, placement);
        return Config::from_json(&json, None).expect("config");
    }

    #[test]
    fn header_request() {
        let fetcher = ArrivalFetcher::with_fetch_fn(
            &config::test_config(), std::sync::Arc::new(|_: &PredictionRequest| Ok::<String, FetchError>(String::new())));
        let request = fetcher.request_for(&stop("70028"));
        assert_eq!("https://api-v3.mbta.com/predictions?filter[stop]=70028&include=schedule", request.url);
        assert_eq!(request.url, request.redacted_url);
        assert_eq!(Some(("x-api-key", "test-key".to_string())), request.api_key_header);
    }

    #[test]
    fn query_request_is_redacted() {
        let fetcher = ArrivalFetcher::with_fetch_fn(
            &config_for("https://example.com/v3", "query"),
            std::sync::Arc::new(|_: &PredictionRequest| Ok::<String, FetchError>(String::new())));
        let request = fetcher.request_for(&stop("70029"));
        assert_eq!("https://example.com/v3/predictions?filter[stop]=70029&include=schedule&api_key=abc123", request.url);
        assert!(!request.redacted_url.contains("abc123"));
        assert_eq!(None, request.api_key_header);
    }

    #[test]
    fn fetch_uses_fetch_fn() {
        let fake_fetch_fn: FetchFn = std::sync::Arc::new(|request: &PredictionRequest| {
            if request.url.contains("filter[stop]=70028") {
                return Ok(std::fs::read_to_string("testdata/predictions_70028.json")
                    .expect("error reading predictions_70028.json"));
            }
            return Err(FetchError::Status{status: 404, url: request.redacted_url.clone()});
        });
        let fetcher = ArrivalFetcher::with_fetch_fn(&config::test_config(), fake_fetch_fn);

        assert!(fetcher.fetch(&stop("70028")).expect("fetch").contains("2024-01-01T10:05:00-05:00"));
        assert!(matches!(fetcher.fetch(&stop("70029")), Err(FetchError::Status{status: 404, ..})));
    }

    // Serves `responses` in order from a local server, recording each request's
    // url and x-api-key header.
    fn local_server(responses: Vec<(u16, &'static str, std::time::Duration)>)
                    -> (String, std::thread::JoinHandle<Vec<(String, Option<String>)>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind local server");
        let addr = server.server_addr().to_ip().expect("ip listener");
        let handle = std::thread::spawn(move || {
            let mut seen = vec![];
            for (status, body, delay) in responses {
                let request = server.recv().expect("recv");
                let key = request.headers().iter()
                    .find(|h| h.field.equiv("x-api-key"))
                    .map(|h| h.value.as_str().to_string());
                seen.push((request.url().to_string(), key));
                std::thread::sleep(delay);
                let _ = request.respond(tiny_http::Response::from_string(body).with_status_code(status));
            }
            return seen;
        });
        return (format!("http://{}", addr), handle);
    }

    #[test]
    fn real_fetch_reads_body_and_sends_key() {
        let (base_url, server) = local_server(vec![
            (200, r#"{"data":[]}"#, std::time::Duration::from_millis(0)),
        ]);
        let fetcher = ArrivalFetcher::new(&config_for(&base_url, "header")).expect("fetcher");

        assert_eq!(r#"{"data":[]}"#, fetcher.fetch(&stop("70028")).expect("fetch"));

        let seen = server.join().expect("server thread");
        assert_eq!("/predictions?filter[stop]=70028&include=schedule", seen[0].0);
        assert_eq!(Some("abc123".to_string()), seen[0].1);
    }

    #[test]
    fn real_fetch_status_error() {
        let (base_url, server) = local_server(vec![
            (503, "down for maintenance", std::time::Duration::from_millis(0)),
        ]);
        let fetcher = ArrivalFetcher::new(&config_for(&base_url, "query")).expect("fetcher");

        match fetcher.fetch(&stop("70029")) {
            Err(FetchError::Status{status, url}) => {
                assert_eq!(503, status);
                assert!(url.contains("filter[stop]=70029"));
                assert!(!url.contains("abc123"));
            },
            other => panic!("unexpected result: {:?}", other),
        }
        server.join().expect("server thread");
    }

    #[test]
    fn real_fetch_times_out() {
        let (base_url, server) = local_server(vec![
            (200, r#"{"data":[]}"#, std::time::Duration::from_millis(2500)),
        ]);
        let fetcher = ArrivalFetcher::new(&config_for(&base_url, "header")).expect("fetcher");

        assert!(matches!(fetcher.fetch(&stop("70028")), Err(FetchError::Timeout{..})));
        server.join().expect("server thread");
    }

    #[test]
    fn connection_refused_is_transport_error() {
        // Bind then drop to find a port nobody is listening on.
        let addr = std::net::TcpListener::bind("127.0.0.1:0").expect("bind")
            .local_addr().expect("addr");
        let fetcher = ArrivalFetcher::new(&config_for(&format!("http://{}", addr), "query")).expect("fetcher");

        match fetcher.fetch(&stop("70028")) {
            Err(FetchError::Transport{url, message}) => {
                assert!(!url.contains("abc123"));
                assert!(!message.contains("abc123"));
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
