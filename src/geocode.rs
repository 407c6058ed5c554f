//! Reverse geocoding with a process-lifetime cache
//!
//! Lookups are keyed by the coordinate rounded to 3 decimals (~111 m). Cache
//! misses go through one network lock shared by all workers, and every
//! request is followed by a fixed pause while the lock is still held, which
//! keeps the tool under Nominatim's one-request-per-second limit.

use crate::config::GeocodeConfig;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// A network service that turns a coordinate into a place name
pub trait GeocodeBackend: Send + Sync {
    /// Place name for the coordinate; empty when the service knows none
    fn reverse(&self, lat: f64, lon: f64) -> Result<String>;
}

/// Nominatim `/reverse` JSON response, reduced to the address parts we use
#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Address,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
}

impl Address {
    /// First non-empty of city, town, village, municipality
    fn place_name(self) -> String {
        [self.city, self.town, self.village, self.municipality]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty())
            .unwrap_or_default()
    }
}

/// Parse a reverse geocoding response body into a place name
fn parse_place_name(body: &str) -> Result<String> {
    let response: ReverseResponse =
        serde_json::from_str(body).map_err(|e| Error::Geocode(format!("invalid response: {}", e)))?;
    Ok(response.address.place_name())
}

/// HTTPS backend for Nominatim-compatible endpoints
pub struct NominatimBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    zoom: u8,
}

impl NominatimBackend {
    pub fn new(config: &GeocodeConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Geocode(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            zoom: config.zoom,
        })
    }
}

impl GeocodeBackend for NominatimBackend {
    fn reverse(&self, lat: f64, lon: f64) -> Result<String> {
        let query = [
            ("format", "json".to_string()),
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("zoom", self.zoom.to_string()),
        ];

        let body = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| Error::Geocode(e.to_string()))?;

        trace!(lat, lon, %body, "Reverse geocoding response");
        parse_place_name(&body)
    }
}

/// Cache key: both coordinates at 3 decimal places
pub fn cache_key(lat: f64, lon: f64) -> String {
    format!("{:.3}_{:.3}", lat, lon)
}

/// Shared resolver used by every worker of a sort run
pub struct GeocodeResolver {
    backend: Box<dyn GeocodeBackend>,
    cache: Mutex<HashMap<String, String>>,
    network: Mutex<()>,
    request_delay: Duration,
}

impl GeocodeResolver {
    pub fn new(backend: Box<dyn GeocodeBackend>, request_delay: Duration) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
            network: Mutex::new(()),
            request_delay,
        }
    }

    /// Resolver backed by the configured HTTPS endpoint
    pub fn from_config(config: &GeocodeConfig) -> Result<Self> {
        let backend = NominatimBackend::new(config)?;
        Ok(Self::new(
            Box::new(backend),
            Duration::from_millis(config.request_delay_ms),
        ))
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cached(&self, key: &str) -> Option<String> {
        self.cache().get(key).cloned()
    }

    /// Place name for a coordinate, possibly empty. Never fails.
    pub fn resolve(&self, lat: f64, lon: f64) -> String {
        let key = cache_key(lat, lon);
        if let Some(hit) = self.cached(&key) {
            trace!(%key, "Geocode cache hit");
            return hit;
        }

        let _network = self.network.lock().unwrap_or_else(|e| e.into_inner());

        // Another worker may have resolved the same key while we waited
        if let Some(hit) = self.cached(&key) {
            return hit;
        }

        let place = match self.backend.reverse(lat, lon) {
            Ok(place) => place,
            Err(e) => {
                debug!(lat, lon, error = %e, "Reverse geocoding failed");
                String::new()
            }
        };

        thread::sleep(self.request_delay);

        self.cache().entry(key).or_insert_with(|| place.clone());
        place
    }

    /// Number of distinct rounded coordinates looked up so far
    pub fn cache_len(&self) -> usize {
        self.cache().len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and answers with a fixed place name
    pub(crate) struct FakeBackend {
        pub calls: Arc<AtomicUsize>,
        answer: Option<String>,
        in_flight: AtomicUsize,
        pub max_in_flight: Arc<AtomicUsize>,
        latency: Duration,
    }

    impl FakeBackend {
        pub(crate) fn answering(name: &str) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                answer: Some(name.to_string()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
                latency: Duration::ZERO,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                answer: None,
                ..Self::answering("")
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }
    }

    impl GeocodeBackend for FakeBackend {
        fn reverse(&self, _lat: f64, _lon: f64) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.latency);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.answer
                .clone()
                .ok_or_else(|| Error::Geocode("connection refused".into()))
        }
    }

    #[test]
    fn test_cache_key_rounds_to_three_decimals() {
        assert_eq!(cache_key(48.85661, 2.35222), "48.857_2.352");
        assert_eq!(cache_key(-33.8688, 151.2093), "-33.869_151.209");
    }

    #[test]
    fn test_same_rounded_coordinate_hits_network_once() {
        let backend = FakeBackend::answering("Paris");
        let calls = Arc::clone(&backend.calls);
        let resolver = GeocodeResolver::new(Box::new(backend), Duration::ZERO);

        assert_eq!(resolver.resolve(48.85661, 2.35222), "Paris");
        assert_eq!(resolver.resolve(48.85664, 2.35218), "Paris");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        resolver.resolve(45.764, 4.8357);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cache_len(), 2);
    }

    #[test]
    fn test_failure_is_empty_and_cached() {
        let backend = FakeBackend::failing();
        let calls = Arc::clone(&backend.calls);
        let resolver = GeocodeResolver::new(Box::new(backend), Duration::ZERO);

        assert_eq!(resolver.resolve(10.0, 20.0), "");
        assert_eq!(resolver.resolve(10.0, 20.0), "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_lookups_single_flight() {
        let backend = FakeBackend::answering("Lyon").with_latency(Duration::from_millis(20));
        let calls = Arc::clone(&backend.calls);
        let max_in_flight = Arc::clone(&backend.max_in_flight);
        let resolver = Arc::new(GeocodeResolver::new(Box::new(backend), Duration::ZERO));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resolver = Arc::clone(&resolver);
                // Two distinct rounded keys, four threads each
                let lat = if i % 2 == 0 { 45.764 } else { 43.2965 };
                thread::spawn(move || resolver.resolve(lat, 4.8357))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "Lyon");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_delay_is_charged_to_the_miss() {
        let resolver = GeocodeResolver::new(
            Box::new(FakeBackend::answering("Nice")),
            Duration::from_millis(50),
        );

        let start = std::time::Instant::now();
        resolver.resolve(43.7102, 7.262);
        assert!(start.elapsed() >= Duration::from_millis(50));

        let start = std::time::Instant::now();
        resolver.resolve(43.7102, 7.262);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_parse_place_name_priority() {
        let body = r#"{"address":{"village":"Giverny","town":"Vernon","country":"France"}}"#;
        assert_eq!(parse_place_name(body).unwrap(), "Vernon");

        let body = r#"{"address":{"city":"","municipality":"Bordeaux"}}"#;
        assert_eq!(parse_place_name(body).unwrap(), "Bordeaux");

        let body = r#"{"error":"Unable to geocode"}"#;
        assert_eq!(parse_place_name(body).unwrap(), "");

        assert!(parse_place_name("<html>").is_err());
    }

    /// Answer one HTTP request with `status` and `body`; the join handle
    /// yields the request head as received
    fn serve_once(status: &'static str, body: &'static str) -> (GeocodeConfig, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();
            head
        });

        let config = GeocodeConfig {
            endpoint: format!("http://127.0.0.1:{}/reverse", port),
            timeout_secs: 5,
            ..GeocodeConfig::default()
        };
        (config, server)
    }

    #[test]
    fn test_nominatim_request_and_response() {
        let (config, server) = serve_once(
            "200 OK",
            r#"{"address":{"village":"Giverny","town":"Vernon","country":"France"}}"#,
        );
        let backend = NominatimBackend::new(&config).unwrap();

        assert_eq!(backend.reverse(48.856614, -2.3522219).unwrap(), "Vernon");

        let head = server.join().unwrap();
        let request_line = head.lines().next().unwrap();
        assert_eq!(
            request_line,
            "GET /reverse?format=json&lat=48.856614&lon=-2.3522219&zoom=10 HTTP/1.1"
        );
        assert!(
            head.to_lowercase()
                .contains(&format!("user-agent: {}", config.user_agent))
        );
    }

    #[test]
    fn test_server_error_resolves_to_empty() {
        let (config, server) = serve_once("500 Internal Server Error", r#"{"error":"overloaded"}"#);
        let backend = NominatimBackend::new(&config).unwrap();
        assert!(matches!(backend.reverse(1.0, 2.0), Err(Error::Geocode(_))));
        server.join().unwrap();

        let (config, server) = serve_once("500 Internal Server Error", r#"{"error":"overloaded"}"#);
        let resolver = GeocodeResolver::new(Box::new(NominatimBackend::new(&config).unwrap()), Duration::ZERO);
        assert_eq!(resolver.resolve(1.0, 2.0), "");
        assert_eq!(resolver.cache_len(), 1);
        server.join().unwrap();
    }
}
