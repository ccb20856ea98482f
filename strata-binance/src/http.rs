use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use strata_core::prelude::{Credentials, RestPacer, VenueError, now_ms};

use crate::auth;

const RECV_WINDOW_MS: i64 = 5_000;

#[derive(Debug, Deserialize)]
struct ServerTimeReply {
    #[serde(rename = "serverTime")]
    server_time: i64,
}

/// USDT-M futures REST connector: query-string signing, pacing, bounded
/// transient retry. Signed timestamps carry a delta against venue server
/// time so a skewed local clock stays inside the recv window.
pub struct BinanceHttpClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    pacer: RestPacer,
    timestamp_delta: AtomicI64,
}

impl BinanceHttpClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>, rest_min_interval: Duration) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .gzip(true)
            .build()
            .expect("could not initialize binance http client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            pacer: RestPacer::new(rest_min_interval),
            timestamp_delta: AtomicI64::new(0),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Measure local-vs-venue clock skew and apply it to signed calls.
    pub async fn sync_time(&self) -> Result<i64, VenueError> {
        let before = now_ms();
        let reply: ServerTimeReply = self.get_public("/fapi/v1/time", &[]).await?;
        let after = now_ms();
        // Assume symmetric latency around the server read.
        let local_estimate = before + (after - before) / 2;
        let delta = local_estimate - reply.server_time;
        self.timestamp_delta.store(delta, Ordering::Relaxed);
        info!(target: "binance", "server time delta {}ms", delta);
        Ok(delta)
    }

    pub fn timestamp_delta(&self) -> i64 {
        self.timestamp_delta.load(Ordering::Relaxed)
    }

    /// Public endpoint, no key, no signature.
    pub async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, VenueError> {
        self.send(Method::GET, path, params, AuthLevel::None).await
    }

    /// Key in the header, no signature (listen-key endpoints).
    pub async fn send_keyed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, VenueError> {
        self.send(method, path, params, AuthLevel::Keyed).await
    }

    /// Key in the header plus a signed query string.
    pub async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, VenueError> {
        self.send(method, path, params, AuthLevel::Signed).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        auth_level: AuthLevel,
    ) -> Result<T, VenueError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..ExponentialBackoff::default()
        };

        let raw = backoff::future::retry(policy, || async {
            self.pacer.pace().await;
            match self.send_once(method.clone(), path, params, auth_level).await {
                Ok(raw) => Ok(raw),
                Err(e) if e.is_transient() => {
                    warn!(target: "binance", "transient error on {}: {}", path, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await?;

        serde_json::from_str(&raw).map_err(|e| VenueError::Decode(format!("{}: {}", e, raw)))
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        auth_level: AuthLevel,
    ) -> Result<String, VenueError> {
        // Values are encoded before signing; the signature covers the
        // query string exactly as transmitted.
        let mut query_parts: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, encode(v))).collect();

        let mut builder = match auth_level {
            AuthLevel::None => {
                let url = build_url(&self.base_url, path, &query_parts);
                self.client.request(method, &url)
            }
            AuthLevel::Keyed | AuthLevel::Signed => {
                let creds = self
                    .credentials
                    .as_ref()
                    .ok_or_else(|| VenueError::Auth("no credentials configured".to_string()))?;
                if auth_level == AuthLevel::Signed {
                    let timestamp = now_ms() - self.timestamp_delta.load(Ordering::Relaxed);
                    query_parts.push(format!("timestamp={}", timestamp));
                    query_parts.push(format!("recvWindow={}", RECV_WINDOW_MS));
                    let query = query_parts.join("&");
                    let signature = auth::sign_query(&creds.api_secret, &query);
                    query_parts.push(format!("signature={}", signature));
                }
                let url = build_url(&self.base_url, path, &query_parts);
                self.client.request(method, &url).header("X-MBX-APIKEY", &creds.api_key)
            }
        };
        builder = builder.header("User-Agent", "strata/0.1.0");

        let request = builder.build().map_err(|e| VenueError::BadRequest(e.to_string()))?;
        debug!(target: "binance", "request: {} {}", request.method(), request.url());

        let response = self.client.execute(request).await.map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;

        match status {
            s if s.is_success() => Ok(text),
            StatusCode::TOO_MANY_REQUESTS => {
                self.pacer.penalize().await;
                Err(VenueError::RateLimited)
            }
            // 418 is the venue's auto-ban reply for hammering past 429s.
            StatusCode::IM_A_TEAPOT => {
                self.pacer.penalize().await;
                Err(VenueError::RateLimited)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VenueError::Auth(text)),
            s if s.is_server_error() => Err(VenueError::Server {
                code: s.as_u16(),
                message: text,
            }),
            _ => Err(VenueError::Rejected(text)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthLevel {
    None,
    Keyed,
    Signed,
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn build_url(base: &str, path: &str, query_parts: &[String]) -> String {
    if query_parts.is_empty() {
        format!("{}{}", base, path)
    } else {
        format!("{}{}?{}", base, path, query_parts.join("&"))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> VenueError {
    if e.is_timeout() {
        VenueError::Timeout
    } else {
        VenueError::Network(e.to_string())
    }
}
