use std::time::Duration;

use backoff::ExponentialBackoff;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use strata_core::prelude::{Credentials, RestPacer, VenueError};

use crate::auth;
use crate::model::OkxResponse;

/// OKX v5 REST connector: signing, pacing, bounded transient retry.
pub struct OkxHttpClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    pacer: RestPacer,
}

impl OkxHttpClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>, rest_min_interval: Duration) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .gzip(true)
            .build()
            .expect("could not initialize okx http client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            pacer: RestPacer::new(rest_min_interval),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// GET with optional query string; `signed` requests carry the
    /// OK-ACCESS headers.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        signed: bool,
    ) -> Result<OkxResponse<T>, VenueError> {
        let query_string = if query.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("?{}", parts.join("&"))
        };
        let request_path = format!("{}{}", path, query_string);
        self.send(Method::GET, &request_path, None, signed).await
    }

    /// Signed POST with a JSON body.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<OkxResponse<T>, VenueError> {
        let body = serde_json::to_string(body).map_err(|e| VenueError::BadRequest(e.to_string()))?;
        self.send(Method::POST, path, Some(body), true).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        request_path: &str,
        body: Option<String>,
        signed: bool,
    ) -> Result<OkxResponse<T>, VenueError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..ExponentialBackoff::default()
        };

        let raw = backoff::future::retry(policy, || async {
            self.pacer.pace().await;
            match self.send_once(method.clone(), request_path, body.as_deref(), signed).await {
                Ok(raw) => Ok(raw),
                Err(e) if e.is_transient() => {
                    warn!(target: "okx", "transient error on {}: {}", request_path, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await?;

        let parsed: OkxResponse<T> =
            serde_json::from_str(&raw).map_err(|e| VenueError::Decode(format!("{}: {}", e, raw)))?;
        Ok(parsed)
    }

    async fn send_once(
        &self,
        method: Method,
        request_path: &str,
        body: Option<&str>,
        signed: bool,
    ) -> Result<String, VenueError> {
        let url = format!("{}{}", self.base_url, request_path);
        let mut builder = self.client.request(method.clone(), &url);

        if let Some(body) = body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body.to_string());
        }

        if signed {
            let creds = self
                .credentials
                .as_ref()
                .ok_or_else(|| VenueError::Auth("no credentials configured".to_string()))?;
            let passphrase = creds
                .passphrase
                .as_deref()
                .ok_or_else(|| VenueError::Auth("okx credentials need a passphrase".to_string()))?;
            let timestamp = auth::rest_timestamp();
            let sign = auth::sign(&creds.api_secret, &timestamp, method.as_str(), request_path, body.unwrap_or(""));
            builder = builder
                .header("OK-ACCESS-KEY", &creds.api_key)
                .header("OK-ACCESS-SIGN", sign)
                .header("OK-ACCESS-TIMESTAMP", timestamp)
                .header("OK-ACCESS-PASSPHRASE", passphrase);
            if creds.testnet {
                builder = builder.header("x-simulated-trading", "1");
            }
        }

        let request = builder.build().map_err(|e| VenueError::BadRequest(e.to_string()))?;
        debug!(target: "okx", "request: {} {}", request.method(), request.url());

        let response = self.client.execute(request).await.map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;

        match status {
            s if s.is_success() => Ok(text),
            StatusCode::TOO_MANY_REQUESTS => {
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

fn map_reqwest_error(e: reqwest::Error) -> VenueError {
    if e.is_timeout() {
        VenueError::Timeout
    } else {
        VenueError::Network(e.to_string())
    }
}
