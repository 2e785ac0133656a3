//! HTTP access to the boiler's fixed endpoint set.
//!
//! Every call builds its own `reqwest::Client` and drops it before returning,
//! so no connection outlives the request that opened it. Certificate checks
//! and proxy environment variables are ignored: the device is a local
//! appliance.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use boiler_common::{BoilerConfig, Endpoint, FieldMap, Method, RequestBody};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("cannot reach boiler at {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("boiler answered HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

#[async_trait]
pub trait BoilerApi: Send + Sync {
    async fn get(&self, endpoint: Endpoint) -> Result<FieldMap, ClientError>;

    async fn post(&self, endpoint: Endpoint, body: RequestBody) -> Result<(), ClientError>;

    /// Connectivity check used before any entity is created.
    async fn probe(&self) -> Result<(), ClientError>;
}

#[derive(Debug, Clone)]
pub struct BoilerClient {
    host: String,
    poll_timeout: Option<Duration>,
    probe_timeout: Duration,
}

impl BoilerClient {
    pub fn new(
        host: impl Into<String>,
        poll_timeout: Option<Duration>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            poll_timeout,
            probe_timeout,
        }
    }

    pub fn from_config(config: &BoilerConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.poll_timeout(),
            config.probe_timeout(),
        )
    }

    fn scoped_client(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Client, ClientError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .pool_max_idle_per_host(0);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(|err| connect_error(url, &err))
    }

    async fn fetch(
        &self,
        endpoint: Endpoint,
        timeout: Option<Duration>,
    ) -> Result<FieldMap, ClientError> {
        let url = endpoint.url(&self.host);
        debug!(%url, "boiler GET");

        let client = self.scoped_client(&url, timeout)?;
        let response = request(&client, endpoint, &url)
            .send()
            .await
            .map_err(|err| connect_error(&url, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let raw = response
            .bytes()
            .await
            .map_err(|err| connect_error(&url, &err))?;
        parse_fields(&url, &raw)
    }
}

#[async_trait]
impl BoilerApi for BoilerClient {
    async fn get(&self, endpoint: Endpoint) -> Result<FieldMap, ClientError> {
        self.fetch(endpoint, self.poll_timeout).await
    }

    async fn post(&self, endpoint: Endpoint, body: RequestBody) -> Result<(), ClientError> {
        let url = endpoint.url(&self.host);
        debug!(%url, ?body, "boiler POST");

        let client = self.scoped_client(&url, self.poll_timeout)?;
        let builder = request(&client, endpoint, &url)
            .header(reqwest::header::CONTENT_TYPE, body.content_type());
        let builder = match body {
            RequestBody::Raw(text) => builder.body(text),
            RequestBody::Form(fields) => builder.form(&fields),
        };

        let response = builder
            .send()
            .await
            .map_err(|err| connect_error(&url, &err))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::Status {
                url,
                status: status.as_u16(),
            })
        }
    }

    async fn probe(&self) -> Result<(), ClientError> {
        let url = Endpoint::MainParams.url(&self.host);
        let client = self.scoped_client(&url, Some(self.probe_timeout))?;
        let response = request(&client, Endpoint::MainParams, &url)
            .send()
            .await
            .map_err(|err| connect_error(&url, &err))?;

        match response.status().as_u16() {
            200 => Ok(()),
            status => Err(ClientError::Status { url, status }),
        }
    }
}

/// Each endpoint has a fixed verb on the device.
fn request(client: &reqwest::Client, endpoint: Endpoint, url: &str) -> reqwest::RequestBuilder {
    match endpoint.method() {
        Method::Get => client.get(url),
        Method::Post => client.post(url),
    }
}

fn connect_error(url: &str, err: &reqwest::Error) -> ClientError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    ClientError::Connect {
        url: url.to_string(),
        reason,
    }
}

fn parse_fields(url: &str, raw: &[u8]) -> Result<FieldMap, ClientError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(ClientError::Decode {
            url: url.to_string(),
            reason: format!("expected a JSON object, got {other}"),
        }),
        Err(err) => Err(ClientError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        }),
    }
}
