use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use http::header::{self, HeaderMap, HeaderValue};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tokio::io::AsyncWriteExt as _;
use tracing::trace;
use url::Url;

use crate::batch_writer::BatchKey;
use crate::WriteError;

const WRITE_PATH: &str = "/api/v2/write";

/// Delivers one line protocol payload to its destination.
///
/// Failures must carry enough information to tell retryable from terminal
/// errors: an HTTP status (with an optional `Retry-After` hint) or the
/// underlying network error.
#[async_trait]
pub trait WriteTransport: Send + Sync {
    async fn write(&self, key: &BatchKey, line_protocol: &str) -> Result<(), WriteError>;
}

/// Posts payloads to the `/api/v2/write` endpoint, gzip compressed above a size threshold.
pub struct HttpTransport {
    write_url: Url,
    http_client: HttpClient,
    gzip_threshold: usize,
}

impl HttpTransport {
    pub(crate) fn new(api_url: &Url, http_client: HttpClient, gzip_threshold: usize) -> Result<Self, WriteError> {
        Ok(Self {
            write_url: api_url.join(WRITE_PATH)?,
            http_client,
            gzip_threshold,
        })
    }
}

#[async_trait]
impl WriteTransport for HttpTransport {
    async fn write(&self, key: &BatchKey, line_protocol: &str) -> Result<(), WriteError> {
        let mut body = line_protocol.as_bytes().to_vec();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        if self.gzip_threshold > 0 && body.len() > self.gzip_threshold {
            let mut encoder = GzipEncoder::new(Vec::new());
            encoder.write_all(&body).await?;
            encoder.shutdown().await?;
            trace!(plain = body.len(), compressed = encoder.get_ref().len(), "Compressed write payload");
            body = encoder.into_inner();
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        let params = [
            ("org", key.org.as_str()),
            ("bucket", key.bucket.as_str()),
            ("precision", key.precision.as_str()),
        ];

        let resp = self.http_client.post(self.write_url.clone())
            .headers(headers)
            .query(&params)
            .body(body)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(handle_http_err(resp).await)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

async fn handle_http_err(resp: reqwest::Response) -> WriteError {
    let status = resp.status();
    let retry_after = resp.headers().get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let content_type = resp.headers().get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = resp.text().await.unwrap_or_default();

    WriteError::Http {
        status,
        retry_after,
        message: error_message(status, &content_type, &body),
    }
}

/// `Retry-After` in its delta-seconds form; HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn error_message(status: http::StatusCode, content_type: &str, body: &str) -> String {
    let mut message = if content_type.starts_with("application/json") {
        match serde_json::from_str::<ServerError>(body) {
            Ok(error) if !error.message.is_empty() => error.message,
            Ok(error) => error.code,
            Err(_) => body.to_string(),
        }
    } else {
        body.to_string()
    };
    if message.is_empty() {
        message = format!("HTTP error: {}", status);
    }
    message
}
