//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::Value;

use super::{HttpRequest, Transport};
use crate::error::{ApiError, ApiResult};

/// Transport over a shared reqwest client
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> ApiResult<Self> {
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::TransientServer(e.to_string()))?;
        Ok(Self { http })
    }
}

/// JSON when it parses, raw text otherwise, null for an empty body
fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> ApiResult<Value> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(ApiError::from)?;

        let status = response.status();
        let text = response.text().await.map_err(ApiError::from)?;

        match status {
            s if s.is_success() => Ok(parse_body(text)),
            s if s.is_client_error() => Err(ApiError::Client {
                status: s.as_u16(),
                body: text,
            }),
            s if s.is_server_error() => {
                let message = if text.is_empty() {
                    format!("Server error: {}", s)
                } else {
                    format!("{}: {}", s, text)
                };
                Err(ApiError::TransientServer(message))
            }
            s => Err(ApiError::InvalidResponse(format!(
                "Unexpected status code: {}",
                s
            ))),
        }
    }
}
