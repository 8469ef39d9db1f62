//! CAS REST protocol client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;

use super::{Credentials, TicketApi};
use crate::error::{ApiError, ApiResult};
use crate::session::{Principal, RoleSet};

/// Marker the server puts in the rejection body when the password expired
const PASSWORD_MUST_CHANGE: &str = "AccountPasswordMustChangeException";

/// CAS REST client
pub struct CasClient {
    http: HttpClient,
    cas_url: String,
}

impl CasClient {
    /// Create a client for the CAS server rooted at `cas_url`
    /// (e.g. `https://cas.apiit.edu.my/cas`).
    pub fn new(cas_url: impl Into<String>) -> ApiResult<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::TicketAcquisition(e.to_string()))?;

        Ok(Self {
            http,
            cas_url: cas_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn tickets_url(&self) -> String {
        format!("{}/v1/tickets", self.cas_url)
    }
}

/// Any transport breakdown inside the cascade is a ticket acquisition failure
fn cascade_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::TicketAcquisition("CAS request timed out".to_string())
    } else if err.is_connect() {
        ApiError::TicketAcquisition("Failed to connect to CAS".to_string())
    } else {
        ApiError::TicketAcquisition(err.to_string())
    }
}

/// Last path segment of a `Location` header, which carries the new TGT
fn ticket_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolve a principal from a `serviceValidate` JSON response
fn principal_from_validation(body: &Value) -> ApiResult<Principal> {
    let response = &body["serviceResponse"];

    if let Some(failure) = response.get("authenticationFailure") {
        log::debug!("Service ticket rejected: {}", failure);
        return Err(ApiError::AuthorizationFailure);
    }

    let success = response
        .get("authenticationSuccess")
        .ok_or_else(|| ApiError::InvalidResponse("Missing authenticationSuccess".to_string()))?;

    let username = success["user"]
        .as_str()
        .ok_or_else(|| ApiError::InvalidResponse("Missing user in validation".to_string()))?
        .to_string();

    let attributes = success.get("attributes").cloned().unwrap_or(Value::Null);

    // distinguishedName comes back either as a string or a list of strings
    let names: Vec<&str> = match &attributes["distinguishedName"] {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let roles = RoleSet::from_distinguished_names(names);

    if roles.is_empty() {
        return Err(ApiError::AuthorizationFailure);
    }

    Ok(Principal {
        username,
        roles,
        attributes,
    })
}

#[async_trait]
impl TicketApi for CasClient {
    async fn request_tgt(&self, credentials: &Credentials) -> ApiResult<String> {
        let response = self
            .http
            .post(self.tickets_url())
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(cascade_error)?;

        let status = response.status();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(ticket_from_location);
        let body = response.text().await.map_err(cascade_error)?;

        match status {
            s if s.is_success() => match location {
                Some(tgt) => Ok(tgt),
                None if !body.trim().is_empty() => Ok(body.trim().to_string()),
                None => Err(ApiError::TicketAcquisition(
                    "CAS returned no ticket-granting ticket".to_string(),
                )),
            },
            s if s.is_client_error() => Err(ApiError::AuthenticationFailure {
                password_must_change: body.contains(PASSWORD_MUST_CHANGE),
            }),
            s => Err(ApiError::TicketAcquisition(format!(
                "CAS ticket request failed with status {}",
                s
            ))),
        }
    }

    async fn request_st(&self, tgt: &str, service: &str) -> ApiResult<String> {
        let url = format!("{}/{}", self.tickets_url(), tgt);
        let response = self
            .http
            .post(&url)
            .form(&[("service", service)])
            .send()
            .await
            .map_err(cascade_error)?;

        let status = response.status();
        let body = response.text().await.map_err(cascade_error)?;

        match status {
            StatusCode::OK | StatusCode::CREATED if !body.trim().is_empty() => {
                Ok(body.trim().to_string())
            }
            s if s.is_success() => Err(ApiError::TicketAcquisition(
                "CAS returned an empty service ticket".to_string(),
            )),
            // Expired or unknown TGT
            s if s.is_client_error() => Err(ApiError::AuthenticationFailure {
                password_must_change: false,
            }),
            s => Err(ApiError::TicketAcquisition(format!(
                "CAS service ticket request failed with status {}",
                s
            ))),
        }
    }

    async fn validate(&self, st: &str, service: &str) -> ApiResult<Principal> {
        let url = format!("{}/p3/serviceValidate", self.cas_url);
        let response = self
            .http
            .get(&url)
            .query(&[("format", "json"), ("service", service), ("ticket", st)])
            .send()
            .await
            .map_err(cascade_error)?;

        let status = response.status();
        if status.is_client_error() {
            return Err(ApiError::AuthorizationFailure);
        }
        if !status.is_success() {
            return Err(ApiError::TicketAcquisition(format!(
                "CAS validation failed with status {}",
                status
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse validation response: {}", e))
        })?;
        principal_from_validation(&body)
    }

    async fn destroy_tgt(&self, tgt: &str) -> ApiResult<()> {
        let url = format!("{}/{}", self.tickets_url(), tgt);
        let response = self.http.delete(&url).send().await.map_err(cascade_error)?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(ApiError::TicketAcquisition(format!(
                "CAS logout failed with status {}",
                response.status()
            )))
        }
    }
}
