//! HttpRedeemClient - RedeemClient over a JSON POST.
//!
//! # Implementation
//! 1. Configuration headers become request headers verbatim
//! 2. Body is `{<target_field>: <redeem_target>}`
//! 3. HTTP 200: `ok` is the boolean at `<success_field>` in the response body
//! 4. Any other status: `ok = false` with `{error: "HTTP <code>", message: <body text>}`
//! 5. Transport, timeout and undecodable 200 bodies: `Err(RedeemError)`

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;

use crate::app::settings::HttpSettings;
use crate::domain::{CallOutcome, Headers};
use crate::ports::{RedeemClient, RedeemError};

pub struct HttpRedeemClient {
    client: reqwest::Client,
    url: String,
    success_field: String,
    target_field: String,
}

impl HttpRedeemClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, RedeemError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| RedeemError::Other(format!("building http client: {e}")))?;

        Ok(Self {
            client,
            url: settings.redeem_url(),
            success_field: settings.success_field.clone(),
            target_field: settings.target_field.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn header_map(headers: &Headers) -> Result<HeaderMap, RedeemError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let key = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            RedeemError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| RedeemError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        map.insert(key, value);
    }
    Ok(map)
}

#[async_trait]
impl RedeemClient for HttpRedeemClient {
    async fn call(
        &self,
        redeem_target: &str,
        headers: &Headers,
    ) -> Result<CallOutcome, RedeemError> {
        let headers = header_map(headers)?;
        let mut body = serde_json::Map::new();
        body.insert(
            self.target_field.clone(),
            Value::String(redeem_target.to_string()),
        );

        let response = self
            .client
            .post(&self.url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| RedeemError::Transport(e.to_string()))?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "redeem response");

        if status == StatusCode::OK {
            let payload: Value = response
                .json()
                .await
                .map_err(|e| RedeemError::Decode(e.to_string()))?;
            let ok = payload
                .get(&self.success_field)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            return Ok(CallOutcome { ok, payload });
        }

        let message = match response.text().await {
            Ok(text) => text,
            Err(e) => format!("<unreadable body: {e}>"),
        };
        Ok(CallOutcome::failure(json!({
            "error": format!("HTTP {}", status.as_u16()),
            "message": message,
        })))
    }
}
