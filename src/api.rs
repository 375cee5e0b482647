use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::sign::{SignedRequest, DEFAULT_BASE_URL};
use crate::stream::{RawComment, RawStream, RawUser};

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// Blocking client for the REST endpoint. Every call is a signed GET.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api: client user agent required");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()
                .context("api: build http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url: config
                .base_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stream(&self, request: &SignedRequest) -> Result<RawStream> {
        self.call(request)
    }

    pub fn comments(&self, request: &SignedRequest) -> Result<Vec<RawComment>> {
        self.call(request)
    }

    pub fn users(&self, request: &SignedRequest) -> Result<Vec<RawUser>> {
        self.call(request)
    }

    fn call<T>(&self, request: &SignedRequest) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = request.url(&self.base_url)?;
        debug!(method = request.method(), "api request");

        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("api: {} request", request.method()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            bail!("api: {} failed with status {}: {}", request.method(), status, body);
        }

        let body: Value = resp
            .json()
            .with_context(|| format!("api: decode {} response", request.method()))?;
        decode(request.method(), body)
    }
}

/// Decodes a response body, turning the API's error envelope into an error.
pub fn decode<T>(method: &str, body: Value) -> Result<T>
where
    T: DeserializeOwned,
{
    if let Some(code) = body.get("error_code") {
        let message = body
            .get("error_msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(anyhow!("api error {}: {}", code, message));
    }
    serde_json::from_value(body).with_context(|| format!("api: unexpected {method} payload"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requires_user_agent() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }

    #[test]
    fn defaults_base_url() {
        let client = Client::new(ClientConfig {
            user_agent: "feedbridge-test".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn error_envelope_becomes_error() {
        let err = decode::<RawStream>(
            "stream.get",
            json!({"error_code": 102, "error_msg": "Session key invalid"}),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "api error 102: Session key invalid");
    }

    #[test]
    fn decodes_user_list() {
        let users: Vec<RawUser> =
            decode("Users.getInfo", json!([{"uid": 5, "name": "Eve"}])).unwrap();
        assert_eq!(users[0].uid, "5");
        assert_eq!(users[0].name, "Eve");
    }

    #[test]
    fn wrong_shape_is_an_error() {
        assert!(decode::<Vec<RawComment>>("stream.getComments", json!({"x": 1})).is_err());
    }
}
