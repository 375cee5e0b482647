use std::collections::BTreeMap;

use anyhow::{Context, Result};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://api.facebook.com/restserver.php";

/// A REST call whose query string is signed with a session secret.
///
/// Parameters are kept in a `BTreeMap` so iteration order is the byte-wise
/// key order the remote end expects when it recomputes the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    secret: String,
    params: BTreeMap<String, String>,
}

impl SignedRequest {
    pub fn new<I, K, V>(secret: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            secret: secret.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn method(&self) -> &str {
        self.param("method").unwrap_or_default()
    }

    pub fn sig(&self) -> String {
        signature(&self.secret, &self.params)
    }

    /// Full request URL: every parameter plus `sig`, form-encoded onto `base`.
    pub fn url(&self, base: &str) -> Result<Url> {
        let mut url =
            Url::parse(base).with_context(|| format!("sign: invalid base url {base:?}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.params {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("sig", &self.sig());
        }
        Ok(url)
    }
}

/// MD5 over `k1=v1k2=v2...secret`, keys in sorted order, rendered as lowercase hex.
pub fn signature(secret: &str, params: &BTreeMap<String, String>) -> String {
    let mut payload = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<String>();
    payload.push_str(secret);
    hex::encode(md5::compute(payload.as_bytes()).0)
}
