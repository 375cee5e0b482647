use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::bridge::BridgeError;
use crate::sign::SignedRequest;
use crate::stream::flexible_id;

/// Current shape of [`SubscriptionRecord`]. Version 1 kept a single
/// `ignores` map of friend names and an epoch `last_update`.
pub const RECORD_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreKind {
    Friend,
    App,
}

impl IgnoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreKind::Friend => "friend",
            IgnoreKind::App => "app",
        }
    }
}

impl fmt::Display for IgnoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IgnoreKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "friend" | "friends" => Ok(IgnoreKind::Friend),
            "app" | "apps" => Ok(IgnoreKind::App),
            other => Err(BridgeError::InvalidIgnoreKind(other.to_string())),
        }
    }
}

/// Names matched without regard to case, listed in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    entries: BTreeSet<String>,
}

impl IgnoreList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the name is blank or already present in any case.
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.entries.insert(name.to_string())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let name = name.trim();
        let before = self.entries.len();
        self.entries.retain(|entry| !same_folded(entry, name));
        self.entries.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim();
        self.entries.iter().any(|entry| same_folded(entry, name))
    }

    pub fn list(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for IgnoreList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = IgnoreList::new();
        for name in iter {
            list.add(name.as_ref());
        }
        list
    }
}

fn same_folded(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// One tracked remote account and its polling state.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub nick: String,
    pub user_id: String,
    pub api_key: String,
    pub session_key: String,
    pub session_secret: String,
    pub last_update: DateTime<Utc>,
    pub ignored_friends: IgnoreList,
    pub ignored_apps: IgnoreList,
}

impl Subscription {
    /// New subscriptions start with a day of backlog.
    pub fn new(
        nick: &str,
        user_id: &str,
        api_key: &str,
        session_key: &str,
        session_secret: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            nick: nick.trim().to_string(),
            user_id: user_id.trim().to_string(),
            api_key: api_key.trim().to_string(),
            session_key: session_key.trim().to_string(),
            session_secret: session_secret.trim().to_string(),
            last_update: initial_watermark(now),
            ignored_friends: IgnoreList::new(),
            ignored_apps: IgnoreList::new(),
        }
    }

    pub fn ignores(&self, kind: IgnoreKind) -> &IgnoreList {
        match kind {
            IgnoreKind::Friend => &self.ignored_friends,
            IgnoreKind::App => &self.ignored_apps,
        }
    }

    pub fn ignores_mut(&mut self, kind: IgnoreKind) -> &mut IgnoreList {
        match kind {
            IgnoreKind::Friend => &mut self.ignored_friends,
            IgnoreKind::App => &mut self.ignored_apps,
        }
    }

    pub fn ignoring(&self, kind: IgnoreKind, name: &str) -> bool {
        self.ignores(kind).contains(name)
    }

    /// Moves the watermark forward to `cycle_start`; never backwards.
    pub fn advance(&mut self, cycle_start: DateTime<Utc>) {
        if cycle_start > self.last_update {
            self.last_update = cycle_start;
        }
    }

    fn request(&self, method: &str) -> SignedRequest {
        SignedRequest::new(
            self.session_secret.as_str(),
            [
                ("api_key", self.api_key.as_str()),
                ("format", "JSON"),
                ("method", method),
                ("session_key", self.session_key.as_str()),
            ],
        )
    }

    pub fn stream_request(
        &self,
        start_time: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> SignedRequest {
        let mut req = self
            .request("stream.get")
            .with("viewer_id", self.user_id.as_str());
        if let Some(start) = start_time {
            req = req.with("start_time", start.timestamp().to_string());
        }
        if let Some(limit) = limit {
            req = req.with("limit", limit.to_string());
        }
        req
    }

    pub fn comments_request(&self, post_id: &str) -> SignedRequest {
        self.request("stream.getComments").with("post_id", post_id)
    }

    pub fn profiles_request(&self, uids: &[String]) -> SignedRequest {
        self.request("Users.getInfo")
            .with("uids", uids.join(","))
            .with("fields", "name")
    }

    pub fn to_record(&self) -> SubscriptionRecord {
        SubscriptionRecord {
            version: RECORD_VERSION,
            nick: self.nick.clone(),
            user_id: self.user_id.clone(),
            api_key: self.api_key.clone(),
            session_key: self.session_key.clone(),
            session_secret: self.session_secret.clone(),
            last_update: Some(self.last_update),
            ignored_friends: self.ignored_friends.list(),
            ignored_apps: self.ignored_apps.list(),
            ignores: None,
            ignore_friends: None,
        }
    }

    /// Rebuilds a subscription from any stored record version.
    pub fn from_record(record: SubscriptionRecord, now: DateTime<Utc>) -> Self {
        let mut ignored_friends: IgnoreList = record.ignored_friends.iter().collect();
        for legacy in [record.ignores.as_ref(), record.ignore_friends.as_ref()]
            .into_iter()
            .flatten()
        {
            for name in legacy_names(legacy) {
                ignored_friends.add(&name);
            }
        }

        Self {
            nick: record.nick,
            user_id: record.user_id,
            api_key: record.api_key,
            session_key: record.session_key,
            session_secret: record.session_secret,
            last_update: record
                .last_update
                .unwrap_or_else(|| initial_watermark(now)),
            ignored_friends,
            ignored_apps: record.ignored_apps.iter().collect(),
        }
    }
}

fn initial_watermark(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(1)
}

/// Persisted form of a [`Subscription`], keyed by nick in the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub nick: String,
    #[serde(default, deserialize_with = "flexible_id")]
    pub user_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub session_key: String,
    #[serde(default)]
    pub session_secret: String,
    #[serde(default, deserialize_with = "stored_timestamp")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ignored_friends: Vec<String>,
    #[serde(default)]
    pub ignored_apps: Vec<String>,
    #[serde(default, skip_serializing)]
    pub ignores: Option<Value>,
    #[serde(default, skip_serializing)]
    pub ignore_friends: Option<Value>,
}

fn legacy_names(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, flag)| !matches!(flag, Value::Bool(false) | Value::Null))
            .map(|(name, _)| name.clone())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(name) => vec![name.clone()],
        _ => Vec::new(),
    }
}

fn stored_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                s.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
            }),
        _ => None,
    })
}
