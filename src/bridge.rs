use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use tracing::{debug, info, warn};

use crate::data::StreamService;
use crate::format::{LineFormatter, DEFAULT_NETWORK};
use crate::storage::Store;
use crate::stream::{parse_posts, Comment, Profiles, RawStream, DEFAULT_NOOP_LINK};
use crate::subscription::{IgnoreKind, Subscription, SubscriptionRecord};
use crate::tracker::{self, DEFAULT_MAX_COMMENTS};

const RECORD_PREFIX: &str = "subscriptions/";
/// Upper bound on uids sent in one profile lookup.
const PROFILE_BATCH: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{network} user '{nick}' not found")]
    NotFound { network: String, nick: String },
    #[error("unknown ignore kind '{0}', expected app or friend")]
    InvalidIgnoreKind(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

/// Where rendered notification lines go.
pub trait Sink {
    fn send(&mut self, line: String);
}

impl Sink for Vec<String> {
    fn send(&mut self, line: String) {
        self.push(line);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub network: String,
    pub max_comments: usize,
    pub noop_link: String,
    pub stream_limit: Option<u32>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            max_comments: DEFAULT_MAX_COMMENTS,
            noop_link: DEFAULT_NOOP_LINK.to_string(),
            stream_limit: None,
        }
    }
}

/// Outcome of one pass over every subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub polled: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub posts: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct CycleStats {
    posts: usize,
    lines: usize,
}

/// Owns the subscriptions and the profile cache.
///
/// Single-threaded by contract: a pass takes `&mut self`, so passes and
/// commands never interleave and the cache needs no locking. Hosts that share
/// a bridge across threads wrap it in a mutex.
pub struct Bridge {
    service: Arc<dyn StreamService>,
    config: BridgeConfig,
    subscriptions: BTreeMap<String, Subscription>,
    profiles: Profiles,
    removed: Vec<String>,
    unreadable: Vec<String>,
}

impl Bridge {
    pub fn new(service: Arc<dyn StreamService>, config: BridgeConfig) -> Self {
        Self {
            service,
            config,
            subscriptions: BTreeMap::new(),
            profiles: Profiles::new(),
            removed: Vec::new(),
            unreadable: Vec::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    pub fn subscription(&self, nick: &str) -> Option<&Subscription> {
        self.subscriptions.get(nick)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    pub fn insert(&mut self, sub: Subscription) {
        self.removed.retain(|nick| nick != &sub.nick);
        self.unreadable.retain(|nick| nick != &sub.nick);
        self.subscriptions.insert(sub.nick.clone(), sub);
    }

    fn not_found(&self, nick: &str) -> BridgeError {
        BridgeError::NotFound {
            network: self.config.network.clone(),
            nick: nick.to_string(),
        }
    }

    fn get(&self, nick: &str) -> Result<&Subscription, BridgeError> {
        self.subscriptions
            .get(nick)
            .ok_or_else(|| self.not_found(nick))
    }

    fn get_mut(&mut self, nick: &str) -> Result<&mut Subscription, BridgeError> {
        let network = &self.config.network;
        self.subscriptions
            .get_mut(nick)
            .ok_or_else(|| BridgeError::NotFound {
                network: network.clone(),
                nick: nick.to_string(),
            })
    }

    pub fn add(
        &mut self,
        nick: &str,
        user_id: &str,
        api_key: &str,
        session_key: &str,
        session_secret: &str,
    ) -> Result<String, BridgeError> {
        for (value, name) in [
            (nick, "nick"),
            (user_id, "user_id"),
            (api_key, "api_key"),
            (session_key, "session_key"),
            (session_secret, "session_secret"),
        ] {
            if value.trim().is_empty() {
                return Err(BridgeError::MissingArgument(name));
            }
        }
        let sub = Subscription::new(
            nick,
            user_id,
            api_key,
            session_key,
            session_secret,
            Utc::now(),
        );
        let reply = format!(
            "added {} user {} as {}",
            self.config.network, sub.user_id, sub.nick
        );
        info!(nick = %sub.nick, "subscription added");
        self.insert(sub);
        Ok(reply)
    }

    /// Removes a subscription, including one whose stored record could not
    /// be decoded.
    pub fn delete(&mut self, nick: &str) -> Result<String, BridgeError> {
        if self.subscriptions.remove(nick).is_none() {
            let idx = self
                .unreadable
                .iter()
                .position(|skipped| skipped == nick)
                .ok_or_else(|| self.not_found(nick))?;
            self.unreadable.remove(idx);
        }
        info!(nick = %nick, "subscription deleted");
        self.removed.push(nick.to_string());
        Ok(format!("deleted {} user {}", self.config.network, nick))
    }

    pub fn list(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} known {} users",
            self.subscriptions.len(),
            self.config.network
        )];
        lines.extend(self.subscriptions.values().map(|sub| {
            format!(
                "{}: user_id = {}, api_key = {}, session_key = {}, last_update {}",
                sub.nick,
                sub.user_id,
                sub.api_key,
                sub.session_key,
                sub.last_update.with_timezone(&Local).to_rfc2822()
            )
        }));
        lines
    }

    /// Signed URL of the stream request the next pass would make for `nick`.
    pub fn url(&self, nick: &str) -> Result<String> {
        let sub = self.get(nick)?;
        let request = sub.stream_request(Some(sub.last_update), self.config.stream_limit);
        let url = self.service.request_url(&request)?;
        Ok(format!("{}: {}", sub.nick, url))
    }

    pub fn ignore_add(
        &mut self,
        nick: &str,
        kind: IgnoreKind,
        name: &str,
    ) -> Result<String, BridgeError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(BridgeError::MissingArgument("name"));
        }
        let network = self.config.network.clone();
        let sub = self.get_mut(nick)?;
        sub.ignores_mut(kind).add(&name);
        Ok(format!(
            "Ignored {} {} for {} user {}",
            kind, name, network, sub.nick
        ))
    }

    pub fn ignore_delete(
        &mut self,
        nick: &str,
        kind: IgnoreKind,
        name: &str,
    ) -> Result<String, BridgeError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(BridgeError::MissingArgument("name"));
        }
        let network = self.config.network.clone();
        let sub = self.get_mut(nick)?;
        sub.ignores_mut(kind).remove(&name);
        Ok(format!(
            "Unignored {} {} for {} user {}",
            kind, name, network, sub.nick
        ))
    }

    pub fn ignore_list(&self, nick: &str, kind: IgnoreKind) -> Result<String, BridgeError> {
        let sub = self.get(nick)?;
        Ok(format!(
            "{} is ignoring {}s: {}",
            sub.nick,
            kind,
            sub.ignores(kind).list().join(", ")
        ))
    }

    /// Polls every subscription once, delivering lines to `sink`.
    pub fn update(&mut self, sink: &mut dyn Sink) -> UpdateReport {
        let mut report = UpdateReport::default();
        let nicks = self.subscriptions.keys().cloned().collect::<Vec<_>>();

        for nick in nicks {
            let cycle_start = Utc::now();
            match self.poll(&nick, cycle_start, sink) {
                Ok(stats) => {
                    if let Some(sub) = self.subscriptions.get_mut(&nick) {
                        sub.advance(cycle_start);
                    }
                    report.posts += stats.posts;
                    report.lines += stats.lines;
                    report.polled.push(nick);
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(nick = %nick, error = %error, "update failed");
                    report.failed.push((nick, error));
                }
            }
        }

        info!(
            polled = report.polled.len(),
            failed = report.failed.len(),
            lines = report.lines,
            "update pass finished"
        );
        report
    }

    fn poll(
        &mut self,
        nick: &str,
        cycle_start: DateTime<Utc>,
        sink: &mut dyn Sink,
    ) -> Result<CycleStats> {
        let sub = self.get(nick)?.clone();
        let request = sub.stream_request(Some(sub.last_update), self.config.stream_limit);
        let stream = self
            .service
            .fetch_stream(&request)
            .with_context(|| format!("stream for {nick}"))?;

        Ok(run_cycle(
            self.service.as_ref(),
            &self.config,
            &sub,
            &mut self.profiles,
            stream,
            cycle_start.with_timezone(&Local),
            sink,
        ))
    }

    /// Restores every stored subscription, migrating old record shapes.
    pub fn load(&mut self, store: &Store) -> Result<usize> {
        let now = Utc::now();
        let mut loaded = 0;
        for key in store.keys_with_prefix(RECORD_PREFIX)? {
            let Some(raw) = store.get(&key)? else {
                continue;
            };
            let record: SubscriptionRecord = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(err) => {
                    let error = err.to_string();
                    warn!(key = %key, error = %error, "skipping undecodable stored record");
                    if let Some(nick) = key.strip_prefix(RECORD_PREFIX) {
                        self.unreadable.push(nick.to_string());
                    }
                    continue;
                }
            };
            let sub = Subscription::from_record(record, now);
            if sub.nick.is_empty() {
                warn!(key = %key, "skipping stored record without nick");
                continue;
            }
            self.subscriptions.insert(sub.nick.clone(), sub);
            loaded += 1;
        }
        debug!(count = loaded, "subscriptions loaded");
        Ok(loaded)
    }

    pub fn save(&mut self, store: &Store) -> Result<()> {
        for nick in self.removed.drain(..) {
            store.remove(&record_key(&nick))?;
        }
        for sub in self.subscriptions.values() {
            let json = serde_json::to_string(&sub.to_record())
                .context("bridge: encode subscription record")?;
            store.put(&record_key(&sub.nick), &json)?;
        }
        Ok(())
    }
}

fn record_key(nick: &str) -> String {
    format!("{RECORD_PREFIX}{nick}")
}

/// Everything after the main stream fetch. Follow-up lookups only degrade
/// output when they fail.
fn run_cycle(
    service: &dyn StreamService,
    config: &BridgeConfig,
    sub: &Subscription,
    profiles: &mut Profiles,
    stream: RawStream,
    now: DateTime<Local>,
    sink: &mut dyn Sink,
) -> CycleStats {
    let RawStream {
        profiles: stream_profiles,
        posts,
    } = stream;
    profiles.merge_profiles(stream_profiles);

    let posts = parse_posts(posts, &config.noop_link);
    let posts = tracker::select_posts(posts, sub, profiles);
    let fmt = LineFormatter::new(&sub.nick, &config.network, now);
    let mut stats = CycleStats::default();

    for mut post in posts {
        stats.posts += 1;
        sink.send(fmt.post(&post, profiles));
        stats.lines += 1;

        if !post.all_comments_loaded() {
            match service.fetch_comments(&sub.comments_request(&post.id)) {
                Ok(comments) => {
                    post.replace_comments(comments.into_iter().map(Comment::from).collect())
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(
                        nick = %sub.nick,
                        post_id = %post.id,
                        error = %error,
                        "comment list unavailable, showing loaded comments"
                    );
                }
            }
        }

        let unknown = tracker::unknown_authors(&post, sub.last_update, profiles);
        for batch in unknown.chunks(PROFILE_BATCH) {
            match service.fetch_users(&sub.profiles_request(batch)) {
                Ok(users) => profiles.merge_users(users),
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(
                        nick = %sub.nick,
                        count = batch.len(),
                        error = %error,
                        "profile lookup failed, showing ids"
                    );
                }
            }
        }

        let selection = tracker::select_comments(&post, sub, profiles, config.max_comments);
        for (position, comment) in &selection.shown {
            sink.send(fmt.comment(*position, post.comment_count, comment, profiles));
            stats.lines += 1;
        }
        if selection.is_truncated() {
            sink.send(fmt.overflow(selection.hidden, &post.permalink));
            stats.lines += 1;
        }
    }

    stats
}
