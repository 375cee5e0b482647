use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;

use crate::api;
use crate::sign::SignedRequest;
use crate::stream::{RawComment, RawStream, RawUser};

/// Fetch seam between the bridge and whatever carries requests to the network.
pub trait StreamService: Send + Sync {
    fn fetch_stream(&self, request: &SignedRequest) -> Result<RawStream>;
    fn fetch_comments(&self, request: &SignedRequest) -> Result<Vec<RawComment>>;
    fn fetch_users(&self, request: &SignedRequest) -> Result<Vec<RawUser>>;
    fn request_url(&self, request: &SignedRequest) -> Result<String>;
}

pub struct RestStreamService {
    client: Arc<api::Client>,
}

impl RestStreamService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl StreamService for RestStreamService {
    fn fetch_stream(&self, request: &SignedRequest) -> Result<RawStream> {
        self.client.stream(request).context("fetch stream")
    }

    fn fetch_comments(&self, request: &SignedRequest) -> Result<Vec<RawComment>> {
        self.client.comments(request).context("fetch comments")
    }

    fn fetch_users(&self, request: &SignedRequest) -> Result<Vec<RawUser>> {
        self.client.users(request).context("fetch profiles")
    }

    fn request_url(&self, request: &SignedRequest) -> Result<String> {
        Ok(request.url(self.client.base_url())?.to_string())
    }
}

/// Canned responses keyed by viewer (streams) and post id (comments).
///
/// A key with no canned response fails the call, which lets tests exercise
/// the fallback paths. Every request is recorded.
#[derive(Default)]
pub struct MockStreamService {
    streams: Mutex<HashMap<String, RawStream>>,
    comments: Mutex<HashMap<String, Vec<RawComment>>>,
    users: Mutex<Option<Vec<RawUser>>>,
    requests: Mutex<Vec<SignedRequest>>,
}

impl MockStreamService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, viewer_id: &str, stream: RawStream) -> Self {
        self.streams.lock().insert(viewer_id.to_string(), stream);
        self
    }

    pub fn with_comments(self, post_id: &str, comments: Vec<RawComment>) -> Self {
        self.comments.lock().insert(post_id.to_string(), comments);
        self
    }

    pub fn with_users(self, users: Vec<RawUser>) -> Self {
        *self.users.lock() = Some(users);
        self
    }

    pub fn requests(&self) -> Vec<SignedRequest> {
        self.requests.lock().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|req| req.method().to_string())
            .collect()
    }

    fn record(&self, request: &SignedRequest) {
        self.requests.lock().push(request.clone());
    }
}

impl StreamService for MockStreamService {
    fn fetch_stream(&self, request: &SignedRequest) -> Result<RawStream> {
        self.record(request);
        let viewer = request.param("viewer_id").unwrap_or_default();
        self.streams
            .lock()
            .get(viewer)
            .cloned()
            .ok_or_else(|| anyhow!("mock: no stream for viewer {viewer}"))
    }

    fn fetch_comments(&self, request: &SignedRequest) -> Result<Vec<RawComment>> {
        self.record(request);
        let post_id = request.param("post_id").unwrap_or_default();
        self.comments
            .lock()
            .get(post_id)
            .cloned()
            .ok_or_else(|| anyhow!("mock: no comments for post {post_id}"))
    }

    fn fetch_users(&self, request: &SignedRequest) -> Result<Vec<RawUser>> {
        self.record(request);
        self.users
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("mock: profile lookup unavailable"))
    }

    fn request_url(&self, request: &SignedRequest) -> Result<String> {
        Ok(request.url(crate::sign::DEFAULT_BASE_URL)?.to_string())
    }
}
