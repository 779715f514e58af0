//! Control channel (client to server request/response)

use crate::{CoreError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Control endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Application-state initialization
    InitApp,
    /// Start-of-processing signal
    StartThreads,
    /// Explicit fragment pull
    Request,
    /// Serialized prediction
    PostDist,
    /// Telemetry events
    LogWrite,
    /// Session trace
    LogTrace,
}

impl Endpoint {
    /// Request path
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::InitApp => "/initapp",
            Endpoint::StartThreads => "start/threads",
            Endpoint::Request => "/request",
            Endpoint::PostDist => "/post_dist",
            Endpoint::LogWrite => "/log/write",
            Endpoint::LogTrace => "/log/trace",
        }
    }
}

/// Accepts a JSON document and optionally answers with one
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Post a document
    async fn post(&self, endpoint: Endpoint, body: Value) -> Result<Option<Value>>;
}

/// Channel that records every post and replies from a canned table
#[derive(Debug, Default)]
pub struct RecordingChannel {
    posts: Mutex<Vec<(Endpoint, Value)>>,
    replies: Mutex<HashMap<Endpoint, Value>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `endpoint` with `body`
    pub fn with_reply(self, endpoint: Endpoint, body: Value) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(endpoint, body);
        self
    }

    /// Make every subsequent post fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything posted so far
    pub fn posts(&self) -> Vec<(Endpoint, Value)> {
        self.posts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Bodies posted to one endpoint
    pub fn posts_to(&self, endpoint: Endpoint) -> Vec<Value> {
        self.posts()
            .into_iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, body)| body)
            .collect()
    }
}

#[async_trait]
impl ControlChannel for RecordingChannel {
    async fn post(&self, endpoint: Endpoint, body: Value) -> Result<Option<Value>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::control(endpoint.path(), "channel closed"));
        }
        self.posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((endpoint, body));
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&endpoint)
            .cloned();
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_recording_channel_replies() {
        let channel = RecordingChannel::new().with_reply(Endpoint::InitApp, json!({"ok": true}));

        let reply = channel.post(Endpoint::InitApp, json!({"appname": "gallery"})).await.unwrap();
        assert_eq!(reply, Some(json!({"ok": true})));

        let reply = channel.post(Endpoint::PostDist, json!({})).await.unwrap();
        assert!(reply.is_none());

        assert_eq!(channel.posts().len(), 2);
        assert_eq!(channel.posts_to(Endpoint::InitApp)[0]["appname"], "gallery");
    }

    #[tokio::test]
    async fn test_failing_channel() {
        let channel = RecordingChannel::new();
        channel.set_failing(true);
        let err = channel.post(Endpoint::PostDist, json!({})).await.unwrap_err();
        assert!(err.is_transport());
        assert!(channel.posts().is_empty());
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::PostDist.path(), "/post_dist");
        assert_eq!(Endpoint::StartThreads.path(), "start/threads");
    }
}
