#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tapedeck_core::{PlayFuture, PlaybackError, PlaybackPort, SearchError, SearchHit, SearchService};

// ── Playback ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PortCall {
    Source(String),
    Play,
    Pause,
}

/// Port that records every call and answers `play` with a fixed result.
#[derive(Debug, Default)]
pub struct FakePort {
    pub calls: Vec<PortCall>,
    pub fail: bool,
}

impl FakePort {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl PlaybackPort for FakePort {
    fn set_source(&mut self, url: &str) {
        self.calls.push(PortCall::Source(url.to_string()));
    }

    fn play(&mut self) -> PlayFuture {
        self.calls.push(PortCall::Play);
        let result = if self.fail {
            Err(PlaybackError::Rejected("format not supported".into()))
        } else {
            Ok(())
        };
        futures_util::future::ready(result).boxed()
    }

    fn pause(&mut self) {
        self.calls.push(PortCall::Pause);
    }
}

// ── Search ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Reply {
    Hit(SearchHit),
    Miss,
    Fail,
}

/// Search service that logs every term it is asked for.
#[derive(Debug, Clone)]
pub struct FakeSearch {
    pub terms: Arc<Mutex<Vec<String>>>,
    pub reply: Reply,
    pub latency: Duration,
}

impl FakeSearch {
    pub fn new(reply: Reply) -> Self {
        Self {
            terms: Arc::new(Mutex::new(Vec::new())),
            reply,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn terms(&self) -> Vec<String> {
        self.terms.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchService for FakeSearch {
    async fn search(&self, term: &str) -> Result<Option<SearchHit>, SearchError> {
        self.terms.lock().unwrap().push(term.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.reply {
            Reply::Hit(hit) => Ok(Some(hit.clone())),
            Reply::Miss => Ok(None),
            Reply::Fail => Err(SearchError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)),
        }
    }
}

pub fn sample_hit() -> SearchHit {
    SearchHit {
        track_name: "Around the World".into(),
        artist_name: "Daft Punk".into(),
        artwork_url: Some("https://is1-ssl.mzstatic.com/image/thumb/a/b/100x100bb.jpg".into()),
        preview_url: Some("https://audio-ssl.itunes.apple.com/preview/atw.m4a".into()),
    }
}
