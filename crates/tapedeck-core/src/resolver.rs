//! Track Resolver — turns what the user types into a playable [`Candidate`].
//!
//! Urls are taken at face value: the media url follows every keystroke, and
//! a title is guessed from the path once the input has been stable for the
//! debounce window. Anything else is a search query: after the same window
//! it goes to the [`SearchService`], and the first hit fills in title, cover
//! and media url. Every deferred step carries an id; only the most recent one
//! may touch the candidate, and changing the input aborts the previous one
//! outright.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tapedeck_proto::config::SearchConfig;
use tapedeck_proto::tape::{default_color, Tape, TapeError, PALETTE};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::search::{SearchError, SearchHit, SearchService};
use crate::timer::next_token;

/// Longest title a label can hold.
pub const TITLE_MAX_CHARS: usize = 40;

pub const DEMO_TITLE: &str = "放漾 - A公館";
pub const DEMO_QUERY: &str = "放漾 A公館";
pub const DEMO_COVER: &str = "https://is1-ssl.mzstatic.com/image/thumb/Music113/v4/24/4f/d5/244fd5f5-9cfa-30ba-5451-bf62c648ed3c/wgg.jpg/600x600bb.jpg";
/// Played when the demo lookup comes back empty.
pub const DEMO_FALLBACK_URL: &str = "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-1.mp3";

/// Track metadata being assembled in the editor. Fields fill in
/// independently as input arrives and lookups complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub media_url: String,
    pub title: String,
    pub cover_url: String,
    pub artist: Option<String>,
    pub color: String,
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            media_url: String::new(),
            title: String::new(),
            cover_url: String::new(),
            artist: None,
            color: default_color(),
        }
    }
}

impl Candidate {
    /// Submission is allowed only once both url and title are known.
    pub fn is_complete(&self) -> bool {
        !self.media_url.trim().is_empty() && !self.title.trim().is_empty()
    }

    pub fn to_tape(&self) -> Result<Tape, TapeError> {
        let mut tape = Tape::new(&self.media_url, &self.title, &self.color)?;
        tape = tape.with_cover(&self.cover_url);
        if let Some(artist) = &self.artist {
            tape = tape.with_artist(artist);
        }
        Ok(tape)
    }
}

/// How the editor should badge the input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Link,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupPurpose {
    /// A user query; the hit replaces title, cover and media url.
    Query,
    /// The demo button; only the media url is taken, with a fallback.
    Demo,
}

/// Deferred work finishing, delivered on the resolver's event channel.
#[derive(Debug)]
pub enum ResolverEvent {
    LookupFinished {
        id: u64,
        purpose: LookupPurpose,
        term: String,
        result: Result<Option<SearchHit>, SearchError>,
    },
    /// A url input stayed unchanged for the debounce window.
    LinkSettled { id: u64, url: String },
}

pub fn is_url(input: &str) -> bool {
    Regex::new(r"^(http|https)://")
        .map(|re| re.is_match(input))
        .unwrap_or(false)
}

/// Guess a title from the last path segment of a media url:
/// `https://x/My_Song.mp3?x=1` → `My Song`.
pub fn title_from_url(url: &str) -> Option<String> {
    let segment = url.rsplit('/').next()?;
    let filename = segment.split('?').next().unwrap_or(segment);
    let decoded = urlencoding::decode(filename).ok()?.into_owned();
    let stem = Regex::new(r"(?i)\.(mp3|wav|ogg|m4a)$")
        .map(|re| re.replace(&decoded, "").into_owned())
        .unwrap_or(decoded);
    let name = stem.replace(['_', '-'], " ").trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

struct Lookup {
    id: u64,
    task: AbortHandle,
}

impl Lookup {
    fn abort(self) {
        self.task.abort();
    }
}

pub struct TrackResolver<S> {
    search: Arc<S>,
    config: SearchConfig,
    events: mpsc::Sender<ResolverEvent>,
    input: String,
    candidate: Candidate,
    updates: watch::Sender<Candidate>,
    lookup: Option<Lookup>,
    /// Pending title guess for a url input.
    settle: Option<Lookup>,
}

impl<S: SearchService> TrackResolver<S> {
    pub fn new(search: Arc<S>, config: SearchConfig, events: mpsc::Sender<ResolverEvent>) -> Self {
        let (updates, _) = watch::channel(Candidate::default());
        Self {
            search,
            config,
            events,
            input: String::new(),
            candidate: Candidate::default(),
            updates,
            lookup: None,
            settle: None,
        }
    }

    /// Observe the candidate as it fills in.
    pub fn subscribe(&self) -> watch::Receiver<Candidate> {
        self.updates.subscribe()
    }

    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_kind(&self) -> InputKind {
        if is_url(&self.input) {
            InputKind::Link
        } else {
            InputKind::Search
        }
    }

    /// True while a lookup is waiting out the debounce or in flight.
    pub fn is_searching(&self) -> bool {
        self.lookup.is_some()
    }

    pub fn can_submit(&self) -> bool {
        self.candidate.is_complete()
    }

    /// The search/url field changed.
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        self.abandon_lookup();

        if is_url(&self.input) {
            debug!("resolver: direct url {}", self.input);
            self.candidate.media_url = self.input.clone();
            self.candidate.artist = None;
            self.publish();
            // A half-typed url would lock in a half-typed title.
            if self.candidate.title.is_empty() {
                self.start_settle(self.input.clone());
            }
            return;
        }

        if self.input.trim().is_empty() || self.input.chars().count() < self.config.min_query_chars
        {
            return;
        }

        let term = self.input.clone();
        self.start_lookup(LookupPurpose::Query, term, self.config.debounce());
    }

    pub fn set_title(&mut self, text: &str) {
        self.candidate.title = truncate_title(text);
        self.publish();
    }

    /// Manual cover override. An empty url clears the cover.
    pub fn set_cover(&mut self, url: &str) {
        self.candidate.cover_url = url.trim().to_string();
        self.publish();
    }

    /// Pick a label colour. Colour and cover are exclusive, so this drops
    /// the cover. Returns `false` for an index outside the palette.
    pub fn select_color(&mut self, idx: usize) -> bool {
        let Some(color) = PALETTE.get(idx) else {
            return false;
        };
        self.candidate.color = color.to_string();
        self.candidate.cover_url.clear();
        self.publish();
        true
    }

    /// The cover image failed to load; fall back to the colour.
    pub fn cover_failed(&mut self) {
        if !self.candidate.cover_url.is_empty() {
            debug!("resolver: cover failed to load, using colour");
            self.candidate.cover_url.clear();
            self.publish();
        }
    }

    /// Fill the editor with the demo track and look up its audio. Once that
    /// lands, the demo label is searched like typed input and a hit replaces
    /// title, cover and url.
    pub fn demo(&mut self) {
        self.abandon_lookup();
        self.input = DEMO_TITLE.to_string();
        self.candidate.title = DEMO_TITLE.to_string();
        self.candidate.cover_url = DEMO_COVER.to_string();
        self.publish();
        self.start_lookup(LookupPurpose::Demo, DEMO_QUERY.to_string(), Duration::ZERO);
    }

    /// Produce the tape, or refuse if url or title is still missing.
    pub fn commit(&self) -> Result<Tape, TapeError> {
        self.candidate.to_tape()
    }

    /// Stop any pending lookup; its result will never be applied.
    pub fn cancel(&mut self) {
        self.abandon_lookup();
    }

    /// Apply finished deferred work. Returns `true` if the candidate changed.
    pub fn handle_event(&mut self, event: ResolverEvent) -> bool {
        match event {
            ResolverEvent::LookupFinished {
                id,
                purpose,
                term,
                result,
            } => self.finish_lookup(id, purpose, term, result),
            ResolverEvent::LinkSettled { id, url } => self.finish_settle(id, &url),
        }
    }

    fn finish_settle(&mut self, id: u64, url: &str) -> bool {
        if self.settle.as_ref().map(|s| s.id) != Some(id) {
            debug!("resolver: discarding stale link settle {}", id);
            return false;
        }
        self.settle = None;
        if !self.candidate.title.is_empty() {
            return false;
        }
        let Some(title) = title_from_url(url) else {
            return false;
        };
        self.candidate.title = truncate_title(&title);
        self.publish();
        true
    }

    fn finish_lookup(
        &mut self,
        id: u64,
        purpose: LookupPurpose,
        term: String,
        result: Result<Option<SearchHit>, SearchError>,
    ) -> bool {
        match &self.lookup {
            Some(lookup) if lookup.id == id => {}
            _ => {
                debug!("resolver: discarding stale lookup {} for {:?}", id, term);
                return false;
            }
        }
        self.lookup = None;

        match (purpose, result) {
            (LookupPurpose::Query, Ok(Some(hit))) => {
                info!("resolver: {:?} → {}", term, hit.title());
                self.candidate.title = truncate_title(&hit.title());
                if let Some(cover) = hit.cover_url() {
                    self.candidate.cover_url = cover;
                }
                if let Some(preview) = hit.preview_url {
                    self.candidate.media_url = preview;
                }
                self.candidate.artist = Some(hit.artist_name).filter(|a| !a.is_empty());
            }
            (LookupPurpose::Query, Ok(None)) => {
                debug!("resolver: no results for {:?}", term);
                return false;
            }
            (LookupPurpose::Query, Err(e)) => {
                warn!("resolver: search for {:?} failed: {}", term, e);
                return false;
            }
            (LookupPurpose::Demo, result) => {
                let preview = match result {
                    Ok(hit) => hit.and_then(|h| h.preview_url),
                    Err(e) => {
                        warn!("resolver: demo lookup failed: {}", e);
                        None
                    }
                };
                self.candidate.media_url =
                    preview.unwrap_or_else(|| DEMO_FALLBACK_URL.to_string());
                // The demo label is also the input, and stable input gets
                // searched like anything typed.
                let term = self.input.clone();
                self.start_lookup(LookupPurpose::Query, term, self.config.debounce());
            }
        }

        self.publish();
        true
    }

    fn start_lookup(&mut self, purpose: LookupPurpose, term: String, delay: Duration) {
        let id = next_token();
        let search = Arc::clone(&self.search);
        let tx = self.events.clone();
        debug!("resolver: lookup {} for {:?} in {:?}", id, term, delay);

        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = search.search(&term).await;
            let _ = tx
                .send(ResolverEvent::LookupFinished {
                    id,
                    purpose,
                    term,
                    result,
                })
                .await;
        });

        self.lookup = Some(Lookup {
            id,
            task: task.abort_handle(),
        });
    }

    fn start_settle(&mut self, url: String) {
        let id = next_token();
        let tx = self.events.clone();
        let delay = self.config.debounce();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ResolverEvent::LinkSettled { id, url }).await;
        });
        self.settle = Some(Lookup {
            id,
            task: task.abort_handle(),
        });
    }

    fn abandon_lookup(&mut self) {
        if let Some(lookup) = self.lookup.take() {
            debug!("resolver: abandoning lookup {}", lookup.id);
            lookup.abort();
        }
        if let Some(settle) = self.settle.take() {
            settle.abort();
        }
    }

    fn publish(&self) {
        self.updates.send_replace(self.candidate.clone());
    }
}

impl<S> Drop for TrackResolver<S> {
    fn drop(&mut self) {
        for pending in [self.lookup.take(), self.settle.take()].into_iter().flatten() {
            pending.abort();
        }
    }
}

fn truncate_title(title: &str) -> String {
    title.chars().take(TITLE_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_url() {
        assert_eq!(
            title_from_url("https://example.com/My_Song.mp3?x=1").as_deref(),
            Some("My Song")
        );
        assert_eq!(
            title_from_url("https://example.com/music/lo-fi%20beats.OGG").as_deref(),
            Some("lo fi beats")
        );
        assert_eq!(
            title_from_url("https://example.com/stream").as_deref(),
            Some("stream")
        );
        assert_eq!(title_from_url("https://example.com/"), None);
        assert_eq!(title_from_url("https://example.com/.mp3"), None);
        // Not valid UTF-8 once decoded.
        assert_eq!(title_from_url("https://example.com/%FF.mp3"), None);
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("http://example.com/a.mp3"));
        assert!(is_url("https://example.com"));
        assert!(!is_url("ftp://example.com"));
        assert!(!is_url("  https://example.com"));
        assert!(!is_url("daft punk"));
    }

    #[test]
    fn test_candidate_completeness() {
        let mut c = Candidate::default();
        assert!(!c.is_complete());
        c.title = "Mix".into();
        assert!(!c.is_complete());
        assert_eq!(c.to_tape(), Err(TapeError::MissingUrl));
        c.media_url = "https://example.com/a.mp3".into();
        assert!(c.is_complete());
        let tape = c.to_tape().unwrap();
        assert_eq!(tape.color(), "#3b82f6");
        assert!(tape.cover().is_none());
    }

    #[test]
    fn test_truncate_title_counts_chars() {
        let long = "放".repeat(50);
        assert_eq!(truncate_title(&long).chars().count(), TITLE_MAX_CHARS);
    }
}
