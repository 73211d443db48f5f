//! Deck Controller — the only owner of [`DeckState`].
//!
//! Transport rules:
//!
//! ```text
//!   eject        stop if playing, then toggle the door
//!   play         door shut + tape + idle  → port.play(), outcome arrives later
//!   stop         playing                  → port.pause()
//!   slot         door open + tape         → tape removed
//!                door open + no tape      → editor opens
//!   insert       any                      → tape loaded, door shuts after a delay
//! ```
//!
//! Everything that happens later (auto-close, fault expiry, play outcomes)
//! comes back as a [`DeckEvent`] through the channel handed to `new`.

use tapedeck_proto::config::DeckConfig;
use tapedeck_proto::deck::{ControlState, DeckFault, DeckSnapshot, DeckState};
use tapedeck_proto::tape::Tape;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::playback::{PlayFuture, PlaybackError, PlaybackNotice, PlaybackPort};
use crate::timer::{next_token, schedule_after, TimerSlot};

/// Deferred inputs to the controller.
#[derive(Debug)]
pub enum DeckEvent {
    /// The post-insert delay elapsed.
    AutoClose { token: u64 },
    /// A fault has been on display long enough.
    ClearFault { token: u64 },
    /// The port finished a play request.
    PlayOutcome {
        attempt: u64,
        result: Result<(), PlaybackError>,
    },
}

/// A play request in flight. Await [`PlayAttempt::resolve`] and hand the
/// resulting event back to [`DeckController::handle_event`].
pub struct PlayAttempt {
    pub attempt: u64,
    pub outcome: PlayFuture,
}

impl PlayAttempt {
    pub async fn resolve(self) -> DeckEvent {
        DeckEvent::PlayOutcome {
            attempt: self.attempt,
            result: self.outcome.await,
        }
    }
}

impl std::fmt::Debug for PlayAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayAttempt")
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// What a click on the cassette slot did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAction {
    /// Door shut, or the editor is already up.
    Ignored,
    TapeRemoved,
    /// The deck was empty; the mixtape editor should start.
    OpenEditor,
}

pub struct DeckController<P> {
    state: DeckState,
    port: P,
    config: DeckConfig,
    events: mpsc::Sender<DeckEvent>,
    editor_open: bool,
    /// Attempt id of the play request awaiting its outcome.
    pending_play: Option<u64>,
    /// Url last handed to the port.
    port_source: Option<String>,
    auto_close: TimerSlot,
    fault_clear: TimerSlot,
}

impl<P: PlaybackPort> DeckController<P> {
    pub fn new(port: P, config: DeckConfig, events: mpsc::Sender<DeckEvent>) -> Self {
        Self {
            state: DeckState::default(),
            port,
            config,
            events,
            editor_open: false,
            pending_play: None,
            port_source: None,
            auto_close: TimerSlot::new(),
            fault_clear: TimerSlot::new(),
        }
    }

    pub fn state(&self) -> &DeckState {
        &self.state
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn editor_open(&self) -> bool {
        self.editor_open
    }

    pub fn is_play_pending(&self) -> bool {
        self.pending_play.is_some()
    }

    pub fn controls(&self) -> ControlState {
        self.state.controls()
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        DeckSnapshot::new(&self.state, self.editor_open)
    }

    // ── Transport ─────────────────────────────────────────────────────────────

    pub fn eject(&mut self) {
        // Never leave audio running behind a moving door.
        self.halt();
        self.state.door_open = !self.state.door_open;
        info!("deck: eject, door_open={}", self.state.door_open);
    }

    /// Begin playing the loaded tape. Returns `None` when the deck is not in
    /// a playable state or a previous request is still pending.
    pub fn play(&mut self) -> Option<PlayAttempt> {
        if self.state.door_open || self.state.playing || self.pending_play.is_some() {
            debug!(
                "deck: play ignored (door_open={}, playing={}, pending={})",
                self.state.door_open,
                self.state.playing,
                self.pending_play.is_some()
            );
            return None;
        }
        let url = match &self.state.tape {
            Some(tape) => tape.url().to_string(),
            None => {
                debug!("deck: play ignored, no tape");
                return None;
            }
        };

        if self.port_source.as_deref() != Some(url.as_str()) {
            debug!("deck: loading source {}", url);
            self.port.set_source(&url);
            self.port_source = Some(url);
        }

        self.clear_fault();
        let attempt = next_token();
        self.pending_play = Some(attempt);
        info!("deck: play requested (attempt {})", attempt);
        Some(PlayAttempt {
            attempt,
            outcome: self.port.play(),
        })
    }

    pub fn stop(&mut self) {
        if !self.state.playing && self.pending_play.is_none() {
            debug!("deck: stop ignored, not playing");
            return;
        }
        self.halt();
        info!("deck: stopped");
    }

    /// Click on the open door: swing it shut.
    pub fn close_door(&mut self) {
        if self.state.door_open {
            self.state.door_open = false;
            info!("deck: door closed by hand");
        }
    }

    pub fn slot(&mut self) -> SlotAction {
        if !self.state.door_open || self.editor_open {
            return SlotAction::Ignored;
        }
        if let Some(tape) = self.state.tape.take() {
            info!("deck: removed tape {:?}", tape.title());
            self.state.playing = false;
            self.auto_close.cancel();
            SlotAction::TapeRemoved
        } else {
            info!("deck: slot empty, opening editor");
            self.editor_open = true;
            SlotAction::OpenEditor
        }
    }

    /// Load a freshly made tape. The door shuts on its own after the
    /// configured delay, whatever happens in between.
    pub fn insert(&mut self, tape: Tape) {
        self.halt();
        info!("deck: inserted {:?}", tape.title());
        self.state.tape = Some(tape);
        self.clear_fault();
        self.editor_open = false;

        let handle = schedule_after(&self.events, self.config.auto_close(), |token| {
            DeckEvent::AutoClose { token }
        });
        self.auto_close.arm(handle);
    }

    pub fn cancel_editor(&mut self) {
        if self.editor_open {
            debug!("deck: editor cancelled");
            self.editor_open = false;
        }
    }

    // ── Deferred inputs ───────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: DeckEvent) {
        match event {
            DeckEvent::AutoClose { token } => {
                if self.auto_close.fire(token) {
                    self.state.door_open = false;
                    debug!("deck: auto-close, door shut");
                }
            }
            DeckEvent::ClearFault { token } => {
                if self.fault_clear.fire(token) {
                    self.state.fault = None;
                    debug!("deck: fault expired");
                }
            }
            DeckEvent::PlayOutcome { attempt, result } => self.on_play_outcome(attempt, result),
        }
    }

    pub fn handle_notice(&mut self, notice: PlaybackNotice) {
        match notice {
            PlaybackNotice::Ended => self.on_ended(),
            PlaybackNotice::Failed => self.on_error(),
        }
    }

    pub fn on_play_outcome(&mut self, attempt: u64, result: Result<(), PlaybackError>) {
        if self.pending_play != Some(attempt) {
            debug!("deck: discarding outcome of superseded attempt {}", attempt);
            return;
        }
        self.pending_play = None;

        match result {
            Ok(()) => {
                self.state.playing = true;
                self.clear_fault();
                info!("deck: playing");
            }
            Err(e) => {
                warn!("deck: playback failed: {}", e);
                self.state.playing = false;
                self.raise_fault();
            }
        }
    }

    pub fn on_ended(&mut self) {
        if self.state.playing || self.pending_play.is_some() {
            self.state.playing = false;
            self.pending_play = None;
            info!("deck: tape ran out");
        }
    }

    pub fn on_error(&mut self) {
        if !self.state.playing && self.pending_play.is_none() {
            debug!("deck: playback error while idle, ignored");
            return;
        }
        warn!("deck: playback error reported by port");
        self.state.playing = false;
        self.pending_play = None;
        self.raise_fault();
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Pause the port if anything is playing or about to.
    fn halt(&mut self) {
        if self.state.playing || self.pending_play.is_some() {
            self.port.pause();
            self.state.playing = false;
            self.pending_play = None;
        }
    }

    fn raise_fault(&mut self) {
        let url = self.state.tape.as_ref().map(|t| t.url()).unwrap_or_default();
        let fault = DeckFault::classify(url, &self.config.drm_host_marker);
        warn!("deck: {}", fault);
        self.state.fault = Some(fault);

        let handle = schedule_after(&self.events, self.config.error_clear(), |token| {
            DeckEvent::ClearFault { token }
        });
        self.fault_clear.arm(handle);
    }

    fn clear_fault(&mut self) {
        self.state.fault = None;
        self.fault_clear.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Source(String),
        Play,
        Pause,
    }

    #[derive(Default)]
    struct RecordingPort {
        calls: Vec<Call>,
        fail: bool,
    }

    impl PlaybackPort for RecordingPort {
        fn set_source(&mut self, url: &str) {
            self.calls.push(Call::Source(url.to_string()));
        }

        fn play(&mut self) -> PlayFuture {
            self.calls.push(Call::Play);
            let result = if self.fail {
                Err(PlaybackError::Rejected("unsupported".into()))
            } else {
                Ok(())
            };
            futures_util::future::ready(result).boxed()
        }

        fn pause(&mut self) {
            self.calls.push(Call::Pause);
        }
    }

    fn tape(url: &str) -> Tape {
        Tape::new(url, "Side A", "#3b82f6").unwrap()
    }

    fn deck() -> (DeckController<RecordingPort>, mpsc::Receiver<DeckEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (
            DeckController::new(RecordingPort::default(), DeckConfig::default(), tx),
            rx,
        )
    }

    fn play_now(deck: &mut DeckController<RecordingPort>) {
        let attempt = deck.play().expect("play should start");
        let id = attempt.attempt;
        let result = attempt
            .outcome
            .now_or_never()
            .expect("fake port resolves immediately");
        deck.on_play_outcome(id, result);
    }

    #[tokio::test]
    async fn test_play_requires_closed_door_and_tape() {
        let (mut deck, _rx) = deck();
        assert!(deck.play().is_none());

        deck.eject();
        deck.insert(tape("https://example.com/a.mp3"));
        assert!(deck.state().door_open);
        assert!(deck.play().is_none());
        assert!(deck.port().calls.is_empty());
    }

    #[tokio::test]
    async fn test_play_loads_source_once() {
        let (mut deck, _rx) = deck();
        deck.insert(tape("https://example.com/a.mp3"));

        play_now(&mut deck);
        assert!(deck.state().playing);
        deck.stop();
        play_now(&mut deck);

        assert_eq!(
            deck.port().calls,
            vec![
                Call::Source("https://example.com/a.mp3".into()),
                Call::Play,
                Call::Pause,
                Call::Play,
            ]
        );
    }

    #[tokio::test]
    async fn test_second_play_while_pending_is_rejected() {
        let (mut deck, _rx) = deck();
        deck.insert(tape("https://example.com/a.mp3"));

        let first = deck.play().unwrap();
        assert!(deck.is_play_pending());
        assert!(deck.play().is_none());

        deck.on_play_outcome(first.attempt, Ok(()));
        assert!(deck.state().playing);
        assert!(!deck.is_play_pending());
    }

    #[tokio::test]
    async fn test_tape_end_during_pending_play_drops_the_attempt() {
        let (mut deck, _rx) = deck();
        deck.insert(tape("https://example.com/a.mp3"));

        let attempt = deck.play().unwrap();
        deck.handle_notice(PlaybackNotice::Ended);
        assert!(!deck.is_play_pending());

        deck.on_play_outcome(attempt.attempt, Ok(()));
        assert!(!deck.state().playing);
        assert!(!deck.is_play_pending());
    }

    #[tokio::test]
    async fn test_eject_while_playing_pauses_before_opening() {
        let (mut deck, _rx) = deck();
        deck.insert(tape("https://example.com/a.mp3"));
        play_now(&mut deck);

        deck.eject();
        assert_eq!(deck.port().calls.last(), Some(&Call::Pause));
        assert!(deck.state().door_open);
        assert!(!deck.state().playing);
    }

    #[tokio::test]
    async fn test_late_success_after_eject_is_discarded() {
        let (mut deck, _rx) = deck();
        deck.insert(tape("https://example.com/a.mp3"));

        let attempt = deck.play().unwrap();
        deck.eject();
        deck.on_play_outcome(attempt.attempt, Ok(()));

        assert!(!deck.state().playing);
        assert!(deck.state().door_open);
        assert!(deck.state().is_consistent());
    }

    #[tokio::test]
    async fn test_failed_play_sets_fault_and_leaves_tape() {
        let (tx, _rx) = mpsc::channel(16);
        let port = RecordingPort {
            fail: true,
            ..Default::default()
        };
        let mut deck = DeckController::new(port, DeckConfig::default(), tx);
        deck.insert(tape("https://open.spotify.com/track/xyz"));

        let attempt = deck.play().unwrap();
        let result = attempt.outcome.now_or_never().unwrap();
        deck.on_play_outcome(attempt.attempt, result);

        assert!(!deck.state().playing);
        assert_eq!(deck.state().fault, Some(DeckFault::DrmLocked));
        assert!(deck.state().has_tape());
        assert!(!deck.state().door_open);
    }

    #[tokio::test]
    async fn test_slot_removes_tape_or_opens_editor() {
        let (mut deck, _rx) = deck();
        assert_eq!(deck.slot(), SlotAction::Ignored);

        deck.eject();
        assert_eq!(deck.slot(), SlotAction::OpenEditor);
        assert!(deck.editor_open());
        assert_eq!(deck.slot(), SlotAction::Ignored);

        deck.insert(tape("https://example.com/a.mp3"));
        assert!(!deck.editor_open());
        assert_eq!(deck.slot(), SlotAction::TapeRemoved);
        assert!(!deck.state().has_tape());
    }

    #[tokio::test]
    async fn test_natural_end_stops() {
        let (mut deck, _rx) = deck();
        deck.insert(tape("https://example.com/a.mp3"));
        play_now(&mut deck);

        deck.handle_notice(PlaybackNotice::Ended);
        assert!(!deck.state().playing);
        assert!(deck.state().fault.is_none());
    }

    #[tokio::test]
    async fn test_error_while_idle_is_ignored() {
        let (mut deck, _rx) = deck();
        deck.insert(tape("https://example.com/a.mp3"));
        deck.on_error();
        assert!(deck.state().fault.is_none());
    }

    #[tokio::test]
    async fn test_close_door_by_hand() {
        let (mut deck, _rx) = deck();
        deck.eject();
        deck.close_door();
        assert!(!deck.state().door_open);
        deck.close_door();
        assert!(!deck.state().door_open);
    }
}
