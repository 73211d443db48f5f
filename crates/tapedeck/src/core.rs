/// DeckCore — the single owner of the deck controller and the mixtape editor.
///
/// Every input funnels into one `select!` loop:
///
/// ```text
///   console / HTTP ──Command──────────┐
///   timers, play outcomes ─DeckEvent──┤
///   search lookups ──ResolverEvent────┼──► DeckCore::run ──► watch<DeckSnapshot>
///   mpv end-file ──PlaybackNotice─────┘                 └──► watch<Option<EditorView>>
/// ```
///
/// The editor (a [`TrackResolver`]) exists only between a slot click on an
/// empty deck and the matching insert or cancel.
use std::sync::Arc;

use serde::Serialize;
use tapedeck_core::{
    Candidate, DeckController, DeckEvent, InputKind, PlaybackNotice, PlaybackPort,
    ResolverEvent, SearchService, SlotAction, TrackResolver,
};
use tapedeck_proto::config::Config;
use tapedeck_proto::deck::DeckSnapshot;
use tapedeck_proto::protocol::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Render-ready view of the open editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorView {
    pub input: String,
    /// Input is a direct link rather than a search query.
    pub link: bool,
    pub searching: bool,
    pub can_submit: bool,
    pub candidate: Candidate,
}

/// Receivers for everything the core publishes.
#[derive(Clone)]
pub struct CoreViews {
    pub deck: watch::Receiver<DeckSnapshot>,
    pub editor: watch::Receiver<Option<EditorView>>,
}

pub struct DeckCore<P, S> {
    config: Config,
    deck: DeckController<P>,
    editor: Option<TrackResolver<S>>,
    search: Arc<S>,
    deck_tx: mpsc::Sender<DeckEvent>,
    deck_rx: mpsc::Receiver<DeckEvent>,
    resolver_tx: mpsc::Sender<ResolverEvent>,
    resolver_rx: mpsc::Receiver<ResolverEvent>,
    snapshot_tx: watch::Sender<DeckSnapshot>,
    editor_tx: watch::Sender<Option<EditorView>>,
}

impl<P, S> DeckCore<P, S>
where
    P: PlaybackPort,
    S: SearchService,
{
    pub fn new(config: Config, port: P, search: Arc<S>) -> Self {
        let (deck_tx, deck_rx) = mpsc::channel(64);
        let (resolver_tx, resolver_rx) = mpsc::channel(16);
        let deck = DeckController::new(port, config.deck.clone(), deck_tx.clone());
        let (snapshot_tx, _) = watch::channel(deck.snapshot());
        let (editor_tx, _) = watch::channel(None);

        Self {
            config,
            deck,
            editor: None,
            search,
            deck_tx,
            deck_rx,
            resolver_tx,
            resolver_rx,
            snapshot_tx,
            editor_tx,
        }
    }

    pub fn views(&self) -> CoreViews {
        CoreViews {
            deck: self.snapshot_tx.subscribe(),
            editor: self.editor_tx.subscribe(),
        }
    }

    /// Run until `Quit` arrives or every command sender is gone.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut notices: mpsc::Receiver<PlaybackNotice>,
    ) {
        info!("DeckCore: starting event loop");

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    None => {
                        info!("DeckCore: command channel closed, shutting down");
                        break;
                    }
                    Some(Command::Quit) => {
                        info!("DeckCore: quit requested");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(event) = self.deck_rx.recv() => self.deck.handle_event(event),
                Some(event) = self.resolver_rx.recv() => self.handle_lookup(event),
                Some(notice) = notices.recv() => {
                    debug!("DeckCore: playback notice {:?}", notice);
                    self.deck.handle_notice(notice);
                }
            }
            self.publish();
        }

        // Pause mpv on the way out.
        self.deck.stop();
    }

    pub fn handle_command(&mut self, cmd: Command) {
        info!("DeckCore: command {:?}", cmd);
        match cmd {
            Command::Eject => self.deck.eject(),
            Command::Play => {
                if let Some(attempt) = self.deck.play() {
                    let tx = self.deck_tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(attempt.resolve().await).await;
                    });
                }
            }
            Command::Stop => self.deck.stop(),
            Command::CloseDoor => self.deck.close_door(),
            Command::Slot => {
                if self.deck.slot() == SlotAction::OpenEditor {
                    self.editor = Some(TrackResolver::new(
                        Arc::clone(&self.search),
                        self.config.search.clone(),
                        self.resolver_tx.clone(),
                    ));
                }
            }
            Command::Insert => self.insert(),
            Command::Cancel => {
                if self.editor.take().is_some() {
                    self.deck.cancel_editor();
                }
            }
            Command::Status => {
                // Force every surface to redraw.
                self.snapshot_tx.send_replace(self.deck.snapshot());
                self.editor_tx.send_replace(self.editor_view());
            }
            Command::Quit => {}
            edit => self.edit(edit),
        }
        self.publish();
    }

    fn edit(&mut self, cmd: Command) {
        let Some(editor) = self.editor.as_mut() else {
            debug!("DeckCore: {:?} ignored, editor closed", cmd);
            return;
        };
        match cmd {
            Command::Input { text } => editor.set_input(text),
            Command::Title { text } => editor.set_title(&text),
            Command::Cover { url } => editor.set_cover(&url),
            Command::CoverFailed => editor.cover_failed(),
            Command::Color { idx } => {
                if !editor.select_color(idx) {
                    warn!("DeckCore: no colour at index {}", idx);
                }
            }
            Command::Demo => editor.demo(),
            _ => {}
        }
    }

    fn insert(&mut self) {
        let Some(editor) = self.editor.as_ref() else {
            debug!("DeckCore: insert ignored, editor closed");
            return;
        };
        match editor.commit() {
            Ok(tape) => {
                self.editor = None;
                self.deck.insert(tape);
            }
            Err(e) => warn!("DeckCore: cannot insert yet: {}", e),
        }
    }

    fn handle_lookup(&mut self, event: ResolverEvent) {
        match self.editor.as_mut() {
            Some(editor) => {
                editor.handle_event(event);
            }
            None => debug!("DeckCore: lookup finished after editor closed"),
        }
    }

    fn editor_view(&self) -> Option<EditorView> {
        self.editor.as_ref().map(|editor| EditorView {
            input: editor.input().to_string(),
            link: editor.input_kind() == InputKind::Link,
            searching: editor.is_searching(),
            can_submit: editor.can_submit(),
            candidate: editor.candidate().clone(),
        })
    }

    fn publish(&self) {
        let snapshot = self.deck.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        let view = self.editor_view();
        self.editor_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::FutureExt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tapedeck_core::{PlayFuture, PlaybackError, SearchError, SearchHit};

    #[derive(Clone, Default)]
    struct SharedPort {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl PlaybackPort for SharedPort {
        fn set_source(&mut self, url: &str) {
            self.calls.lock().unwrap().push(format!("source {}", url));
        }

        fn play(&mut self) -> PlayFuture {
            self.calls.lock().unwrap().push("play".into());
            futures_util::future::ready(Ok::<(), PlaybackError>(())).boxed()
        }

        fn pause(&mut self) {
            self.calls.lock().unwrap().push("pause".into());
        }
    }

    struct OneHit;

    #[async_trait]
    impl SearchService for OneHit {
        async fn search(&self, _term: &str) -> Result<Option<SearchHit>, SearchError> {
            Ok(Some(SearchHit {
                track_name: "Windowlicker".into(),
                artist_name: "Aphex Twin".into(),
                artwork_url: None,
                preview_url: Some("https://example.com/preview.m4a".into()),
            }))
        }
    }

    struct Running {
        commands: mpsc::Sender<Command>,
        notices: mpsc::Sender<PlaybackNotice>,
        views: CoreViews,
        port: SharedPort,
        task: tokio::task::JoinHandle<()>,
    }

    fn start() -> Running {
        let port = SharedPort::default();
        let core = DeckCore::new(Config::default(), port.clone(), Arc::new(OneHit));
        let views = core.views();
        let (commands, cmd_rx) = mpsc::channel(16);
        let (notices, notice_rx) = mpsc::channel(16);
        let task = tokio::spawn(core.run(cmd_rx, notice_rx));
        Running {
            commands,
            notices,
            views,
            port,
            task,
        }
    }

    impl Running {
        async fn send(&self, cmd: Command) {
            self.commands.send(cmd).await.unwrap();
            // Let the loop drain everything that is ready.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        fn deck(&self) -> DeckSnapshot {
            self.views.deck.borrow().clone()
        }

        fn editor(&self) -> Option<EditorView> {
            self.views.editor.borrow().clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_make_and_play_a_mixtape() {
        let rt = start();
        rt.send(Command::Eject).await;
        rt.send(Command::Slot).await;
        assert!(rt.deck().editor_open);
        assert!(rt.editor().is_some());

        rt.send(Command::Input {
            text: "https://example.com/Night_Drive.mp3".into(),
        })
        .await;
        let view = rt.editor().unwrap();
        assert!(view.link);
        assert!(!view.can_submit);

        tokio::time::sleep(Duration::from_millis(700)).await;
        let view = rt.editor().unwrap();
        assert!(view.can_submit);
        assert_eq!(view.candidate.title, "Night Drive");

        rt.send(Command::Color { idx: 3 }).await;
        rt.send(Command::Insert).await;
        assert!(rt.editor().is_none());
        let deck = rt.deck();
        assert!(deck.door_open);
        assert_eq!(deck.tape.as_ref().map(|t| t.color()), Some("#22c55e"));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!rt.deck().door_open);

        rt.send(Command::Play).await;
        assert!(rt.deck().playing);
        assert!(rt.deck().controls.play_latched);

        rt.notices.send(PlaybackNotice::Ended).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!rt.deck().playing);

        assert_eq!(
            *rt.port.calls.lock().unwrap(),
            vec!["source https://example.com/Night_Drive.mp3", "play"]
        );

        rt.send(Command::Quit).await;
        assert!(rt.task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_fills_editor() {
        let rt = start();
        rt.send(Command::Eject).await;
        rt.send(Command::Slot).await;
        rt.send(Command::Input {
            text: "windowlicker".into(),
        })
        .await;
        assert!(rt.editor().unwrap().searching);

        tokio::time::sleep(Duration::from_millis(700)).await;
        let view = rt.editor().unwrap();
        assert!(!view.searching);
        assert_eq!(view.candidate.title, "Windowlicker - Aphex Twin");
        assert_eq!(view.candidate.media_url, "https://example.com/preview.m4a");

        rt.send(Command::Insert).await;
        let tape = rt.deck().tape.unwrap();
        assert_eq!(tape.artist(), Some("Aphex Twin"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_editor_commands_need_open_editor() {
        let rt = start();
        rt.send(Command::Title {
            text: "Nope".into(),
        })
        .await;
        rt.send(Command::Insert).await;
        assert!(rt.editor().is_none());
        assert!(rt.deck().tape.is_none());

        rt.send(Command::Eject).await;
        rt.send(Command::Slot).await;
        // Nothing to commit yet: the editor stays open.
        rt.send(Command::Insert).await;
        assert!(rt.editor().is_some());

        rt.send(Command::Cancel).await;
        assert!(rt.editor().is_none());
        assert!(!rt.deck().editor_open);
        assert!(rt.deck().door_open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_commands_channel_stops_loop() {
        let rt = start();
        drop(rt.commands);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(rt.task.is_finished());
    }
}
