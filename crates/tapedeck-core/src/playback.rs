//! Playback Port: the deck's view of whatever actually makes sound.

use futures_util::future::BoxFuture;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no source loaded")]
    NoSource,
    #[error("playback rejected: {0}")]
    Rejected(String),
    #[error("playback backend unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a play request, resolved some time after the request.
pub type PlayFuture = BoxFuture<'static, Result<(), PlaybackError>>;

/// Capability to play one media url at a time.
///
/// Implementations must perform every side effect of `play` before returning;
/// the returned future only reports how it went. That keeps a later `pause`
/// ordered after the play it is meant to cancel.
pub trait PlaybackPort: Send {
    /// Point the player at `url`. Called before `play` whenever the source
    /// changed.
    fn set_source(&mut self, url: &str);

    fn play(&mut self) -> PlayFuture;

    fn pause(&mut self);
}

/// Unsolicited notifications a port delivers after playback started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackNotice {
    /// The media ran to its natural end.
    Ended,
    /// Loading or decoding failed.
    Failed,
}
