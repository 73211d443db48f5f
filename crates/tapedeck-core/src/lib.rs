//! Interaction logic of the cassette deck.
//!
//! [`DeckController`] owns the mechanical state (door, tape, transport) and
//! drives a [`PlaybackPort`]. [`TrackResolver`] turns free-form editor input
//! into a playable [`Candidate`], consulting a [`SearchService`] for queries.
//! Neither component touches the other's state; a single event loop feeds
//! both from command, timer, playback and search channels.

pub mod deck;
pub mod playback;
pub mod resolver;
pub mod search;
pub mod timer;

pub use deck::{DeckController, DeckEvent, PlayAttempt, SlotAction};
pub use playback::{PlayFuture, PlaybackError, PlaybackNotice, PlaybackPort};
pub use resolver::{Candidate, InputKind, LookupPurpose, ResolverEvent, TrackResolver};
pub use search::{ItunesSearch, SearchError, SearchHit, SearchService};
pub use timer::{schedule_after, TimerHandle, TimerSlot};
