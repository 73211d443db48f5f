//! Shared types for the tape deck: the tape record, the deck state, the
//! command vocabulary accepted by every control surface, and configuration.

pub mod config;
pub mod deck;
pub mod platform;
pub mod protocol;
pub mod tape;
