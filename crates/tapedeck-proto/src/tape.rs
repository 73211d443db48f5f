use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label colours offered by the mixtape editor.
pub const PALETTE: [&str; 8] = [
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#3b82f6", "#8b5cf6", "#ec4899", "#64748b",
];

/// Palette index selected when the editor opens.
pub const DEFAULT_COLOR_IDX: usize = 4;

pub fn default_color() -> String {
    PALETTE[DEFAULT_COLOR_IDX].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TapeError {
    #[error("tape has no media url")]
    MissingUrl,
    #[error("tape has no title")]
    MissingTitle,
}

/// A committed, playable cassette. Only constructible with a non-empty url
/// and title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTape")]
pub struct Tape {
    url: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    artist: Option<String>,
    color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover: Option<String>,
}

impl Tape {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<Self, TapeError> {
        let url = url.into();
        let title = title.into();
        if url.trim().is_empty() {
            return Err(TapeError::MissingUrl);
        }
        if title.trim().is_empty() {
            return Err(TapeError::MissingTitle);
        }
        Ok(Self {
            url,
            title,
            artist: None,
            color: color.into(),
            cover: None,
        })
    }

    /// Attach an artist; empty strings are treated as absent.
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = non_empty(artist.into());
        self
    }

    /// Attach a cover image; empty strings are treated as absent.
    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = non_empty(cover.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn cover(&self) -> Option<&str> {
        self.cover.as_deref()
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Deserialization shadow so wire input goes through `Tape::new`.
#[derive(Deserialize)]
struct RawTape {
    url: String,
    title: String,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default = "default_color")]
    color: String,
    #[serde(default)]
    cover: Option<String>,
}

impl TryFrom<RawTape> for Tape {
    type Error = TapeError;

    fn try_from(raw: RawTape) -> Result<Self, Self::Error> {
        let mut tape = Tape::new(raw.url, raw.title, raw.color)?;
        if let Some(artist) = raw.artist {
            tape = tape.with_artist(artist);
        }
        if let Some(cover) = raw.cover {
            tape = tape.with_cover(cover);
        }
        Ok(tape)
    }
}
