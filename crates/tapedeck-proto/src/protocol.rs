use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Everything a control surface (console, HTTP) can ask of the deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    // ── Transport ────────────────────────────────────────────────────────────
    Eject,
    Play,
    Stop,
    /// Click on the cassette slot while the door is open.
    Slot,
    /// Click on the open door.
    CloseDoor,

    // ── Mixtape editor ───────────────────────────────────────────────────────
    Input { text: String },
    Title { text: String },
    Cover { url: String },
    CoverFailed,
    /// Palette index, zero based.
    Color { idx: usize },
    Demo,
    Insert,
    Cancel,

    // ── System ───────────────────────────────────────────────────────────────
    Status,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0}")]
pub struct ParseCommandError(pub String);

impl FromStr for Command {
    type Err = ParseCommandError;

    /// Parses a console line. JSON objects are decoded as-is; otherwise the
    /// first word selects the command and the rest of the line is its argument.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.starts_with('{') {
            return serde_json::from_str(line).map_err(|e| ParseCommandError(e.to_string()));
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };

        let cmd = match word.to_ascii_lowercase().as_str() {
            "eject" | "e" => Command::Eject,
            "play" | "p" => Command::Play,
            "stop" | "s" => Command::Stop,
            "slot" => Command::Slot,
            "door" => Command::CloseDoor,
            "type" | "search" => Command::Input {
                text: rest.to_string(),
            },
            "title" => Command::Title {
                text: rest.to_string(),
            },
            "cover" => Command::Cover {
                url: rest.to_string(),
            },
            "cover-failed" => Command::CoverFailed,
            "color" => {
                // Console colours are one based.
                let n: usize = rest
                    .parse()
                    .map_err(|_| ParseCommandError(line.to_string()))?;
                if n == 0 {
                    return Err(ParseCommandError(line.to_string()));
                }
                Command::Color { idx: n - 1 }
            }
            "demo" => Command::Demo,
            "insert" => Command::Insert,
            "cancel" => Command::Cancel,
            "status" => Command::Status,
            "quit" | "q" | "exit" => Command::Quit,
            _ => return Err(ParseCommandError(line.to_string())),
        };
        Ok(cmd)
    }
}
