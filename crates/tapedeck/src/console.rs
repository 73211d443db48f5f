/// Line-oriented control surface on stdin/stdout.
use tapedeck_proto::protocol::Command;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::{CoreViews, EditorView};

pub const HELP: &str = "\
commands: eject | play | stop | slot | door | status | quit
editor:   type <url or search> | title <text> | cover <url> | cover-failed
          color <1-8> | demo | insert | cancel";

/// Forward stdin lines to the core until EOF or `quit`.
pub fn spawn_input(commands: mpsc::Sender<Command>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            if matches!(line.trim(), "help" | "?") {
                println!("{}", HELP);
                continue;
            }
            match line.parse::<Command>() {
                Ok(cmd) => {
                    let quit = cmd == Command::Quit;
                    if commands.send(cmd).await.is_err() || quit {
                        break;
                    }
                }
                Err(e) => println!("{}  (try `help`)", e),
            }
        }
        info!("console: input closed");
    })
}

/// Print every published change until the core goes away.
pub fn spawn_output(mut views: CoreViews) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        println!("{}", views.deck.borrow_and_update().clone());
        loop {
            tokio::select! {
                changed = views.deck.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!("{}", views.deck.borrow_and_update().clone());
                }
                changed = views.editor.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(view) = views.editor.borrow_and_update().clone() {
                        println!("{}", render_editor(&view));
                    }
                }
            }
        }
        debug!("console: output closed");
    })
}

pub fn render_editor(view: &EditorView) -> String {
    let c = &view.candidate;
    let kind = if view.link { "link" } else { "search" };
    let mut out = format!("  editor [{}] {:?}", kind, view.input);
    if view.searching {
        out.push_str(" (searching…)");
    }
    out.push_str(&format!(
        "\n    title: {}\n    url:   {}\n    label: {}",
        blank_or(&c.title),
        blank_or(&c.media_url),
        if c.cover_url.is_empty() {
            c.color.clone()
        } else {
            c.cover_url.clone()
        }
    ));
    if let Some(artist) = &c.artist {
        out.push_str(&format!("\n    artist: {}", artist));
    }
    if view.can_submit {
        out.push_str("\n    ready: `insert` to load the tape");
    }
    out
}

fn blank_or(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}
