/// mpv IPC driver and the playback port built on it.
///
/// Architecture:
///
/// ```text
///   MpvDriver::spawn_and_connect()
///         │
///         ├── writer_task   ← receives PendingRequest via mpsc, writes → socket
///         └── reader_task   ← reads JSON lines from socket
///                                ├── response (has request_id) → matched oneshot::Sender
///                                └── event                     → event_tx channel
///
///   MpvPlayback (PlaybackPort)
///         set_source → remembered
///         play       → enqueue loadfile (if the source changed) + pause=false
///         pause      → enqueue pause=true
/// ```
///
/// Commands are enqueued synchronously so the order the deck issues them in
/// is the order mpv receives them; only the replies are awaited.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use futures_util::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tapedeck_core::{PlayFuture, PlaybackError, PlaybackNotice, PlaybackPort};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const REPLY_TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(5);

type Reply = oneshot::Receiver<anyhow::Result<Value>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// What this event means for the deck, if anything. Only `end-file`
    /// matters: `eof` is the tape running out, `error` a jam. Other reasons
    /// (`stop`, `quit`, `redirect`) follow our own commands.
    pub fn notice(&self) -> Option<PlaybackNotice> {
        if self.event_name()? != "end-file" {
            return None;
        }
        match self.raw.get("reason")?.as_str()? {
            "eof" => Some(PlaybackNotice::Ended),
            "error" => Some(PlaybackNotice::Failed),
            _ => None,
        }
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    /// Queue `command` for the writer without waiting. The returned receiver
    /// yields mpv's reply.
    pub fn enqueue(&self, command: Value) -> anyhow::Result<Reply> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .try_send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .map_err(|e| anyhow::anyhow!("mpv writer unavailable: {}", e))?;
        Ok(reply_rx)
    }
}

async fn await_reply(reply: Reply) -> anyhow::Result<Value> {
    tokio::time::timeout(REPLY_TIMEOUT, reply)
        .await
        .map_err(|_| anyhow::anyhow!("mpv IPC timeout"))?
        .map_err(|_| anyhow::anyhow!("mpv reply channel dropped"))?
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    volume: f32,
}

impl MpvDriver {
    pub fn new(volume: f32) -> Self {
        Self {
            socket_name: tapedeck_proto::platform::mpv_socket_name(),
            process: None,
            volume,
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        info!("mpv: spawning new process");
        let mpv_binary = tapedeck_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let vol_arg = format!(
            "--volume={}",
            (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(tapedeck_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        self.spawn_process()?;

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(start_io_tasks(stream, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                return Ok(start_io_tasks(client, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

/// Split `stream` into reader and writer tasks and return the handle that
/// feeds the writer.
fn start_io_tasks<S>(stream: S, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let reader = BufReader::new(read_half);

    // req_id → reply channel. The writer inserts, the reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_pending(pending: &PendingMap, why: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", why)));
    }
}

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"]
                                .as_str()
                                .unwrap_or("unknown error")
                                .to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can always match the reply.
        pending.lock().await.insert(req.req_id, req.reply);

        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── playback port ─────────────────────────────────────────────────────────────

/// [`PlaybackPort`] backed by an mpv process.
pub struct MpvPlayback {
    handle: MpvHandle,
    source: Option<String>,
    /// Url mpv currently has loaded.
    loaded: Option<String>,
    /// Set once mpv unloads the file on its own (end of file, load error).
    unloaded: Arc<AtomicBool>,
}

impl MpvPlayback {
    pub fn new(handle: MpvHandle) -> Self {
        Self {
            handle,
            source: None,
            loaded: None,
            unloaded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Translate raw mpv events into deck notices until either side closes.
    pub fn forward_notices(
        &self,
        mut events: mpsc::Receiver<MpvEvent>,
        notices: mpsc::Sender<PlaybackNotice>,
    ) -> tokio::task::JoinHandle<()> {
        let unloaded = Arc::clone(&self.unloaded);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(notice) = event.notice() else {
                    continue;
                };
                info!("mpv: end-file → {:?}", notice);
                // mpv is idle again; the next play has to reload.
                unloaded.store(true, Ordering::Release);
                if notices.send(notice).await.is_err() {
                    break;
                }
            }
            debug!("mpv: notice forwarder exiting");
        })
    }

    fn enqueue_all(&mut self, source: String) -> Result<Vec<Reply>, PlaybackError> {
        let unavailable = |e: anyhow::Error| PlaybackError::Unavailable(e.to_string());
        let mut replies = Vec::with_capacity(2);

        if self.loaded.as_deref() != Some(source.as_str()) {
            replies.push(self.handle.enqueue(json!(["loadfile", &source])).map_err(unavailable)?);
            self.loaded = Some(source);
        }
        replies.push(
            self.handle
                .enqueue(json!(["set_property", "pause", false]))
                .map_err(unavailable)?,
        );
        Ok(replies)
    }
}

impl PlaybackPort for MpvPlayback {
    fn set_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
    }

    fn play(&mut self) -> PlayFuture {
        if self.unloaded.swap(false, Ordering::AcqRel) {
            self.loaded = None;
        }
        let Some(source) = self.source.clone() else {
            return futures_util::future::ready(Err(PlaybackError::NoSource)).boxed();
        };

        match self.enqueue_all(source) {
            Ok(replies) => async move {
                for reply in replies {
                    await_reply(reply)
                        .await
                        .map_err(|e| PlaybackError::Rejected(e.to_string()))?;
                }
                Ok(())
            }
            .boxed(),
            Err(e) => {
                // Whatever was queued may not have reached mpv.
                self.loaded = None;
                futures_util::future::ready(Err(e)).boxed()
            }
        }
    }

    fn pause(&mut self) {
        if let Err(e) = self.handle.enqueue(json!(["set_property", "pause", true])) {
            warn!("mpv: pause not sent: {}", e);
        }
    }
}
