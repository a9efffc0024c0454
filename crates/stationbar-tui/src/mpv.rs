/// mpv-backed audio player.
///
/// ```text
///   MpvPlayer (AudioPlayer, sync, fire-and-forget)
///         │ PlayerCommand
///         ▼
///   player_task ──► MpvHandle::send ──► writer_task ──► socket
///         ▲                                               │
///         └──── MpvEvent ◄──────────── reader_task ◄──────┘
///         │
///         ├── progress stream (once a second while a file is loaded)
///         └── done stream     (end-file: eof → Ok, error → Err)
/// ```
///
/// The player task owns the mpv process.  When the IPC connection goes away
/// the task exits and the done stream closes with it.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use stationbar_core::{AudioPlayer, DoneSignal, PlaybackError};
use stationbar_proto::{platform, PlaybackProgress};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_PAUSE: u64 = 1;
pub const OBS_TIME_POS: u64 = 2;
pub const OBS_DURATION: u64 = 3;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.event_name()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// Done signal for an `end-file` event.  Files replaced by `loadfile` or
    /// stopped on purpose end with reason "stop" and produce nothing.
    pub fn as_done_signal(&self) -> Option<DoneSignal> {
        if self.event_name()? != "end-file" {
            return None;
        }
        match self.raw.get("reason").and_then(Value::as_str) {
            Some("eof") => Some(Ok(())),
            Some("error") => {
                let reason = self
                    .raw
                    .get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Some(Err(PlaybackError(reason.to_string())))
            }
            _ => None,
        }
    }
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(REPLY_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Replace whatever is loaded with `url`, apply the replay gain and
    /// unpause (a skip leaves the player paused).
    pub async fn load_stream(&self, url: &str, gain_db: f64) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url, "replace"])).await?;
        if let Err(e) = self
            .send(json!(["set_property", "volume-gain", gain_db]))
            .await
        {
            warn!("mpv: failed to apply gain {:.2} dB: {}", gain_db, e);
        }
        self.set_pause(false).await
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    pub async fn quit(&self) {
        let _ = self.send(json!(["quit"])).await;
    }

    /// Register observe_property for everything the player task tracks.
    /// Must be called after every fresh connection.
    pub async fn observe_properties(&self) {
        let props = [
            (OBS_PAUSE, "pause"),
            (OBS_TIME_POS, "time-pos"),
            (OBS_DURATION, "duration"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process and the IPC connection to it.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    volume: f32,
}

impl MpvDriver {
    pub fn new(volume: f32) -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
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
        let mpv_binary = platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found (set MPV_PATH or install mpv)"))?;

        let vol_arg = format!(
            "--volume={}",
            (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(platform::mpv_socket_arg())
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
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

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
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                return Ok(start_io_tasks(client, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<S>(stream: S, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let reader = BufReader::new(read_half);

    // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
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
        let _ = tx.send(Err(anyhow::anyhow!("mpv IPC {}", why)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "connection closed").await;
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
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                    debug!("mpv reader: event receiver gone");
                    break;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "read error").await;
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
        // Register reply channel before writing so reader can match it
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

// ── player ────────────────────────────────────────────────────────────────────

enum PlayerCommand {
    Load { url: String, gain_db: f64 },
    Play,
    Pause,
    Shutdown(oneshot::Sender<()>),
}

/// What the player task knows about the loaded file.
#[derive(Debug, Default)]
struct Playback {
    loaded: bool,
    paused: bool,
    elapsed: Duration,
    total: Duration,
}

impl Playback {
    fn apply(&mut self, id: u64, data: &Value) {
        match id {
            OBS_PAUSE => self.paused = data.as_bool().unwrap_or(false),
            OBS_TIME_POS => self.elapsed = secs(data),
            OBS_DURATION => self.total = secs(data),
            _ => {}
        }
    }

    fn progress(&self) -> Option<PlaybackProgress> {
        (self.loaded && !self.paused).then(|| PlaybackProgress::new(self.elapsed, self.total))
    }
}

fn secs(data: &Value) -> Duration {
    data.as_f64()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or_default()
}

/// [`AudioPlayer`] backed by an mpv child process.
pub struct MpvPlayer {
    cmd_tx: mpsc::Sender<PlayerCommand>,
    playing: Arc<AtomicBool>,
    progress_rx: StdMutex<Option<mpsc::Receiver<PlaybackProgress>>>,
    done_rx: StdMutex<Option<mpsc::Receiver<DoneSignal>>>,
}

impl MpvPlayer {
    /// Start mpv and the task that drives it.
    pub async fn spawn(volume: f32) -> anyhow::Result<Self> {
        let mut driver = MpvDriver::new(volume);
        let (event_tx, event_rx) = mpsc::channel(64);
        let handle = driver.spawn_and_connect(event_tx).await?;
        handle.observe_properties().await;
        Ok(Self::start(handle, event_rx, Some(driver)))
    }

    fn start(handle: MpvHandle, event_rx: mpsc::Receiver<MpvEvent>, driver: Option<MpvDriver>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (progress_tx, progress_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);
        let playing = Arc::new(AtomicBool::new(false));

        tokio::spawn(player_task(PlayerTask {
            handle,
            driver,
            cmd_rx,
            event_rx,
            progress_tx,
            done_tx,
            playing: playing.clone(),
        }));

        Self {
            cmd_tx,
            playing,
            progress_rx: StdMutex::new(Some(progress_rx)),
            done_rx: StdMutex::new(Some(done_rx)),
        }
    }

    /// Stop playback and terminate mpv.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(PlayerCommand::Shutdown(tx)).await.is_ok() {
            let _ = tokio::time::timeout(REPLY_TIMEOUT, rx).await;
        }
    }

    fn command(&self, cmd: PlayerCommand) {
        if let Err(e) = self.cmd_tx.try_send(cmd) {
            warn!("mpv: dropping player command: {}", e);
        }
    }
}

impl AudioPlayer for MpvPlayer {
    fn update_stream(&self, url: &str, gain_db: f64) {
        self.command(PlayerCommand::Load {
            url: url.to_string(),
            gain_db,
        });
    }

    fn play(&self) {
        self.command(PlayerCommand::Play);
    }

    fn pause(&self) {
        self.command(PlayerCommand::Pause);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn take_progress_stream(&self) -> Option<mpsc::Receiver<PlaybackProgress>> {
        self.progress_rx.lock().ok()?.take()
    }

    fn take_done_stream(&self) -> Option<mpsc::Receiver<DoneSignal>> {
        self.done_rx.lock().ok()?.take()
    }
}

impl std::fmt::Debug for PlayerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerCommand::Load { url, gain_db } => write!(f, "Load({}, {:.2} dB)", url, gain_db),
            PlayerCommand::Play => f.write_str("Play"),
            PlayerCommand::Pause => f.write_str("Pause"),
            PlayerCommand::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

struct PlayerTask {
    handle: MpvHandle,
    driver: Option<MpvDriver>,
    cmd_rx: mpsc::Receiver<PlayerCommand>,
    event_rx: mpsc::Receiver<MpvEvent>,
    progress_tx: mpsc::Sender<PlaybackProgress>,
    done_tx: mpsc::Sender<DoneSignal>,
    playing: Arc<AtomicBool>,
}

async fn player_task(mut task: PlayerTask) {
    let mut playback = Playback::default();
    let mut tick = tokio::time::interval(PROGRESS_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            cmd = task.cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                debug!("mpv player: {:?}", cmd);
                let result = match cmd {
                    PlayerCommand::Load { url, gain_db } => {
                        playback = Playback { loaded: true, ..Playback::default() };
                        task.handle.load_stream(&url, gain_db).await
                    }
                    PlayerCommand::Play => task.handle.set_pause(false).await,
                    PlayerCommand::Pause => task.handle.set_pause(true).await,
                    PlayerCommand::Shutdown(ack) => {
                        task.handle.quit().await;
                        let _ = ack.send(());
                        break;
                    }
                };
                if let Err(e) = result {
                    warn!("mpv player: command failed: {}", e);
                }
            }
            event = task.event_rx.recv() => {
                let Some(event) = event else {
                    error!("mpv player: IPC connection lost");
                    break;
                };
                if let Some((id, data)) = event.as_property_change() {
                    playback.apply(id, data);
                    task.playing.store(playback.loaded && !playback.paused, Ordering::SeqCst);
                } else if let Some(done) = event.as_done_signal() {
                    playback.loaded = false;
                    task.playing.store(false, Ordering::SeqCst);
                    if task.done_tx.send(done).await.is_err() {
                        debug!("mpv player: done receiver gone");
                    }
                }
            }
            _ = tick.tick() => {
                if let Some(progress) = playback.progress() {
                    // Lossy: a slow observer just misses a tick.
                    let _ = task.progress_tx.try_send(progress);
                }
            }
        }
    }

    task.playing.store(false, Ordering::SeqCst);
    if let Some(mut driver) = task.driver.take() {
        driver.kill().await;
    }
    info!("mpv player: stopped");
}
