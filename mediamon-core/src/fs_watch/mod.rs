//! Watch sessions: one notifier handle plus the loop that batches its events.
//!
//! A session is created over a fixed folder list and is never edited in
//! place. Folder changes invalidate the current session and build a new one.
//! Raw notifications are queued on a bounded channel and coalesced into
//! batches; a batch is handed to the [`BatchHandler`] once no new event has
//! arrived for the configured latency, or once `max_batch_events` are queued.
//! The loop awaits the handler before reading further, so batches never
//! overlap. Stopping a session asks its loop to flush whatever it already
//! holds and exit; it is never aborted mid-batch.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use crate::error::{MonitorError, Result};

pub mod notifier;

pub use notifier::{
    ChangeEvent, ChangeFlags, ChangeNotifier, EventSink, NotifierHandle,
    NotifyBackend,
};
use notifier::WatchMessage;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

/// Upper bound for [`WatchConfig::max_batch_events`]; larger values are
/// clamped.
pub const MAX_BATCH_EVENTS: usize = 65_536;

/// Queued notifications per session, for a given batch size.
fn queue_capacity(max_batch_events: usize) -> usize {
    max_batch_events.clamp(64, MAX_BATCH_EVENTS).saturating_mul(4)
}

/// Batching knobs for a watch session.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Quiet period after the last notification before a batch is delivered.
    pub latency: Duration,
    /// Maximum number of notifications bundled into one batch.
    pub max_batch_events: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_secs(3),
            max_batch_events: 1024,
        }
    }
}

/// Receives each delivered batch.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(&self, batch: Vec<ChangeEvent>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
    Invalidated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Stopped => "stopped",
            SessionState::Running => "running",
            SessionState::Invalidated => "invalidated",
        };
        f.write_str(label)
    }
}

/// Owns exactly one notifier handle over a fixed folder list.
pub struct WatchSession {
    id: u64,
    state: SessionState,
    folders: Vec<PathBuf>,
    handle: Option<Box<dyn NotifierHandle>>,
    rx: Arc<Mutex<mpsc::Receiver<WatchMessage>>>,
    handler: Weak<dyn BatchHandler>,
    config: WatchConfig,
    batch_loop: Option<BatchLoop>,
}

struct BatchLoop {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("folders", &self.folders)
            .field("config", &self.config)
            .field("loop_active", &self.batch_loop.is_some())
            .finish()
    }
}

impl WatchSession {
    /// Builds a stopped session. Fails if the notifier refuses a handle.
    pub fn create(
        notifier: &dyn ChangeNotifier,
        folders: &[PathBuf],
        handler: Weak<dyn BatchHandler>,
        config: WatchConfig,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel(queue_capacity(config.max_batch_events));
        let handle = notifier.subscribe(folders, EventSink::new(tx))?;

        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        info!(session = id, folders = folders.len(), "created watch session");

        Ok(Self {
            id,
            state: SessionState::Stopped,
            folders: folders.to_vec(),
            handle: Some(handle),
            rx: Arc::new(Mutex::new(rx)),
            handler,
            config,
            batch_loop: None,
        })
    }

    /// Attaches the handle and spawns the batching loop. Must be called from
    /// within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Running => return Ok(()),
            SessionState::Invalidated => {
                return Err(MonitorError::Internal(format!(
                    "watch session {} was invalidated",
                    self.id
                )));
            }
            SessionState::Stopped => {}
        }

        let handle = self.handle.as_mut().ok_or_else(|| {
            MonitorError::Internal("watch session lost its handle".into())
        })?;
        handle.start()?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = spawn_batch_loop(
            self.id,
            Arc::clone(&self.rx),
            shutdown_rx,
            self.handler.clone(),
            self.config.clone(),
        );
        self.batch_loop = Some(BatchLoop { shutdown, task });
        self.state = SessionState::Running;
        info!(session = self.id, "watch session running");
        Ok(())
    }

    /// Detaches the handle and tells the batching loop to flush and exit.
    /// No-op unless running.
    pub fn stop(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.stop();
        }
        if let Some(batch_loop) = self.batch_loop.take() {
            // The loop may already be gone if its handler was dropped.
            let _ = batch_loop.shutdown.send(());
            drop(batch_loop.task);
        }
        self.state = SessionState::Stopped;
        info!(session = self.id, "watch session stopped");
    }

    /// Stops and releases the handle. The session cannot be restarted.
    pub fn invalidate(&mut self) {
        if self.state == SessionState::Invalidated {
            return;
        }
        self.stop();
        self.handle = None;
        self.state = SessionState::Invalidated;
        debug!(session = self.id, "watch session invalidated");
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.invalidate();
    }
}

fn spawn_batch_loop(
    session: u64,
    rx: Arc<Mutex<mpsc::Receiver<WatchMessage>>>,
    mut shutdown: oneshot::Receiver<()>,
    handler: Weak<dyn BatchHandler>,
    config: WatchConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = rx.lock().await;
        let mut pending: Vec<ChangeEvent> = Vec::new();

        loop {
            let msg = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                msg = next_message(&mut rx, &pending, config.latency) => msg,
            };

            let msg = match msg {
                Some(msg) => msg,
                None if pending.is_empty() => break,
                // Latency elapsed with no new notification.
                None => {
                    if !deliver(session, &handler, &mut pending).await {
                        return;
                    }
                    continue;
                }
            };

            match msg {
                WatchMessage::Event(event) => {
                    pending.push(event);
                    if pending.len() >= config.max_batch_events
                        && !deliver(session, &handler, &mut pending).await
                    {
                        return;
                    }
                }
                WatchMessage::Error(error) => {
                    warn!(session, "notifier error: {error}");
                }
            }
        }

        // Hand over everything already received before exiting.
        while let Ok(msg) = rx.try_recv() {
            if let WatchMessage::Event(event) = msg {
                pending.push(event);
            }
        }
        if !pending.is_empty() {
            debug!(session, events = pending.len(), "flushing on shutdown");
        }
        deliver(session, &handler, &mut pending).await;
    })
}

/// Waits for the next notification. With events pending, gives up after
/// `latency` and returns `None`; otherwise `None` means the channel closed.
async fn next_message(
    rx: &mut mpsc::Receiver<WatchMessage>,
    pending: &[ChangeEvent],
    latency: Duration,
) -> Option<WatchMessage> {
    if pending.is_empty() {
        return rx.recv().await;
    }
    timeout(latency, rx.recv()).await.ok().flatten()
}

/// Hands the pending batch to the handler. Returns `false` once the handler
/// is gone and the loop should exit.
async fn deliver(
    session: u64,
    handler: &Weak<dyn BatchHandler>,
    pending: &mut Vec<ChangeEvent>,
) -> bool {
    if pending.is_empty() {
        return true;
    }
    let batch = std::mem::take(pending);
    let Some(handler) = handler.upgrade() else {
        return false;
    };
    debug!(session, events = batch.len(), "delivering batch");
    handler.handle_batch(batch).await;
    true
}
