//! Seam between the watch session and the OS change notifier.
//!
//! [`ChangeNotifier`] builds one handle per session; the handle pushes
//! [`ChangeEvent`]s into an [`EventSink`] from whatever thread the backend
//! uses. [`NotifyBackend`] is the production implementation on top of
//! `notify`'s recommended watcher.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::CreateKind;
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher,
    RecursiveMode, Watcher,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::error::{MonitorError, Result};

/// Flags the dispatcher cares about for one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    pub created: bool,
    pub is_file: bool,
    /// The backend lost track of the subtree and a rescan would be needed.
    pub must_rescan: bool,
}

impl ChangeFlags {
    pub const CREATED_FILE: ChangeFlags = ChangeFlags {
        created: true,
        is_file: true,
        must_rescan: false,
    };
}

/// One path reported by the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub flags: ChangeFlags,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, flags: ChangeFlags) -> Self {
        Self {
            path: path.into(),
            flags,
        }
    }

    /// A plain file creation.
    pub fn created_file(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeFlags::CREATED_FILE)
    }
}

pub(crate) enum WatchMessage {
    Event(ChangeEvent),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("path", &event.path)
                .field("flags", &event.flags)
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// Where a notifier handle delivers raw events. Never blocks the caller; a
/// full queue drops the event with a warning.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<WatchMessage>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<WatchMessage>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: ChangeEvent) {
        self.deliver(WatchMessage::Event(event));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.deliver(WatchMessage::Error(message.into()));
    }

    fn deliver(&self, message: WatchMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(?message, "watch queue full, dropping notification");
            }
            // The session was invalidated; nothing is listening anymore.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Factory for notifier handles.
pub trait ChangeNotifier: Send + Sync {
    /// Builds a handle over `folders` that reports into `sink` once started.
    fn subscribe(
        &self,
        folders: &[PathBuf],
        sink: EventSink,
    ) -> Result<Box<dyn NotifierHandle>>;
}

/// A live subscription. Dropping it releases the OS resources.
pub trait NotifierHandle: Send {
    fn start(&mut self) -> Result<()>;

    /// Must be safe to call repeatedly.
    fn stop(&mut self);
}

/// `notify`-based notifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyBackend;

impl ChangeNotifier for NotifyBackend {
    fn subscribe(
        &self,
        folders: &[PathBuf],
        sink: EventSink,
    ) -> Result<Box<dyn NotifierHandle>> {
        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for change in convert_event(&event) {
                        sink.send(change);
                    }
                }
                Err(err) => sink.error(err.to_string()),
            },
            NotifyConfig::default(),
        )
        .map_err(|err| MonitorError::SessionCreate(err.to_string()))?;

        Ok(Box::new(NotifyHandle {
            watcher,
            folders: folders.to_vec(),
            watching: Vec::new(),
        }))
    }
}

struct NotifyHandle {
    watcher: RecommendedWatcher,
    folders: Vec<PathBuf>,
    watching: Vec<PathBuf>,
}

impl NotifierHandle for NotifyHandle {
    fn start(&mut self) -> Result<()> {
        for folder in &self.folders {
            if self.watching.contains(folder) {
                continue;
            }
            if let Err(err) =
                self.watcher.watch(folder, RecursiveMode::Recursive)
            {
                let path = folder.clone();
                self.stop();
                return Err(MonitorError::SessionStart {
                    path,
                    reason: err.to_string(),
                });
            }
            self.watching.push(folder.clone());
        }
        Ok(())
    }

    fn stop(&mut self) {
        for folder in self.watching.drain(..) {
            if let Err(err) = self.watcher.unwatch(&folder) {
                warn!(path = %folder.display(), "failed to unwatch: {err}");
            }
        }
    }
}

/// Flattens a `notify` event into one [`ChangeEvent`] per path.
pub fn convert_event(event: &Event) -> Vec<ChangeEvent> {
    let created = matches!(event.kind, EventKind::Create(_));
    let must_rescan = event.need_rescan();

    event
        .paths
        .iter()
        .map(|path| {
            let is_file = match event.kind {
                EventKind::Create(CreateKind::File) => true,
                EventKind::Create(CreateKind::Folder) => false,
                _ => path_is_file(path),
            };
            ChangeEvent::new(
                path.clone(),
                ChangeFlags {
                    created,
                    is_file,
                    must_rescan,
                },
            )
        })
        .collect()
}

fn path_is_file(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|meta| meta.file_type().is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    use notify::event::{Flag, ModifyKind};

    #[test]
    fn create_file_sets_both_flags() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tmp/watch/a.txt"));
        let changes = convert_event(&event);
        assert_eq!(changes, vec![ChangeEvent::created_file("/tmp/watch/a.txt")]);
    }

    #[test]
    fn folder_creation_is_not_a_file() {
        let event = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/tmp/watch/sub"));
        let changes = convert_event(&event);
        assert!(changes[0].flags.created);
        assert!(!changes[0].flags.is_file);
    }

    #[test]
    fn modify_is_not_created() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/watch/a.txt"));
        assert!(!convert_event(&event)[0].flags.created);
    }

    #[test]
    fn rescan_flag_is_carried() {
        let event = Event::new(EventKind::Other)
            .add_path(PathBuf::from("/tmp/watch"))
            .set_flag(Flag::Rescan);
        let changes = convert_event(&event);
        assert!(changes[0].flags.must_rescan);
        assert!(!changes[0].flags.created);
    }

    #[tokio::test]
    async fn sink_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);
        sink.send(ChangeEvent::created_file("/a.txt"));
        sink.send(ChangeEvent::created_file("/b.txt"));
        drop(sink);

        let mut received = Vec::new();
        while let Some(WatchMessage::Event(event)) = rx.recv().await {
            received.push(event.path);
        }
        assert_eq!(received, vec![PathBuf::from("/a.txt")]);
    }
}
