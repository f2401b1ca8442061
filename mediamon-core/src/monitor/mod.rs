//! The coordinator that owns folders, filters, the processed ledger and the
//! current watch session.
//!
//! Every public operation takes the monitor's exclusive lock, and so does
//! the batch callback for the whole time it is processing a batch.
//! Configuration changes rebuild the watch session while holding that lock,
//! which briefly holds back event delivery.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::filter::{Filter, FilterSet};
use crate::folders::FolderSet;
use crate::fs_watch::{
    BatchHandler, ChangeEvent, ChangeNotifier, NotifyBackend, SessionState,
    WatchConfig, WatchSession,
};
use crate::processed::ProcessedSet;
use crate::runner::{CommandRunner, ShellRunner};

mod dispatch;

pub use dispatch::{DispatchReport, DispatchStats};

#[derive(Debug, Default)]
struct MonitorState {
    folders: FolderSet,
    filters: FilterSet,
    processed: ProcessedSet,
    session: Option<WatchSession>,
    running: bool,
    stats: DispatchStats,
}

struct Shared {
    state: Mutex<MonitorState>,
    notifier: Arc<dyn ChangeNotifier>,
    runner: Arc<dyn CommandRunner>,
    config: WatchConfig,
}

/// Identity and state of the monitor's current watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: u64,
    pub state: SessionState,
}

/// Watches folders and runs matching programs on newly created files.
///
/// Monitors are independent: each owns its collections and session.
pub struct Monitor {
    shared: Arc<Shared>,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Monitor");
        debug.field("config", &self.shared.config);
        match self.shared.state.try_lock() {
            Ok(state) => {
                debug
                    .field("folders", &state.folders.len())
                    .field("filters", &state.filters.len())
                    .field("processed", &state.processed.len())
                    .field("running", &state.running);
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::init()
    }
}

impl Monitor {
    /// A monitor backed by `notify` and `/bin/sh`, with default batching.
    pub fn init() -> Self {
        Self::with_parts(
            WatchConfig::default(),
            Arc::new(NotifyBackend),
            Arc::new(ShellRunner::default()),
        )
    }

    pub fn with_parts(
        config: WatchConfig,
        notifier: Arc<dyn ChangeNotifier>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MonitorState::default()),
                notifier,
                runner,
                config,
            }),
        }
    }

    /// Stops and invalidates the session, then releases all collections.
    pub async fn free(self) {
        let mut state = self.shared.state.lock().await;
        state.running = false;
        if let Some(mut session) = state.session.take() {
            session.invalidate();
        }
        *state = MonitorState::default();
        info!("monitor released");
    }

    /// Starts watching. With no folders yet, the session is created as soon
    /// as the first folder is added.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.running {
            return Ok(());
        }
        if state.folders.is_empty() {
            info!("no folders to watch yet; waiting for folders");
            state.running = true;
            return Ok(());
        }

        let session_usable = state
            .session
            .as_ref()
            .is_some_and(|s| s.state() != SessionState::Invalidated);
        if !session_usable {
            state.session = Some(self.create_session(&state.folders)?);
        }
        if let Some(session) = state.session.as_mut() {
            session.start()?;
        }
        state.running = true;
        info!("monitor started");
        Ok(())
    }

    /// Stops event delivery but keeps the session for a later `start`.
    pub async fn pause(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if !state.running {
            return Ok(());
        }
        if let Some(session) = state.session.as_mut() {
            session.stop();
        }
        state.running = false;
        info!("monitor paused");
        Ok(())
    }

    /// Stops event delivery and invalidates the session.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if let Some(mut session) = state.session.take() {
            session.invalidate();
        }
        if state.running {
            info!("monitor stopped");
        }
        state.running = false;
        Ok(())
    }

    pub async fn add_folders<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.folders.add(paths)? > 0 {
            self.rebuild(&mut state)?;
        }
        Ok(())
    }

    pub async fn remove_folders<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.folders.remove(paths)? > 0 {
            self.rebuild(&mut state)?;
        }
        Ok(())
    }

    /// Replaces the folder at `index`; an out-of-range index is an error.
    pub async fn change_folder(
        &self,
        index: usize,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.folders.change(index, path.as_ref())? {
            self.rebuild(&mut state)?;
        }
        Ok(())
    }

    /// Registers `program` for `extensions`. The filter is not validated;
    /// see [`Filter::is_valid`].
    pub async fn add_filter<I, S>(
        &self,
        program: &str,
        extensions: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_filters(vec![Filter::new(program, extensions)]).await
    }

    pub async fn add_filters(&self, filters: Vec<Filter>) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        let mut changed = false;
        for filter in filters {
            changed |= state.filters.add(filter);
        }
        if changed {
            self.rebuild(&mut state)?;
        }
        Ok(())
    }

    pub async fn remove_filter(&self, program: &str) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.filters.remove(program).is_some() {
            self.rebuild(&mut state)?;
        }
        Ok(())
    }

    /// Replaces the filter at `index`; an out-of-range index is an error.
    pub async fn change_filter(
        &self,
        index: usize,
        filter: Filter,
    ) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        state.filters.change(index, filter)?;
        self.rebuild(&mut state)
    }

    pub async fn get_folders(&self) -> Vec<PathBuf> {
        self.shared.state.lock().await.folders.as_slice().to_vec()
    }

    pub async fn get_filters(&self) -> Vec<Filter> {
        self.shared.state.lock().await.filters.as_slice().to_vec()
    }

    pub async fn get_processed_files(&self) -> Vec<PathBuf> {
        let state = self.shared.state.lock().await;
        state.processed.iter().cloned().collect()
    }

    /// Whether `filename` would be dispatched if it showed up now: not yet
    /// processed and accepted by at least one filter.
    pub async fn filter_file(&self, filename: impl AsRef<Path>) -> bool {
        let filename = filename.as_ref();
        let state = self.shared.state.lock().await;
        !state.processed.contains(filename)
            && state.filters.matches_any(filename)
    }

    /// Processes `batch` exactly as if the notifier had delivered it.
    pub async fn dispatch(&self, batch: Vec<ChangeEvent>) -> DispatchReport {
        self.shared.dispatch(batch).await
    }

    pub async fn is_running(&self) -> bool {
        self.shared.state.lock().await.running
    }

    pub async fn session(&self) -> Option<SessionSnapshot> {
        let state = self.shared.state.lock().await;
        state.session.as_ref().map(|session| SessionSnapshot {
            id: session.id(),
            state: session.state(),
        })
    }

    pub async fn stats(&self) -> DispatchStats {
        self.shared.state.lock().await.stats
    }

    /// Human-readable summary of the configuration and counters.
    pub async fn print_status(&self) -> String {
        let state = self.shared.state.lock().await;
        let status = if state.running { "running" } else { "paused" };

        let mut lines = vec![format!("Monitor: {status}")];
        lines.push("Watching folders:".to_string());
        lines.extend(
            state
                .folders
                .iter()
                .map(|folder| format!("  {}", folder.display())),
        );

        lines.push("Filters:".to_string());
        lines.extend(state.filters.iter().map(|filter| {
            let extensions: Vec<&str> =
                filter.extensions.iter().map(String::as_str).collect();
            format!("  {} [{}]", filter.program, extensions.join(" "))
        }));

        lines.push(format!(
            "Processed files: {} (batches: {}, invocations: {}, failures: {})",
            state.processed.len(),
            state.stats.batches,
            state.stats.invocations,
            state.stats.failures
        ));

        let mut output = lines.join("\n");
        output.push('\n');
        output
    }

    fn create_session(&self, folders: &FolderSet) -> Result<WatchSession> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let handler: Weak<dyn BatchHandler> = shared;
        WatchSession::create(
            self.shared.notifier.as_ref(),
            folders.as_slice(),
            handler,
            self.shared.config.clone(),
        )
    }

    /// Replaces the session with a fresh one over the current folders,
    /// restarting it if the monitor was running.
    fn rebuild(&self, state: &mut MonitorState) -> Result<()> {
        let was_running = state.running;
        if let Some(mut session) = state.session.take() {
            session.invalidate();
        }
        if state.folders.is_empty() {
            return Ok(());
        }

        let mut session = self.create_session(&state.folders)?;
        if was_running {
            session.start()?;
        }
        state.session = Some(session);
        Ok(())
    }
}
