//! # mediamon-core
//!
//! Watches a set of folders and runs an external program, exactly once, on
//! every newly created file whose extension matches a registered filter.
//!
//! ## Pipeline
//!
//! ```text
//! notify watcher ─► WatchSession batching loop ─► Monitor::dispatch
//!                                                  ├─ classify (created + file)
//!                                                  ├─ dedup (ProcessedSet)
//!                                                  └─ match filters ─► CommandRunner
//! ```
//!
//! - [`filter`]: extension rules and the ordered [`FilterSet`]
//! - [`folders`]: canonical [`FolderSet`]
//! - [`processed`]: the append-only dedup ledger
//! - [`fs_watch`]: notifier seam and the watch-session lifecycle
//! - [`runner`]: subprocess invocation
//! - [`monitor`]: the coordinator and its public API
//!
//! ## Example
//!
//! ```no_run
//! use mediamon_core::Monitor;
//!
//! # async fn run() -> mediamon_core::Result<()> {
//! let monitor = Monitor::init();
//! monitor.add_folders(&["/tmp/watch"]).await?;
//! monitor.add_filter("/usr/local/bin/convert", [".mkv", ".avi"]).await?;
//! monitor.start().await?;
//! // ...
//! monitor.free().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod filter;
pub mod folders;
pub mod fs_watch;
pub mod monitor;
pub mod processed;
pub mod runner;
pub mod unique_list;

pub use error::{MonitorError, Result};
pub use filter::{Filter, FilterError, FilterSet};
pub use folders::FolderSet;
pub use fs_watch::{
    ChangeEvent, ChangeFlags, ChangeNotifier, EventSink, NotifierHandle,
    MAX_BATCH_EVENTS, NotifyBackend, SessionState, WatchConfig,
};
pub use monitor::{DispatchReport, DispatchStats, Monitor, SessionSnapshot};
pub use processed::ProcessedSet;
pub use runner::{CommandRunner, ShellRunner};
pub use unique_list::UniqueList;
