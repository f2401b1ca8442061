//! Batch callback: classify, dedup, then run every matching filter.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Shared;
use crate::filter::Filter;
use crate::fs_watch::{BatchHandler, ChangeEvent};
use crate::processed::ProcessedSet;
use crate::runner::command_line;

/// Outcome of one delivered batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Files seen for the first time, in batch order.
    pub new_files: Vec<PathBuf>,
    /// Program invocations attempted.
    pub invocations: usize,
    /// Invocations that failed to launch or exited nonzero.
    pub failures: usize,
}

/// Running totals across every batch a monitor has handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub batches: u64,
    pub invocations: u64,
    pub failures: u64,
}

impl DispatchStats {
    fn record(&mut self, report: &DispatchReport) {
        self.batches += 1;
        self.invocations += report.invocations as u64;
        self.failures += report.failures as u64;
    }
}

impl Shared {
    /// Runs one batch while holding the monitor lock for its whole duration.
    pub(super) async fn dispatch(
        &self,
        batch: Vec<ChangeEvent>,
    ) -> DispatchReport {
        let mut state = self.state.lock().await;
        let new_files = take_new_files(&mut state.processed, batch);
        let mut report = DispatchReport {
            new_files,
            ..Default::default()
        };

        if report.new_files.is_empty() {
            state.stats.record(&report);
            return report;
        }
        debug!(files = ?report.new_files, "new files");

        // Lock stays held until the last program returns.
        let filters = state.filters.as_slice().to_vec();
        run_filters(self, &filters, &mut report).await;
        state.stats.record(&report);
        report
    }
}

/// Keeps created plain files not yet in the ledger, marking each as seen.
fn take_new_files(
    processed: &mut ProcessedSet,
    batch: Vec<ChangeEvent>,
) -> Vec<PathBuf> {
    let mut new_files = Vec::new();
    for event in batch {
        let flags = event.flags;
        if flags.must_rescan {
            debug!(path = %event.path.display(), "rescan requested; ignored");
        }
        if !(flags.created && flags.is_file) {
            continue;
        }
        if processed.add(event.path.clone()) {
            new_files.push(event.path);
        }
    }
    new_files
}

async fn run_filters(
    shared: &Shared,
    filters: &[Filter],
    report: &mut DispatchReport,
) {
    for filter in filters {
        for file in &report.new_files {
            if !filter.matches(file) {
                continue;
            }

            let command = command_line(&filter.program, file);
            info!("Running: '{command}'");
            report.invocations += 1;

            match shared.runner.run(&command).await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    report.failures += 1;
                    warn!(
                        path = %file.display(),
                        "program returned nonzero exit status: {status}"
                    );
                }
                Err(err) => {
                    report.failures += 1;
                    warn!(
                        path = %file.display(),
                        "failed to launch '{command}': {err}"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl BatchHandler for Shared {
    async fn handle_batch(&self, batch: Vec<ChangeEvent>) {
        self.dispatch(batch).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fs_watch::ChangeFlags;
    use std::path::Path;

    #[test]
    fn only_created_files_survive_classification() {
        let mut ledger = ProcessedSet::new();
        let batch = vec![
            ChangeEvent::created_file("/w/a.txt"),
            ChangeEvent::new(
                "/w/dir",
                ChangeFlags {
                    created: true,
                    is_file: false,
                    must_rescan: false,
                },
            ),
            ChangeEvent::new(
                "/w/b.txt",
                ChangeFlags {
                    created: false,
                    is_file: true,
                    must_rescan: false,
                },
            ),
            ChangeEvent::new(
                "/w",
                ChangeFlags {
                    must_rescan: true,
                    ..Default::default()
                },
            ),
        ];

        let new_files = take_new_files(&mut ledger, batch);
        assert_eq!(new_files, vec![PathBuf::from("/w/a.txt")]);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn repeated_paths_are_new_once() {
        let mut ledger = ProcessedSet::new();
        let batch = vec![
            ChangeEvent::created_file("/w/a.txt"),
            ChangeEvent::created_file("/w/a.txt"),
        ];
        assert_eq!(take_new_files(&mut ledger, batch).len(), 1);

        let again = vec![ChangeEvent::created_file("/w/a.txt")];
        assert!(take_new_files(&mut ledger, again).is_empty());
        assert!(ledger.contains(Path::new("/w/a.txt")));
    }
}
