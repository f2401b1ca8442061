//! In-memory notifier and recording runner shared by the monitor tests.

#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mediamon_core::{
    ChangeEvent, ChangeNotifier, CommandRunner, EventSink, Monitor,
    NotifierHandle, Result, WatchConfig,
};

/// One subscription handed out by [`FakeNotifier`].
#[derive(Clone)]
pub struct Subscription {
    pub folders: Vec<PathBuf>,
    pub sink: EventSink,
    pub watching: Arc<AtomicBool>,
}

impl Subscription {
    pub fn emit(&self, event: ChangeEvent) {
        if self.watching.load(Ordering::SeqCst) {
            self.sink.send(event);
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl FakeNotifier {
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn latest(&self) -> Subscription {
        self.subscriptions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no subscription yet")
    }
}

struct FakeHandle {
    watching: Arc<AtomicBool>,
}

impl NotifierHandle for FakeHandle {
    fn start(&mut self) -> Result<()> {
        self.watching.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.watching.store(false, Ordering::SeqCst);
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.watching.store(false, Ordering::SeqCst);
    }
}

impl ChangeNotifier for FakeNotifier {
    fn subscribe(
        &self,
        folders: &[PathBuf],
        sink: EventSink,
    ) -> Result<Box<dyn NotifierHandle>> {
        let watching = Arc::new(AtomicBool::new(false));
        self.subscriptions.lock().unwrap().push(Subscription {
            folders: folders.to_vec(),
            sink,
            watching: Arc::clone(&watching),
        });
        Ok(Box::new(FakeHandle { watching }))
    }
}

/// Records every command line; lines containing a `fail_on` marker fail to
/// launch.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    fail_on: Vec<String>,
}

impl RecordingRunner {
    pub fn failing_on(markers: &[&str]) -> Self {
        Self {
            commands: Mutex::default(),
            fail_on: markers.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command_line: &str) -> io::Result<ExitStatus> {
        self.commands.lock().unwrap().push(command_line.to_string());
        if self.fail_on.iter().any(|m| command_line.contains(m.as_str())) {
            return Err(io::Error::other("simulated launch failure"));
        }
        Ok(ExitStatus::default())
    }
}

pub struct Harness {
    pub monitor: Monitor,
    pub notifier: Arc<FakeNotifier>,
    pub runner: Arc<RecordingRunner>,
}

pub fn harness() -> Harness {
    harness_with(RecordingRunner::default())
}

pub fn harness_with(runner: RecordingRunner) -> Harness {
    let notifier = Arc::new(FakeNotifier::default());
    let runner = Arc::new(runner);
    let config = WatchConfig {
        latency: Duration::from_millis(25),
        max_batch_events: 64,
    };
    let monitor = Monitor::with_parts(
        config,
        Arc::clone(&notifier) as Arc<dyn ChangeNotifier>,
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
    );
    Harness {
        monitor,
        notifier,
        runner,
    }
}
