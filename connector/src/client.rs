/// Lifecycle controller: finds the running client, watches its lockfile and
/// notifies observers when a session starts or ends.
///
/// Detection runs as a single background task in one of two modes:
///   - process polling: ask the [`InstallLocator`] for the client (then the
///     game) install directory every `poll_interval` until one validates;
///   - lockfile watching: wait for `<install dir>/lockfile` to appear, change
///     or disappear.
///
/// A removed lockfile puts the controller back into watching the same
/// directory.  Polling resumes only when the directory can no longer be
/// watched; the task itself ends only through [`LeagueClient::stop`].
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::error::Error;
use crate::locator::{InstallLocator, LocatorKind, ProcessTarget};
use crate::lockfile::Credentials;
use crate::presence::{self, LockfileEvent, LockfileWatcher};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Options accepted by [`LeagueClient::new`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Path to the client executable.  Its directory is tried before any
    /// process polling.
    pub executable_path: Option<PathBuf>,
    pub poll_interval: Duration,
    pub locator: LocatorKind,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            executable_path: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            locator: LocatorKind::default(),
        }
    }
}

/// Observable detection state.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionState {
    Idle,
    PollingProcess,
    WatchingLockfile,
    Connected {
        credentials: Credentials,
        /// True when the install directory came from the game process.
        is_game_process: bool,
    },
    Stopped,
}

type ConnectedFn = Arc<dyn Fn(&Credentials, bool) + Send + Sync>;
type DisconnectedFn = Arc<dyn Fn() + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&Error) + Send + Sync>;

#[derive(Default)]
struct Observers {
    connected: Vec<ConnectedFn>,
    disconnected: Vec<DisconnectedFn>,
    error: Vec<ErrorFn>,
}

struct Shared {
    state: Mutex<DetectionState>,
    observers: Mutex<Observers>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, DetectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the state unless the controller has been stopped.
    fn set_state(&self, state: DetectionState) {
        let mut current = self.state();
        if *current != DetectionState::Stopped {
            *current = state;
        }
    }

    // Observers are cloned out of the lock before being called so they may
    // register further observers.

    fn emit_connected(&self, credentials: &Credentials, is_game_process: bool) {
        let observers = self.observers().connected.clone();
        for cb in &observers {
            cb(credentials, is_game_process);
        }
    }

    fn emit_disconnected(&self) {
        let observers = self.observers().disconnected.clone();
        for cb in &observers {
            cb();
        }
    }

    fn emit_error(&self, error: &Error) {
        let observers = self.observers().error.clone();
        for cb in &observers {
            cb(error);
        }
    }
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Detects the local League client and tracks its session credentials.
pub struct LeagueClient {
    install_dir: Option<PathBuf>,
    poll_interval: Duration,
    locator: Arc<dyn InstallLocator>,
    shared: Arc<Shared>,
    running: Option<Running>,
}

impl LeagueClient {
    pub fn new(options: ClientOptions) -> Self {
        let locator: Arc<dyn InstallLocator> = Arc::from(options.locator.build());
        Self::with_locator(options, locator)
    }

    /// Like [`LeagueClient::new`] but with a caller-supplied locator.
    pub fn with_locator(options: ClientOptions, locator: Arc<dyn InstallLocator>) -> Self {
        Self {
            install_dir: options
                .executable_path
                .as_deref()
                .and_then(presence::seeded_install_dir),
            poll_interval: options.poll_interval,
            locator,
            shared: Arc::new(Shared {
                state: Mutex::new(DetectionState::Idle),
                observers: Mutex::new(Observers::default()),
            }),
            running: None,
        }
    }

    /// Registers a callback for new sessions.  The flag is true when the
    /// session was found through the game process rather than the client.
    pub fn on_connected<F>(&self, f: F)
    where
        F: Fn(&Credentials, bool) + Send + Sync + 'static,
    {
        self.shared.observers().connected.push(Arc::new(f));
    }

    pub fn on_disconnected<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.observers().disconnected.push(Arc::new(f));
    }

    /// Registers a callback for lockfiles that exist but fail to parse.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.shared.observers().error.push(Arc::new(f));
    }

    pub fn state(&self) -> DetectionState {
        self.shared.state().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.handle.is_finished())
    }

    /// Starts detection.  Must be called from within a tokio runtime.
    /// Calling `start` while already running is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.running = None;

        *self.shared.state() = DetectionState::Idle;
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = Detector {
            shared: Arc::clone(&self.shared),
            locator: Arc::clone(&self.locator),
            seeded: self.install_dir.clone(),
            poll_interval: self.poll_interval,
        };
        let handle = tokio::spawn(task.run(stop_rx));
        self.running = Some(Running { stop_tx, handle });
    }

    /// Cancels polling and closes the lockfile watch.  Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(true);
            running.handle.abort();
            tracing::info!(target: "monitor", "Stopped");
        }
        *self.shared.state() = DetectionState::Stopped;
    }
}

impl Drop for LeagueClient {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
    }
}

struct Detector {
    shared: Arc<Shared>,
    locator: Arc<dyn InstallLocator>,
    /// Directory of the configured executable, tried before the locator.
    seeded: Option<PathBuf>,
    poll_interval: Duration,
}

impl Detector {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        tokio::select! {
            _ = self.detect() => {}
            _ = stop_rx.changed() => {}
        }
    }

    async fn detect(&self) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let (dir, is_game_process) = self.poll(&mut ticker).await;
            self.watch(&dir, is_game_process).await;
            // Wait a full interval before looking again.
            ticker.reset();
        }
    }

    /// Polls until a valid install directory is found.
    async fn poll(&self, ticker: &mut Interval) -> (PathBuf, bool) {
        loop {
            // The first tick completes immediately.
            ticker.tick().await;
            if let Some(found) = self.locate_once().await {
                return found;
            }
            self.shared.set_state(DetectionState::PollingProcess);
        }
    }

    async fn locate_once(&self) -> Option<(PathBuf, bool)> {
        if let Some(dir) = self.seeded.as_ref().filter(|d| presence::is_valid_install_dir(d)) {
            tracing::info!(target: "monitor", "Using configured install directory {}", dir.display());
            return Some((dir.clone(), false));
        }

        let (dir, is_game_process) = match self.locator.locate(ProcessTarget::Client).await {
            Some(dir) => (dir, false),
            None => (self.locator.locate(ProcessTarget::Game).await?, true),
        };

        if presence::is_valid_install_dir(&dir) {
            tracing::info!(
                target: "monitor",
                "Found {} install at {}",
                if is_game_process { "game" } else { "client" },
                dir.display()
            );
            Some((dir, is_game_process))
        } else {
            tracing::debug!(target: "monitor", "Ignoring invalid install directory {}", dir.display());
            None
        }
    }

    /// Follows the lockfile in `dir`.  Returns only when the directory cannot
    /// be watched (any more).
    async fn watch(&self, dir: &Path, is_game_process: bool) {
        let mut watcher = match LockfileWatcher::new(dir) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(target: "monitor", "Failed to watch {}: {e}", dir.display());
                self.shared.emit_error(&e);
                self.shared.set_state(DetectionState::PollingProcess);
                return;
            }
        };
        self.shared.set_state(DetectionState::WatchingLockfile);
        tracing::debug!(target: "monitor", "Watching {}", watcher.lockfile_path().display());

        let mut in_session = false;
        while let Some(event) = watcher.next_event().await {
            match event {
                LockfileEvent::Connected(credentials) => {
                    tracing::info!(
                        target: "monitor",
                        "Client connected (pid {}, port {})",
                        credentials.pid,
                        credentials.port
                    );
                    in_session = true;
                    self.shared.set_state(DetectionState::Connected {
                        credentials: credentials.clone(),
                        is_game_process,
                    });
                    self.shared.emit_connected(&credentials, is_game_process);
                }
                LockfileEvent::Disconnected => {
                    tracing::info!(target: "monitor", "Client disconnected");
                    in_session = false;
                    self.shared.set_state(DetectionState::WatchingLockfile);
                    self.shared.emit_disconnected();
                }
                LockfileEvent::Malformed(e) => {
                    tracing::warn!(target: "monitor", "Unreadable lockfile: {e}");
                    self.shared.emit_error(&e);
                }
            }
        }

        tracing::warn!(target: "monitor", "Lost watch on {}, polling again", dir.display());
        self.shared.set_state(DetectionState::PollingProcess);
        if in_session {
            self.shared.emit_disconnected();
        }
    }
}
