/// Client presence: install-directory validation and the lockfile watcher.
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::lockfile::{self, Credentials};

pub const LOCKFILE_NAME: &str = "lockfile";

/// Quiet period that closes a burst of create/modify notifications.
const DEBOUNCE: Duration = Duration::from_millis(100);

#[cfg(target_os = "macos")]
const CLIENT_EXECUTABLE: &str = "LeagueClient.app";
#[cfg(not(target_os = "macos"))]
const CLIENT_EXECUTABLE: &str = "LeagueClient.exe";

/// Returns true if `dir` looks like a League install.
///
/// The client executable and a `Config` directory are required.  The global
/// (`RADS`) and regional (`TQM`) install markers are accepted but optional.
pub fn is_valid_install_dir(dir: &Path) -> bool {
    let common = dir.join(CLIENT_EXECUTABLE).exists() && dir.join("Config").is_dir();
    let is_global = common && dir.join("RADS").exists();
    let is_regional = common && dir.join("TQM").exists();
    is_global || is_regional || common
}

/// Resolves the install directory seeded by a configured executable path.
pub fn seeded_install_dir(executable_path: &Path) -> Option<PathBuf> {
    let normalized: PathBuf = executable_path.components().collect();
    normalized
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// A state change observed on the lockfile.
#[derive(Debug)]
pub enum LockfileEvent {
    /// The lockfile appeared (or changed) and parsed into new credentials.
    Connected(Credentials),
    /// The lockfile was removed while a session was active.
    Disconnected,
    /// The lockfile exists but could not be parsed.
    Malformed(Error),
}

/// Watches `<install dir>/lockfile` for creation, modification and removal.
///
/// The parent directory is watched rather than the file itself so the watch
/// survives the file being deleted and recreated between client sessions.
pub struct LockfileWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Event>,
    active: Option<Credentials>,
    primed: bool,
}

impl LockfileWatcher {
    pub fn new(install_dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<notify::Event>(64);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = tx.blocking_send(event);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        watcher
            .watch(install_dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        Ok(Self {
            path: install_dir.join(LOCKFILE_NAME),
            _watcher: watcher,
            rx,
            active: None,
            primed: false,
        })
    }

    pub fn lockfile_path(&self) -> &Path {
        &self.path
    }

    /// Waits for the next lockfile state change.
    ///
    /// Returns `None` once the underlying watcher has shut down.
    pub async fn next_event(&mut self) -> Option<LockfileEvent> {
        // A lockfile that already exists counts as freshly created.
        if !self.primed {
            self.primed = true;
            if let Some(event) = self.reconcile().await {
                return Some(event);
            }
        }

        loop {
            let event = self.rx.recv().await?;
            if !self.touches_lockfile(&event) {
                continue;
            }

            // Drain the rest of the burst before looking at the file.
            loop {
                match tokio::time::timeout(DEBOUNCE, self.rx.recv()).await {
                    Ok(Some(_)) => continue,
                    Ok(None) => return None,
                    Err(_) => break,
                }
            }

            if let Some(event) = self.reconcile().await {
                return Some(event);
            }
        }
    }

    fn touches_lockfile(&self, event: &notify::Event) -> bool {
        let relevant_kind = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
        );
        relevant_kind
            && event
                .paths
                .iter()
                .any(|p| p.file_name().is_some_and(|n| n == LOCKFILE_NAME))
    }

    /// Compares the file on disk with the active session and reports the
    /// difference, if any.
    async fn reconcile(&mut self) -> Option<LockfileEvent> {
        match lockfile::read(&self.path).await {
            Ok(credentials) => {
                if self.active.as_ref() == Some(&credentials) {
                    return None;
                }
                self.active = Some(credentials.clone());
                Some(LockfileEvent::Connected(credentials))
            }
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.active.take().map(|_| LockfileEvent::Disconnected)
            }
            Err(e) => Some(LockfileEvent::Malformed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_install(dir: &Path) {
        std::fs::write(dir.join(CLIENT_EXECUTABLE), b"").unwrap();
        std::fs::create_dir(dir.join("Config")).unwrap();
    }

    async fn next(watcher: &mut LockfileWatcher) -> Option<LockfileEvent> {
        tokio::time::timeout(Duration::from_secs(5), watcher.next_event())
            .await
            .ok()
            .flatten()
    }

    // ── is_valid_install_dir ──────────────────────────────────────────────────

    #[test]
    fn baseline_footprint_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        make_install(dir.path());
        assert!(is_valid_install_dir(dir.path()));
    }

    #[test]
    fn global_and_regional_markers_are_valid() {
        let global = tempfile::tempdir().unwrap();
        make_install(global.path());
        std::fs::create_dir(global.path().join("RADS")).unwrap();
        assert!(is_valid_install_dir(global.path()));

        let regional = tempfile::tempdir().unwrap();
        make_install(regional.path());
        std::fs::create_dir(regional.path().join("TQM")).unwrap();
        assert!(is_valid_install_dir(regional.path()));
    }

    #[test]
    fn missing_config_dir_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CLIENT_EXECUTABLE), b"").unwrap();
        std::fs::create_dir(dir.path().join("RADS")).unwrap();
        assert!(!is_valid_install_dir(dir.path()));
    }

    #[test]
    fn missing_executable_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Config")).unwrap();
        assert!(!is_valid_install_dir(dir.path()));
    }

    #[test]
    fn nonexistent_dir_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_valid_install_dir(&dir.path().join("nope")));
    }

    // ── seeded_install_dir ────────────────────────────────────────────────────

    #[test]
    fn seeded_dir_is_executable_parent() {
        let dir = seeded_install_dir(Path::new("/opt/league/./LeagueClient.exe"));
        assert_eq!(dir, Some(PathBuf::from("/opt/league")));
    }

    #[test]
    fn bare_executable_name_has_no_seed() {
        assert!(seeded_install_dir(Path::new("LeagueClient.exe")).is_none());
    }

    // ── LockfileWatcher ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn existing_lockfile_is_reported_immediately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCKFILE_NAME), "LeagueClient:10:2999:pw:https").unwrap();

        let mut watcher = LockfileWatcher::new(dir.path()).unwrap();
        match next(&mut watcher).await {
            Some(LockfileEvent::Connected(c)) => assert_eq!(c.port, 2999),
            other => panic!("expected Connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_then_remove_yields_connect_then_single_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        let mut watcher = LockfileWatcher::new(dir.path()).unwrap();

        std::fs::write(&path, "LeagueClient:10:2999:pw:https").unwrap();
        match next(&mut watcher).await {
            Some(LockfileEvent::Connected(c)) => assert_eq!(c.pid, 10),
            other => panic!("expected Connected, got {other:?}"),
        }

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            next(&mut watcher).await,
            Some(LockfileEvent::Disconnected)
        ));

        // Nothing more until the file comes back.
        let quiet =
            tokio::time::timeout(Duration::from_millis(500), watcher.next_event()).await;
        assert!(quiet.is_err(), "unexpected event after disconnect");

        std::fs::write(&path, "LeagueClient:11:3000:pw2:https").unwrap();
        match next(&mut watcher).await {
            Some(LockfileEvent::Connected(c)) => assert_eq!(c.port, 3000),
            other => panic!("expected Connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_lockfile_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = LockfileWatcher::new(dir.path()).unwrap();

        std::fs::write(dir.path().join(LOCKFILE_NAME), "LeagueClient:oops").unwrap();
        match next(&mut watcher).await {
            Some(LockfileEvent::Malformed(Error::MalformedLockfile { .. })) => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = LockfileWatcher::new(dir.path()).unwrap();

        std::fs::write(dir.path().join("other.txt"), "hello").unwrap();
        let quiet =
            tokio::time::timeout(Duration::from_millis(500), watcher.next_event()).await;
        assert!(quiet.is_err());
    }
}
