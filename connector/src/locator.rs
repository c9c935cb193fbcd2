/// Install-directory discovery from the OS process list.
///
/// Two processes are of interest: the client UX (`LeagueClientUx`), whose
/// command line carries `--install-directory=<dir>`, and the in-match game
/// process (`League of Legends`), whose command line carries
/// `-GameBaseDir=<dir>`.  Each [`InstallLocator`] returns the directory for
/// one of them, or `None` when it cannot be found this attempt.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::process::Command;

use crate::error::Error;

/// Process whose command line is inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTarget {
    /// The client UX process (`LeagueClientUx`).
    Client,
    /// The in-match game process (`League of Legends`).
    Game,
}

/// Command-line quoting convention of the process listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// WMIC output: every argument is wrapped in double quotes.
    Windows,
    /// `ps` output: arguments are unquoted and space-separated.
    Posix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }
}

/// Which locator implementation the controller should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    /// Shell out to WMIC / `ps` and match the output.
    #[default]
    Shell,
    /// Read process command lines in-process through `sysinfo`.
    Sysinfo,
}

impl LocatorKind {
    pub fn build(self) -> Box<dyn InstallLocator> {
        match self {
            LocatorKind::Shell => Box::new(ShellLocator::new(Platform::current())),
            LocatorKind::Sysinfo => Box::new(SysinfoLocator::new()),
        }
    }
}

#[async_trait]
pub trait InstallLocator: Send + Sync {
    /// Returns the directory `target` was launched from, if it is running.
    async fn locate(&self, target: ProcessTarget) -> Option<PathBuf>;
}

// ── Output matching ──────────────────────────────────────────────────────────

fn pattern(target: ProcessTarget, platform: Platform) -> &'static Regex {
    static CLIENT_WIN: OnceLock<Regex> = OnceLock::new();
    static CLIENT_POSIX: OnceLock<Regex> = OnceLock::new();
    static GAME_WIN: OnceLock<Regex> = OnceLock::new();
    static GAME_POSIX: OnceLock<Regex> = OnceLock::new();

    let (cell, src) = match (target, platform) {
        (ProcessTarget::Client, Platform::Windows) => {
            (&CLIENT_WIN, r#""--install-directory=(.*?)""#)
        }
        (ProcessTarget::Client, Platform::Posix) => {
            (&CLIENT_POSIX, r"--install-directory=(.*?)(?: --|\n|$)")
        }
        (ProcessTarget::Game, Platform::Windows) => (&GAME_WIN, r#"-GameBaseDir=(.*?)""#),
        (ProcessTarget::Game, Platform::Posix) => (&GAME_POSIX, r"-GameBaseDir=(.*?)(?: -|\n|$)"),
    };
    cell.get_or_init(|| Regex::new(src).expect("static locator pattern is valid"))
}

/// Extracts the install/base directory argument from process-listing output.
pub fn extract_dir(output: &str, target: ProcessTarget, platform: Platform) -> Option<PathBuf> {
    pattern(target, platform)
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('\r'))
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

/// The shell command that lists `target`'s command line on `platform`.
pub fn listing_command(target: ProcessTarget, platform: Platform) -> String {
    match (target, platform) {
        (ProcessTarget::Client, Platform::Windows) => {
            "WMIC PROCESS WHERE name='LeagueClientUx.exe' GET commandline".to_string()
        }
        (ProcessTarget::Game, Platform::Windows) => {
            "WMIC PROCESS WHERE name='League of Legends.exe' GET commandline".to_string()
        }
        (ProcessTarget::Client, Platform::Posix) => "ps x -o args | grep 'LeagueClientUx'".to_string(),
        (ProcessTarget::Game, Platform::Posix) => "ps x -o args | grep 'League of Legends'".to_string(),
    }
}

// ── Shell locator ────────────────────────────────────────────────────────────

/// Runs WMIC (Windows) or `ps | grep` (POSIX) through the system shell.
pub struct ShellLocator {
    platform: Platform,
    /// Replaces the per-target listing command when set.
    command: Option<String>,
}

impl ShellLocator {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            command: None,
        }
    }

    /// Runs `command` for every target instead of the built-in listing.
    /// Its output is matched with `platform`'s patterns.
    pub fn with_command(platform: Platform, command: impl Into<String>) -> Self {
        Self {
            platform,
            command: Some(command.into()),
        }
    }
}

/// Runs `command` through the system shell and returns its stdout.
///
/// Spawn failures, a non-zero exit, anything on stderr and blank output are
/// all errors.
pub(crate) async fn run_shell(command: &str) -> Result<String, Error> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    let output = cmd
        .output()
        .await
        .map_err(|e| Error::ProcessInspection(format!("failed to spawn `{command}`: {e}")))?;

    if !output.status.success() {
        return Err(Error::ProcessInspection(format!(
            "`{command}` exited with {}",
            output.status
        )));
    }
    if !output.stderr.is_empty() {
        return Err(Error::ProcessInspection(format!(
            "`{command}` wrote to stderr: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if stdout.trim().is_empty() {
        return Err(Error::ProcessInspection(format!("`{command}` printed nothing")));
    }
    Ok(stdout)
}

#[async_trait]
impl InstallLocator for ShellLocator {
    async fn locate(&self, target: ProcessTarget) -> Option<PathBuf> {
        let command = match &self.command {
            Some(command) => command.clone(),
            None => listing_command(target, self.platform),
        };
        match run_shell(&command).await {
            Ok(stdout) => extract_dir(&stdout, target, self.platform),
            Err(e) => {
                tracing::debug!(target: "monitor", "{e}");
                None
            }
        }
    }
}

// ── sysinfo locator ──────────────────────────────────────────────────────────

/// Reads process command lines through `sysinfo` instead of a shell.
pub struct SysinfoLocator {
    sys: tokio::sync::Mutex<System>,
}

impl SysinfoLocator {
    pub fn new() -> Self {
        Self {
            sys: tokio::sync::Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds `target`'s directory argument among already-split command-line args.
pub fn dir_from_args<S: AsRef<str>>(args: &[S], target: ProcessTarget) -> Option<PathBuf> {
    let prefix = match target {
        ProcessTarget::Client => "--install-directory=",
        ProcessTarget::Game => "-GameBaseDir=",
    };
    args.iter()
        .find_map(|arg| arg.as_ref().strip_prefix(prefix))
        .map(|dir| dir.trim_matches('"'))
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

/// True when the executable at `image` is `target`.
///
/// Matched on the executable's file name rather than the process name, which
/// Linux truncates to 15 bytes (`League of Legen`).  Spaces are ignored so the
/// macOS game binary (`LeagueofLegends`) matches too.
pub fn is_target_process(image: Option<&Path>, target: ProcessTarget) -> bool {
    let needle = match target {
        ProcessTarget::Client => "leagueclientux",
        ProcessTarget::Game => "leagueoflegends",
    };
    image
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_lowercase().replace(' ', ""))
        .is_some_and(|name| name.contains(needle))
}

#[async_trait]
impl InstallLocator for SysinfoLocator {
    async fn locate(&self, target: ProcessTarget) -> Option<PathBuf> {
        let mut sys = self.sys.lock().await;
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_cmd(UpdateKind::Always)
                .with_exe(UpdateKind::OnlyIfNotSet),
        );

        sys.processes()
            .values()
            .filter(|p| {
                let argv0 = p.cmd().first().map(PathBuf::from);
                is_target_process(p.exe().or(argv0.as_deref()), target)
            })
            .find_map(|p| {
                let args: Vec<String> = p
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect();
                dir_from_args(&args, target)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WMIC_CLIENT: &str = "CommandLine\r\n\
        \"C:/Riot Games/League of Legends/LeagueClientUx.exe\" \"--riotclient-auth-token=xyz\" \
        \"--app-port=56789\" \"--install-directory=C:/Riot Games/League of Legends\" \"--locale=en_US\"\r\n";

    const PS_CLIENT: &str = "/Applications/League of Legends.app/Contents/LoL/LeagueClient.app/Contents/LeagueClientUx \
        --app-port=56789 --install-directory=/Applications/League of Legends.app/Contents/LoL --locale=en_US\n\
        grep LeagueClientUx\n";

    const WMIC_GAME: &str = "CommandLine\r\n\
        \"C:/Riot Games/League of Legends/Game/League of Legends.exe\" \"8394\" \"-Product=LoL\" \
        \"-GameBaseDir=C:/Riot Games/League of Legends\" \"-Region=EUW\"\r\n";

    const PS_GAME: &str = "./League of Legends 8394 -Product=LoL -GameBaseDir=/Applications/League of Legends.app/Contents/LoL -Region=EUW\n";

    // ── extract_dir ───────────────────────────────────────────────────────────

    #[test]
    fn extracts_client_dir_from_wmic_output() {
        let dir = extract_dir(WMIC_CLIENT, ProcessTarget::Client, Platform::Windows);
        assert_eq!(dir, Some(PathBuf::from("C:/Riot Games/League of Legends")));
    }

    #[test]
    fn extracts_client_dir_from_ps_output() {
        let dir = extract_dir(PS_CLIENT, ProcessTarget::Client, Platform::Posix);
        assert_eq!(
            dir,
            Some(PathBuf::from("/Applications/League of Legends.app/Contents/LoL"))
        );
    }

    #[test]
    fn extracts_client_dir_when_last_argument() {
        let out = "LeagueClientUx --install-directory=/opt/league\n";
        let dir = extract_dir(out, ProcessTarget::Client, Platform::Posix);
        assert_eq!(dir, Some(PathBuf::from("/opt/league")));
    }

    #[test]
    fn extracts_game_dir_from_wmic_output() {
        let dir = extract_dir(WMIC_GAME, ProcessTarget::Game, Platform::Windows);
        assert_eq!(dir, Some(PathBuf::from("C:/Riot Games/League of Legends")));
    }

    #[test]
    fn extracts_game_dir_from_ps_output() {
        let dir = extract_dir(PS_GAME, ProcessTarget::Game, Platform::Posix);
        assert_eq!(
            dir,
            Some(PathBuf::from("/Applications/League of Legends.app/Contents/LoL"))
        );
    }

    #[test]
    fn no_match_when_only_grep_is_listed() {
        let out = "grep LeagueClientUx\n";
        assert!(extract_dir(out, ProcessTarget::Client, Platform::Posix).is_none());
    }

    #[test]
    fn windows_pattern_requires_quotes() {
        assert!(extract_dir(PS_CLIENT, ProcessTarget::Client, Platform::Windows).is_none());
    }

    // ── listing_command ───────────────────────────────────────────────────────

    #[test]
    fn listing_commands_name_the_right_process() {
        assert!(listing_command(ProcessTarget::Client, Platform::Windows)
            .contains("LeagueClientUx.exe"));
        assert!(listing_command(ProcessTarget::Game, Platform::Windows)
            .contains("League of Legends.exe"));
        assert!(listing_command(ProcessTarget::Client, Platform::Posix).starts_with("ps x -o args"));
        assert!(listing_command(ProcessTarget::Game, Platform::Posix).contains("'League of Legends'"));
    }

    // ── dir_from_args ─────────────────────────────────────────────────────────

    #[test]
    fn dir_from_split_args() {
        let args = ["LeagueClientUx.exe", "--app-port=1", "--install-directory=C:/LoL"];
        assert_eq!(
            dir_from_args(&args, ProcessTarget::Client),
            Some(PathBuf::from("C:/LoL"))
        );
        assert!(dir_from_args(&args, ProcessTarget::Game).is_none());
    }

    #[test]
    fn dir_from_args_ignores_empty_value() {
        let args = ["-GameBaseDir="];
        assert!(dir_from_args(&args, ProcessTarget::Game).is_none());
    }

    // ── is_target_process ─────────────────────────────────────────────────────

    #[test]
    fn target_process_matches_executable_name() {
        let game = Path::new("C:/Riot Games/League of Legends/Game/League of Legends.exe");
        let mac_game = Path::new("/Applications/League of Legends.app/Contents/MacOS/LeagueofLegends");
        let client = Path::new("/opt/lol/LeagueClientUx");

        assert!(is_target_process(Some(game), ProcessTarget::Game));
        assert!(is_target_process(Some(mac_game), ProcessTarget::Game));
        assert!(is_target_process(Some(client), ProcessTarget::Client));
        assert!(!is_target_process(Some(client), ProcessTarget::Game));
        assert!(!is_target_process(None, ProcessTarget::Client));
    }

    #[test]
    fn truncated_process_name_is_not_required() {
        // What Linux reports as the process name for the game.
        assert!(!is_target_process(Some(Path::new("League of Legen")), ProcessTarget::Game));
        assert!(is_target_process(
            Some(Path::new("/home/u/Games/League of Legends.exe")),
            ProcessTarget::Game
        ));
    }

    // ── ShellLocator ──────────────────────────────────────────────────────────

    #[cfg(unix)]
    #[tokio::test]
    async fn run_shell_rejects_failed_or_silent_commands() {
        assert!(matches!(run_shell("true").await, Err(Error::ProcessInspection(_))));
        assert!(matches!(run_shell("exit 1").await, Err(Error::ProcessInspection(_))));
        assert!(matches!(run_shell("echo x >&2").await, Err(Error::ProcessInspection(_))));
        assert_eq!(run_shell("echo hello").await.unwrap(), "hello\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_locator_returns_none_on_failure() {
        for command in ["true", "exit 1", "echo x >&2", "echo '--install-directory=/opt/lol' >&2"] {
            let locator = ShellLocator::with_command(Platform::Posix, command);
            assert!(
                locator.locate(ProcessTarget::Client).await.is_none(),
                "{command}"
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_locator_extracts_from_command_output() {
        let locator = ShellLocator::with_command(
            Platform::Posix,
            "echo 'LeagueClientUx --app-port=1 --install-directory=/opt/lol --locale=en_US'",
        );
        assert_eq!(
            locator.locate(ProcessTarget::Client).await,
            Some(PathBuf::from("/opt/lol"))
        );
        assert!(locator.locate(ProcessTarget::Game).await.is_none());
    }

    #[test]
    fn locator_kind_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            locator: LocatorKind,
        }
        let w: Wrapper = toml::from_str("locator = \"sysinfo\"").unwrap();
        assert_eq!(w.locator, LocatorKind::Sysinfo);
        assert_eq!(LocatorKind::default(), LocatorKind::Shell);
    }
}
