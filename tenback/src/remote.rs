//! Remote storage sync over rclone.
//!
//! Every operation shells out to `rclone` against a pre-configured named
//! remote. Uploads run with a fixed reliability configuration (inner rclone
//! retries, per-attempt timeout, low-level retries) plus an outer retry loop
//! with linearly increasing backoff. Listing parses rclone's tabular output.
//!
//! The subprocess and the backoff sleep both go through [`SyncRunner`], so
//! retry behavior is testable without spawning processes or waiting.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use tokio::process::Command;
use tracing::{info, warn};

/// Per-attempt wall clock limit for copy operations.
const COPY_TIMEOUT: Duration = Duration::from_secs(300);

/// Wall clock limit for listing operations.
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Wall clock limit for the `listremotes` preflight.
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(10);

/// Max stderr characters logged per failed attempt.
const STDERR_TRUNCATE: usize = 300;

/// Captured output of one rclone invocation.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between the sync logic and the outside world: runs an rclone
/// subprocess, and pauses between retry attempts. Test doubles record
/// pauses instead of sleeping.
pub trait SyncRunner {
    fn run(
        &self,
        args: &[String],
        timeout: Duration,
    ) -> impl Future<Output = Result<CmdOutput>> + Send;

    fn pause(&self, delay: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(delay)
    }
}

/// Real runner: spawns `rclone` with a hard timeout per attempt. A timeout
/// is a failed attempt, not a hang.
#[derive(Debug, Default, Clone)]
pub struct RcloneRunner;

impl SyncRunner for RcloneRunner {
    async fn run(&self, args: &[String], timeout: Duration) -> Result<CmdOutput> {
        let child = Command::new("rclone").args(args).output();
        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| anyhow!("rclone timed out after {}s", timeout.as_secs()))?
            .context("failed to spawn rclone - is it installed?")?;
        Ok(CmdOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A file entry from `rclone ls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub size: u64,
    pub name: String,
}

/// Sync client bound to one remote and one backup root folder.
#[derive(Debug)]
pub struct RemoteSync<R: SyncRunner = RcloneRunner> {
    runner: R,
    remote: String,
    root: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl RemoteSync<RcloneRunner> {
    pub fn new(remote: &str, root: &str, max_retries: u32, retry_delay: Duration) -> Self {
        Self::with_runner(RcloneRunner, remote, root, max_retries, retry_delay)
    }
}

impl<R: SyncRunner> RemoteSync<R> {
    pub fn with_runner(
        runner: R,
        remote: &str,
        root: &str,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        RemoteSync {
            runner,
            remote: remote.to_string(),
            root: root.to_string(),
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    /// `{remote}:{root}` or `{remote}:{root}/{path}`
    fn dest(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}:{}", self.remote, self.root)
        } else {
            format!("{}:{}/{}", self.remote, self.root, path)
        }
    }

    /// Verifies rclone is installed and the named remote is configured.
    /// A failure here is fatal to the whole run.
    pub async fn check_remote(&self) -> Result<()> {
        let output = self
            .runner
            .run(&["listremotes".to_string()], PREFLIGHT_TIMEOUT)
            .await
            .context("rclone preflight")?;
        let expected = format!("{}:", self.remote);
        if !output.success || !output.stdout.contains(&expected) {
            bail!(
                "rclone remote '{}' not configured - run `rclone config` first",
                self.remote
            );
        }
        info!(remote = %self.remote, "rclone remote ok");
        Ok(())
    }

    /// Copies a local file or directory to `{root}/{folder}`, retrying up to
    /// `max_retries` times with linear backoff between attempts. Returns
    /// false only after all attempts are exhausted.
    pub async fn upload(&self, local: &Path, folder: &str) -> bool {
        let dest = self.dest(folder);
        let args: Vec<String> = vec![
            "copy".into(),
            local.to_string_lossy().into_owned(),
            dest.clone(),
            "--log-level".into(),
            "NOTICE".into(),
            "--retries".into(),
            "3".into(),
            "--timeout".into(),
            "120s".into(),
            "--low-level-retries".into(),
            "5".into(),
        ];

        for attempt in 1..=self.max_retries {
            match self.runner.run(&args, COPY_TIMEOUT).await {
                Ok(output) if output.success => {
                    info!(%dest, "upload ok");
                    return true;
                }
                Ok(output) => {
                    let stderr: String = output.stderr.chars().take(STDERR_TRUNCATE).collect();
                    warn!(attempt, max = self.max_retries, %dest, stderr, "upload attempt failed");
                }
                Err(err) => {
                    warn!(attempt, max = self.max_retries, %dest, %err, "upload attempt error");
                }
            }
            if attempt < self.max_retries {
                let wait = backoff_delay(attempt, self.retry_delay);
                info!(secs = wait.as_secs(), "retrying upload");
                self.runner.pause(wait).await;
            }
        }
        warn!(%dest, attempts = self.max_retries, "upload failed after all attempts");
        false
    }

    /// Post-upload sanity check: lists `{root}/{folder}` and looks for the
    /// expected filename. Listing may be eventually consistent, so a miss is
    /// a warning signal, not proof of loss.
    pub async fn verify(&self, folder: &str, expected_file: &str) -> bool {
        let args = vec!["ls".to_string(), self.dest(folder)];
        match self.runner.run(&args, LIST_TIMEOUT).await {
            Ok(output) => output.success && output.stdout.contains(expected_file),
            Err(_) => false,
        }
    }

    /// Lists directories under `{root}/{path}`.
    pub async fn list_dirs(&self, path: &str) -> Vec<String> {
        let args = vec!["lsd".to_string(), self.dest(path)];
        match self.runner.run(&args, LIST_TIMEOUT).await {
            Ok(output) if output.success => parse_lsd(&output.stdout),
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!(%err, "error listing remote dirs");
                Vec::new()
            }
        }
    }

    /// Lists files under `{root}/{path}`, sorted by name descending.
    /// Backup filenames embed a zero-padded timestamp, so descending name
    /// order is a proxy for recency.
    pub async fn list_files(&self, path: &str) -> Vec<RemoteFile> {
        let args = vec!["ls".to_string(), self.dest(path)];
        match self.runner.run(&args, LIST_TIMEOUT).await {
            Ok(output) if output.success => {
                let mut files = parse_ls(&output.stdout);
                files.sort_by(|a, b| b.name.cmp(&a.name));
                files
            }
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!(%err, "error listing remote files");
                Vec::new()
            }
        }
    }

    /// Downloads one file from `{root}/{folder}` into `local_dir`.
    pub async fn download(&self, folder: &str, name: &str, local_dir: &Path) -> bool {
        let args: Vec<String> = vec![
            "copy".into(),
            self.dest(folder),
            local_dir.to_string_lossy().into_owned(),
            "--include".into(),
            name.to_string(),
        ];
        match self.runner.run(&args, COPY_TIMEOUT).await {
            Ok(output) => {
                if !output.success {
                    let stderr: String = output.stderr.chars().take(STDERR_TRUNCATE).collect();
                    warn!(folder, name, stderr, "download failed");
                }
                output.success
            }
            Err(err) => {
                warn!(folder, name, %err, "download error");
                false
            }
        }
    }
}

/// Wait before the next attempt: linear in the attempt number.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base * attempt
}

/// Parses `rclone lsd` output: `   -1 2026-08-27 03:00:00  -1 name`
fn parse_lsd(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            (parts.len() >= 5).then(|| parts[parts.len() - 1].to_string())
        })
        .collect()
}

/// Parses `rclone ls` output: `   12345 path/name.zip` (name may hold spaces)
fn parse_ls(stdout: &str) -> Vec<RemoteFile> {
    stdout
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let (size, name) = trimmed.split_once(char::is_whitespace)?;
            let size = size.parse::<u64>().ok()?;
            Some(RemoteFile {
                size,
                name: name.trim().to_string(),
            })
        })
        .collect()
}

/// True if `name` follows the `backup_{YYYY-mm-dd_HHMM}.zip` convention.
///
/// "Latest archive" selection sorts names lexicographically, which is only
/// chronological for names that follow this convention, so names that do not
/// match are excluded from the sort rather than silently winning it.
pub fn looks_like_backup_name(name: &str) -> bool {
    let Some(stem) = name
        .strip_prefix("backup_")
        .and_then(|s| s.strip_suffix(".zip"))
    else {
        return false;
    };
    let bytes = stem.as_bytes();
    if bytes.len() != 15 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b'_',
        _ => b.is_ascii_digit(),
    })
}

/// Picks the most recent archive: the lexicographically greatest name among
/// entries that follow the backup naming convention. Nonconforming zip names
/// are reported with a warning and skipped.
pub fn latest_backup(files: &[RemoteFile]) -> Option<&RemoteFile> {
    for file in files {
        if file.name.ends_with(".zip") && !looks_like_backup_name(&file.name) {
            warn!(name = %file.name, "zip does not follow backup naming, excluded from latest");
        }
    }
    files
        .iter()
        .filter(|f| looks_like_backup_name(&f.name))
        .max_by(|a, b| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn backoff_is_linear() {
        let base = Duration::from_secs(10);
        assert_eq!(backoff_delay(1, base), Duration::from_secs(10));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(20));
        assert_eq!(backoff_delay(3, base), Duration::from_secs(30));
    }

    #[test]
    fn parse_lsd_takes_trailing_name() {
        let out = concat!(
            "          -1 2026-08-27 03:00:00        -1 Toko_1_abcd1234\n",
            "          -1 2026-08-26 03:00:00        -1 _fulldb\n",
            "garbage line\n",
        );
        assert_eq!(parse_lsd(out), ["Toko_1_abcd1234", "_fulldb"]);
    }

    #[test]
    fn parse_ls_splits_size_and_name() {
        let out = "  1048576 backup_2026-08-27_0300.zip\n      512 backup_2026-08-26_0300.zip\n";
        let files = parse_ls(out);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size, 1_048_576);
        assert_eq!(files[0].name, "backup_2026-08-27_0300.zip");
    }

    #[test]
    fn backup_name_convention() {
        assert!(looks_like_backup_name("backup_2026-08-27_0300.zip"));
        assert!(!looks_like_backup_name("backup_20260827_0300.zip"));
        assert!(!looks_like_backup_name("notes.zip"));
        assert!(!looks_like_backup_name("backup_2026-08-27_0300.tar"));
    }

    #[test]
    fn latest_skips_nonconforming_names() {
        let files = vec![
            RemoteFile { size: 1, name: "zzzz-not-a-backup.zip".into() },
            RemoteFile { size: 1, name: "backup_2026-08-26_0300.zip".into() },
            RemoteFile { size: 1, name: "backup_2026-08-27_0300.zip".into() },
        ];
        assert_eq!(
            latest_backup(&files).map(|f| f.name.as_str()),
            Some("backup_2026-08-27_0300.zip")
        );
    }

    // fails the first `fail_first` invocations, then succeeds; records pauses
    struct FakeRunner {
        fail_first: u32,
        calls: Mutex<u32>,
        pauses: Mutex<Vec<Duration>>,
    }

    impl FakeRunner {
        fn new(fail_first: u32) -> Self {
            FakeRunner {
                fail_first,
                calls: Mutex::new(0),
                pauses: Mutex::new(Vec::new()),
            }
        }
    }

    impl SyncRunner for FakeRunner {
        async fn run(&self, _args: &[String], _timeout: Duration) -> Result<CmdOutput> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            let success = *calls > self.fail_first;
            Ok(CmdOutput {
                success,
                stdout: String::new(),
                stderr: if success { String::new() } else { "boom".into() },
            })
        }

        async fn pause(&self, delay: Duration) {
            self.pauses.lock().unwrap().push(delay);
        }
    }

    #[tokio::test]
    async fn upload_succeeds_after_transient_failures() {
        let base = Duration::from_secs(10);
        let sync = RemoteSync::with_runner(FakeRunner::new(2), "gdrive", "Backups", 3, base);
        assert!(sync.upload(Path::new("/tmp/x.zip"), "tenant").await);
        assert_eq!(*sync.runner.calls.lock().unwrap(), 3);
        // waits are the first two linear backoff intervals
        let pauses = sync.runner.pauses.lock().unwrap();
        assert_eq!(*pauses, [Duration::from_secs(10), Duration::from_secs(20)]);
    }

    #[tokio::test]
    async fn upload_gives_up_after_max_retries() {
        let base = Duration::from_secs(1);
        let sync = RemoteSync::with_runner(FakeRunner::new(10), "gdrive", "Backups", 3, base);
        assert!(!sync.upload(Path::new("/tmp/x.zip"), "tenant").await);
        assert_eq!(*sync.runner.calls.lock().unwrap(), 3);
        assert_eq!(sync.runner.pauses.lock().unwrap().len(), 2);
    }
}
