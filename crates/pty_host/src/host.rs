use crate::error::{PtyHostError, Result};
use parking_lot::Mutex;
use portable_pty::{Child, CommandBuilder, MasterPty, NativePtySystem, PtySize, PtySystem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CHUNK_SIZE: usize = 64 * 1024;
const EXIT_POLL_ATTEMPTS: usize = 25;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Receives terminal output and lifecycle notifications from the reader threads.
pub trait EventSink: Send + Sync {
    fn emit_chunk(&self, term_id: &str, seq: u64, bytes: &[u8]);

    fn emit_exit(&self, _term_id: &str, _exit_code: Option<u32>) {}
}

/// Sink that drops everything. Useful for headless hosts.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit_chunk(&self, _term_id: &str, _seq: u64, _bytes: &[u8]) {}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnOptions {
    pub id: String,
    pub cwd: Option<PathBuf>,
    /// Program to run. `None` starts the user's login shell.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub rows: u16,
    pub cols: u16,
}

impl SpawnOptions {
    pub fn shell(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cwd: None,
            command: None,
            args: Vec::new(),
            env: Vec::new(),
            rows: 24,
            cols: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnResponse {
    pub term_id: String,
    pub pid: Option<u32>,
}

struct TerminalEntry {
    term_id: String,
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Option<Box<dyn Child + Send>>>,
    seq: AtomicU64,
    killed: AtomicBool,
}

impl TerminalEntry {
    fn new(
        term_id: String,
        master: Box<dyn MasterPty + Send>,
        child: Box<dyn Child + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Arc<Self> {
        Arc::new(Self {
            term_id,
            writer: Mutex::new(writer),
            master: Mutex::new(master),
            child: Mutex::new(Some(child)),
            seq: AtomicU64::new(0),
            killed: AtomicBool::new(false),
        })
    }

    fn spawn_reader(self: &Arc<Self>, sink: Arc<dyn EventSink>) -> Result<()> {
        let mut reader = self
            .master
            .lock()
            .try_clone_reader()
            .map_err(|e| PtyHostError::Internal(format!("failed to clone pty reader: {e}")))?;
        let entry = Arc::clone(self);

        std::thread::Builder::new()
            .name(format!("pty-reader-{}", self.term_id))
            .spawn(move || {
                let mut buffer = vec![0u8; CHUNK_SIZE];
                loop {
                    let read_bytes = match reader.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            tracing::debug!("pty reader for {} stopped: {err}", entry.term_id);
                            break;
                        }
                    };
                    let seq = entry.seq.fetch_add(1, Ordering::SeqCst) + 1;
                    sink.emit_chunk(&entry.term_id, seq, &buffer[..read_bytes]);
                }

                if !entry.killed.load(Ordering::SeqCst) {
                    let code = entry.poll_exit_code();
                    tracing::info!("terminal {} exited with code {code:?}", entry.term_id);
                    sink.emit_exit(&entry.term_id, code);
                }
            })?;

        Ok(())
    }

    fn poll_exit_code(&self) -> Option<u32> {
        for _ in 0..EXIT_POLL_ATTEMPTS {
            {
                let mut guard = self.child.lock();
                let child = guard.as_mut()?;
                match child.try_wait() {
                    Ok(Some(status)) => return Some(status.exit_code()),
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!("failed to poll exit of {}: {err}", self.term_id);
                        return None;
                    }
                }
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
        None
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(data)?;
        writer.flush().map_err(PtyHostError::IoError)
    }

    fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .lock()
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyHostError::Internal(format!("failed to resize pty: {e}")))
    }

    fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.lock().take() {
            if let Err(err) = child.kill() {
                tracing::debug!("failed to kill terminal process {}: {err}", self.term_id);
            }
        }
    }
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
}

/// Owns every live pseudo-terminal of the process, keyed by terminal id.
pub struct PtyHost {
    sink: Arc<dyn EventSink>,
    terminals: Mutex<HashMap<String, Arc<TerminalEntry>>>,
}

impl PtyHost {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            terminals: Mutex::new(HashMap::new()),
        }
    }

    fn get_terminal(&self, term_id: &str) -> Result<Arc<TerminalEntry>> {
        self.terminals
            .lock()
            .get(term_id)
            .cloned()
            .ok_or_else(|| PtyHostError::TerminalNotFound(term_id.to_string()))
    }

    fn configure_command(opts: &SpawnOptions) -> CommandBuilder {
        let shell = default_shell();
        let mut cmd = match &opts.command {
            Some(program) => {
                let mut cmd = CommandBuilder::new(program);
                cmd.args(&opts.args);
                cmd
            }
            None => {
                let mut cmd = CommandBuilder::new(&shell);
                cmd.arg("-l");
                cmd.arg("-i");
                cmd
            }
        };
        cmd.env("SHELL", shell);
        cmd.env("LANG", "en_US.UTF-8");
        cmd.env("LC_CTYPE", "en_US.UTF-8");
        cmd.env("TERM", "xterm-256color");
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &opts.cwd {
            cmd.cwd(cwd);
        }
        cmd
    }

    pub async fn spawn(&self, opts: SpawnOptions) -> Result<SpawnResponse> {
        if self.terminals.lock().contains_key(&opts.id) {
            return Err(PtyHostError::TerminalExists(opts.id));
        }
        if let Some(cwd) = &opts.cwd {
            if !cwd.is_dir() {
                return Err(PtyHostError::InvalidCwd(cwd.display().to_string()));
            }
        }

        let pair = NativePtySystem::default()
            .openpty(PtySize {
                rows: opts.rows,
                cols: opts.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyHostError::Internal(format!("failed to open pty: {e}")))?;

        let cmd = Self::configure_command(&opts);
        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyHostError::Internal(format!("failed to spawn process: {e}")))?;
        drop(pair.slave);
        let pid = child.process_id();

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyHostError::Internal(format!("failed to take writer: {e}")))?;

        let entry = TerminalEntry::new(opts.id.clone(), pair.master, child, writer);

        // Register before the reader starts so an immediate exit still finds the entry.
        {
            let mut terminals = self.terminals.lock();
            if terminals.contains_key(&opts.id) {
                entry.kill();
                return Err(PtyHostError::TerminalExists(opts.id));
            }
            terminals.insert(opts.id.clone(), Arc::clone(&entry));
        }

        if let Err(err) = entry.spawn_reader(Arc::clone(&self.sink)) {
            self.terminals.lock().remove(&opts.id);
            entry.kill();
            return Err(err);
        }

        tracing::info!("spawned terminal {} (pid {pid:?})", opts.id);
        Ok(SpawnResponse {
            term_id: opts.id,
            pid,
        })
    }

    pub async fn write(&self, term_id: &str, data: &[u8]) -> Result<()> {
        self.get_terminal(term_id)?.write(data)
    }

    pub async fn resize(&self, term_id: &str, rows: u16, cols: u16) -> Result<()> {
        self.get_terminal(term_id)?.resize(rows, cols)
    }

    pub async fn kill(&self, term_id: &str) -> Result<()> {
        let entry = self.terminals.lock().remove(term_id);
        match entry {
            Some(entry) => {
                entry.kill();
                tracing::info!("killed terminal {term_id}");
                Ok(())
            }
            None => Err(PtyHostError::TerminalNotFound(term_id.to_string())),
        }
    }

    pub fn exists(&self, term_id: &str) -> bool {
        self.terminals.lock().contains_key(term_id)
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.terminals.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for PtyHost {
    fn drop(&mut self) {
        for (_, entry) in self.terminals.lock().drain() {
            entry.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingSink {
        chunks: Mutex<Vec<(String, u64, Vec<u8>)>>,
        exits: Mutex<Vec<(String, Option<u32>)>>,
        notify: Notify,
    }

    impl RecordingSink {
        async fn wait_for_text(&self, needle: &str) -> String {
            let timeout_at = tokio::time::Instant::now() + Duration::from_secs(5);
            loop {
                let text = self.text();
                if text.contains(needle) || tokio::time::Instant::now() > timeout_at {
                    return text;
                }
                let _ = tokio::time::timeout(Duration::from_millis(100), self.notify.notified())
                    .await;
            }
        }

        fn text(&self) -> String {
            let combined: Vec<u8> = self
                .chunks
                .lock()
                .iter()
                .flat_map(|(_, _, bytes)| bytes.clone())
                .collect();
            String::from_utf8_lossy(&combined).into_owned()
        }
    }

    impl EventSink for RecordingSink {
        fn emit_chunk(&self, term_id: &str, seq: u64, bytes: &[u8]) {
            self.chunks
                .lock()
                .push((term_id.to_string(), seq, bytes.to_vec()));
            self.notify.notify_waiters();
        }

        fn emit_exit(&self, term_id: &str, exit_code: Option<u32>) {
            self.exits.lock().push((term_id.to_string(), exit_code));
            self.notify.notify_waiters();
        }
    }

    fn make_host(sink: Arc<RecordingSink>) -> PtyHost {
        let dyn_sink: Arc<dyn EventSink> = sink;
        PtyHost::new(dyn_sink)
    }

    fn shell_options(id: &str, cwd: &std::path::Path) -> SpawnOptions {
        let mut opts = SpawnOptions::shell(id);
        opts.cwd = Some(cwd.to_path_buf());
        opts.command = Some("/bin/sh".to_string());
        opts
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_and_write_emits_output() -> Result<()> {
        let sink = Arc::new(RecordingSink::default());
        let temp_dir = tempfile::tempdir()?;
        let host = make_host(sink.clone());

        let spawned = host.spawn(shell_options("term-test", temp_dir.path())).await?;
        host.write(&spawned.term_id, b"printf 'hello world'\n").await?;

        let text = sink.wait_for_text("hello world").await;
        assert!(text.contains("hello world"));

        host.kill(&spawned.term_id).await?;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runs_in_requested_cwd() -> Result<()> {
        let sink = Arc::new(RecordingSink::default());
        let temp_dir = tempfile::tempdir()?;
        std::fs::write(temp_dir.path().join("marker-file.txt"), "x")?;
        let host = make_host(sink.clone());

        let mut opts = shell_options("ls-term", temp_dir.path());
        opts.command = Some("ls".to_string());
        host.spawn(opts).await?;

        let text = sink.wait_for_text("marker-file.txt").await;
        assert!(text.contains("marker-file.txt"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn natural_exit_is_reported_with_code() -> Result<()> {
        let sink = Arc::new(RecordingSink::default());
        let temp_dir = tempfile::tempdir()?;
        let host = make_host(sink.clone());

        let mut opts = shell_options("exit-term", temp_dir.path());
        opts.args = vec!["-c".to_string(), "exit 3".to_string()];
        host.spawn(opts).await?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while sink.exits.lock().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let exits = sink.exits.lock().clone();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].0, "exit-term");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn duplicate_ids_are_rejected() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let host = make_host(Arc::new(RecordingSink::default()));

        host.spawn(shell_options("dup", temp_dir.path())).await?;
        let err = host
            .spawn(shell_options("dup", temp_dir.path()))
            .await
            .expect_err("second spawn with same id must fail");
        assert!(matches!(err, PtyHostError::TerminalExists(id) if id == "dup"));

        host.kill("dup").await?;
        Ok(())
    }

    #[tokio::test]
    async fn missing_cwd_fails_before_spawning() {
        let host = make_host(Arc::new(RecordingSink::default()));
        let mut opts = SpawnOptions::shell("nowhere");
        opts.cwd = Some(PathBuf::from("/definitely/not/a/real/dir"));

        let err = host.spawn(opts).await.expect_err("spawn should fail");
        assert!(matches!(err, PtyHostError::InvalidCwd(_)));
        assert!(!host.exists("nowhere"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_removes_terminal_and_second_kill_fails() -> Result<()> {
        let sink = Arc::new(RecordingSink::default());
        let temp_dir = tempfile::tempdir()?;
        let host = make_host(sink.clone());

        host.spawn(shell_options("victim", temp_dir.path())).await?;
        assert_eq!(host.list(), vec!["victim".to_string()]);

        host.kill("victim").await?;
        assert!(!host.exists("victim"));
        assert!(matches!(
            host.kill("victim").await,
            Err(PtyHostError::TerminalNotFound(_))
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sink.exits.lock().is_empty(), "killed terminals do not report exit");
        Ok(())
    }

    #[tokio::test]
    async fn operations_on_unknown_terminal_fail() {
        let host = make_host(Arc::new(RecordingSink::default()));
        assert!(matches!(
            host.write("ghost", b"x").await,
            Err(PtyHostError::TerminalNotFound(_))
        ));
        assert!(matches!(
            host.resize("ghost", 10, 10).await,
            Err(PtyHostError::TerminalNotFound(_))
        ));
    }
}
