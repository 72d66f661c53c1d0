//! Tokio-backed shell process handle

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chronarc_core::{ProcessHandle, ProcessSpawner, SchedulerError, SchedulerResult};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Spawner producing [`ShellProcess`] handles
///
/// Handles are lazy: the child is spawned on `start`/`run`, not at
/// construction, so a handle can be built and parked in the pool first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellSpawner;

impl ProcessSpawner for ShellSpawner {
    fn spawn(
        &self,
        command_line: &str,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> SchedulerResult<Box<dyn ProcessHandle>> {
        Ok(Box::new(ShellProcess::new(command_line, working_dir, timeout)))
    }
}

/// A shell command driven through `tokio::process`
pub struct ShellProcess {
    command_line: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
    child: Option<Child>,
    started_at: Option<Instant>,
    exit_code: Option<i32>,
    stdout_buf: Arc<Mutex<String>>,
    stderr_buf: Arc<Mutex<String>>,
    reader_handles: Vec<JoinHandle<()>>,
}

impl ShellProcess {
    /// Build a handle; the process is not spawned yet
    pub fn new(command_line: &str, working_dir: &Path, timeout: Option<Duration>) -> Self {
        Self {
            command_line: command_line.to_string(),
            working_dir: working_dir.to_path_buf(),
            timeout,
            child: None,
            started_at: None,
            exit_code: None,
            stdout_buf: Arc::new(Mutex::new(String::new())),
            stderr_buf: Arc::new(Mutex::new(String::new())),
            reader_handles: Vec::new(),
        }
    }

    fn command(&self) -> Command {
        let mut command = if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(&self.command_line);
            command
        } else {
            let mut command = Command::new("sh");
            command.arg("-c").arg(&self.command_line);
            command
        };
        command
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_child(&mut self) -> SchedulerResult<()> {
        let mut child = self.command().spawn().map_err(|e| {
            SchedulerError::Process(format!("failed to spawn [{}]: {}", self.command_line, e))
        })?;
        if let Some(stdout) = child.stdout.take() {
            self.reader_handles.push(drain_into(stdout, Arc::clone(&self.stdout_buf)));
        }
        if let Some(stderr) = child.stderr.take() {
            self.reader_handles.push(drain_into(stderr, Arc::clone(&self.stderr_buf)));
        }
        self.started_at = Some(Instant::now());
        self.child = Some(child);
        Ok(())
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        for handle in &self.reader_handles {
            handle.abort();
        }
    }
}

fn drain_into<R>(reader: R, buffer: Arc<Mutex<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buffer = buffer.lock();
            buffer.push_str(&line);
            buffer.push('\n');
        }
    })
}

#[async_trait]
impl ProcessHandle for ShellProcess {
    async fn start(&mut self) -> SchedulerResult<()> {
        if self.child.is_none() && self.exit_code.is_none() {
            self.spawn_child()?;
        }
        Ok(())
    }

    async fn run(&mut self) -> SchedulerResult<i32> {
        self.start().await?;
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| SchedulerError::Process("process not started".into()))?;
        let status = child.wait().await.map_err(|e| SchedulerError::Process(e.to_string()))?;
        let code = status.code().unwrap_or(-1);
        self.exit_code = Some(code);
        self.child = None;
        Ok(code)
    }

    fn is_running(&mut self) -> SchedulerResult<bool> {
        let Some(child) = self.child.as_mut() else {
            return Ok(false);
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = Some(status.code().unwrap_or(-1));
                self.child = None;
                Ok(false)
            }
            Ok(None) => Ok(true),
            Err(e) => Err(SchedulerError::Process(e.to_string())),
        }
    }

    fn exit_code(&mut self) -> Option<i32> {
        if self.exit_code.is_none() {
            // A reap may not have observed the exit yet
            let _ = self.is_running();
        }
        self.exit_code
    }

    fn check_timeout(&mut self) -> SchedulerResult<()> {
        let (Some(timeout), Some(started_at)) = (self.timeout, self.started_at) else {
            return Ok(());
        };
        if started_at.elapsed() <= timeout {
            return Ok(());
        }
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        Err(SchedulerError::ProcessTimeout { timeout_secs: timeout.as_secs() })
    }

    fn read_incremental_output(&mut self) -> String {
        std::mem::take(&mut *self.stdout_buf.lock())
    }

    fn read_incremental_error_output(&mut self) -> String {
        std::mem::take(&mut *self.stderr_buf.lock())
    }
}
