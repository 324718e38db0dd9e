//! Child process execution with streaming output and deadline kills
//!
//! Scripts are spawned as their own process group so that a watchdog
//! or global-timeout kill takes down the whole subtree the script
//! forked, not just the shell. Stdout and stderr each get a dedicated
//! reader task; the waiting side races completion against the deadline
//! and the run-wide cancellation token.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lines of combined output retained for error reports
const TAIL_LINES: usize = 20;

/// Grace period between SIGTERM and SIGKILL
const GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Failure modes of one script run
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to spawn script: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("script exited with code {code}")]
    NonZero { code: i32, tail: String },

    /// The passed-in deadline fired before the script finished
    #[error("script killed by deadline")]
    DeadlineElapsed,

    /// The run-wide cancellation token fired
    #[error("script cancelled")]
    Cancelled,
}

/// Run a shell command line to completion, streaming its output
///
/// `deadline` bounds the run in absolute time; `cancel` aborts it from
/// outside. Either way the process group is terminated before this
/// returns.
pub async fn run_streaming(
    command_line: &str,
    workdir: &Path,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> Result<(), ScriptError> {
    debug!(command = %command_line, workdir = %workdir.display(), "spawning script");

    let mut child: AsyncGroupChild = Command::new("/bin/sh")
        .arg("-c")
        .arg(command_line)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .group_spawn()
        .map_err(ScriptError::Spawn)?;

    let tail = Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES)));

    let stdout = child.inner().stdout.take();
    let stderr = child.inner().stderr.take();
    let stdout_task = spawn_reader(stdout, tail.clone(), false);
    let stderr_task = spawn_reader(stderr, tail.clone(), true);

    let sleeper = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(sleeper);

    enum ExitReason {
        Completed(std::io::Result<std::process::ExitStatus>),
        DeadlineElapsed,
        Cancelled,
    }

    let reason = tokio::select! {
        wait_result = child.wait() => ExitReason::Completed(wait_result),
        _ = &mut sleeper => ExitReason::DeadlineElapsed,
        _ = cancel.cancelled() => ExitReason::Cancelled,
    };

    let wait_result = match reason {
        ExitReason::Completed(wait_result) => wait_result,
        ExitReason::DeadlineElapsed => {
            terminate_group(&mut child, GRACE_PERIOD).await;
            drain(stdout_task, stderr_task).await;
            return Err(ScriptError::DeadlineElapsed);
        }
        ExitReason::Cancelled => {
            terminate_group(&mut child, GRACE_PERIOD).await;
            drain(stdout_task, stderr_task).await;
            return Err(ScriptError::Cancelled);
        }
    };

    drain(stdout_task, stderr_task).await;

    let code = match wait_result {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            warn!("wait on script failed: {e}");
            -1
        }
    };

    if code == 0 {
        Ok(())
    } else {
        let tail = tail
            .lock()
            .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        Err(ScriptError::NonZero { code, tail })
    }
}

/// Stream one pipe line-by-line to the console, keeping the tail
fn spawn_reader<R>(
    pipe: Option<R>,
    tail: Arc<Mutex<VecDeque<String>>>,
    is_stderr: bool,
) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let pipe = pipe?;
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if is_stderr {
                        eprintln!("{line}");
                    } else {
                        println!("{line}");
                    }
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("error reading script output: {e}");
                    break;
                }
            }
        }
    }))
}

async fn drain(stdout_task: Option<JoinHandle<()>>, stderr_task: Option<JoinHandle<()>>) {
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }
}

/// Terminate a process group: SIGTERM, grace period, then SIGKILL
#[cfg(unix)]
async fn terminate_group(child: &mut AsyncGroupChild, grace: Duration) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.inner().id() else {
        return; // already exited
    };
    let pgid = Pid::from_raw(-(pid as i32));

    if let Err(e) = signal::kill(pgid, Signal::SIGTERM) {
        if e != nix::errno::Errno::ESRCH {
            warn!(pid, error = ?e, "SIGTERM to process group failed");
        }
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if child.inner().try_wait().ok().flatten().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    if let Err(e) = signal::kill(pgid, Signal::SIGKILL) {
        if e != nix::errno::Errno::ESRCH {
            warn!(pid, error = ?e, "SIGKILL to process group failed");
        }
    }

    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate_group(child: &mut AsyncGroupChild, _grace: Duration) {
    let _ = child.kill().await;
    let _ = child.wait().await;
}
