//! Dev toolchain process supervision.
//!
//! Owns the single build/watch child process used in development,
//! forwards its console output to the log, and publishes the URL the dev
//! server listens on once a ready signal is seen.
//!
//! Readiness is a settle-once value per build generation: the first URL
//! reported by the detector (or the first fatal exit) is written into a
//! `watch` channel and every waiter observes that same value. Starting
//! the process again bumps the generation and resets the value.

use crate::ready::{ReadySignalDetector, strip_ansi};
use crate::{PrerenderError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Readiness of the current build generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyPhase {
    /// Never started
    Idle,
    /// Spawned, no ready signal yet
    Starting,
    Ready(String),
    /// Exited, failed to spawn, or stopped
    Failed(String),
}

/// Snapshot of the dev server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevServerState {
    pub generation: u64,
    pub phase: ReadyPhase,
    pub pid: Option<u32>,
}

impl DevServerState {
    pub fn ready_url(&self) -> Option<&str> {
        match &self.phase {
            ReadyPhase::Ready(url) => Some(url),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match &self.phase {
            ReadyPhase::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Options for the dev process
#[derive(Debug, Clone)]
pub struct DevServerOptions {
    /// Working directory, usually the SPA source folder
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// How long `get_ready_url` waits for the ready signal
    pub startup_timeout: Duration,
    /// How long `stop` waits after SIGTERM before killing
    pub stop_grace: Duration,
}

impl Default for DevServerOptions {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: HashMap::new(),
            startup_timeout: Duration::from_secs(120),
            stop_grace: Duration::from_secs(5),
        }
    }
}

struct RunningProcess {
    generation: u64,
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    /// Set once the child has been reaped; its pid may be reused after that
    exited: Arc<AtomicBool>,
    exit: JoinHandle<()>,
    probe: JoinHandle<()>,
}

impl RunningProcess {
    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

/// Supervisor for the dev build/watch process
pub struct DevProcessManager {
    detector: Arc<dyn ReadySignalDetector>,
    options: DevServerOptions,
    state: Arc<watch::Sender<DevServerState>>,
    process: Mutex<Option<RunningProcess>>,
    command: parking_lot::Mutex<Option<String>>,
}

impl DevProcessManager {
    pub fn new(detector: Arc<dyn ReadySignalDetector>, options: DevServerOptions) -> Self {
        let (state, _) = watch::channel(DevServerState {
            generation: 0,
            phase: ReadyPhase::Idle,
            pid: None,
        });

        Self {
            detector,
            options,
            state: Arc::new(state),
            process: Mutex::new(None),
            command: parking_lot::Mutex::new(None),
        }
    }

    pub fn state(&self) -> DevServerState {
        self.state.borrow().clone()
    }

    /// Build generation, incremented on every start
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    pub fn command(&self) -> Option<String> {
        self.command.lock().clone()
    }

    /// Spawn the dev process through the platform shell.
    ///
    /// Fails with `AlreadyRunning` if a process from an earlier call is
    /// still alive. A process that exited on its own is replaced.
    pub async fn start(&self, command: &str) -> Result<()> {
        let mut slot = self.process.lock().await;
        if let Some(running) = slot.take() {
            if !running.has_exited() {
                let pid = running.pid;
                *slot = Some(running);
                return Err(PrerenderError::AlreadyRunning(pid));
            }
            debug!(pid = ?running.pid, "replacing exited dev server");
            running.probe.abort();
        }

        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            state.phase = ReadyPhase::Starting;
            state.pid = None;
            generation = state.generation;
        });
        *self.command.lock() = Some(command.to_string());

        info!(command, generation, "starting dev server");

        let mut cmd = shell_command(command);
        if let Some(dir) = &self.options.working_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to spawn dev server '{}': {}", command, e);
                error!("{}", message);
                settle_failed(&self.state, generation, message.clone());
                return Err(PrerenderError::RenderEngineUnavailable(message));
            }
        };

        let pid = child.id();
        self.state.send_modify(|state| {
            if state.generation == generation {
                state.pid = pid;
            }
        });

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(scrape_output(
                stdout,
                false,
                self.detector.clone(),
                self.state.clone(),
                generation,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(scrape_output(
                stderr,
                true,
                self.detector.clone(),
                self.state.clone(),
                generation,
            )));
        }

        let probe = {
            let detector = self.detector.clone();
            let state = self.state.clone();
            tokio::spawn(async move {
                if let Some(url) = detector.probe().await {
                    settle_ready(&state, generation, url);
                }
            })
        };

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let exited = Arc::new(AtomicBool::new(false));
        let state = self.state.clone();
        let exit_flag = exited.clone();
        let exit = tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("failed to kill dev server: {}", e);
                    }
                    child.wait().await
                }
            };
            exit_flag.store(true, Ordering::SeqCst);

            // Let the readers drain so a ready line printed just before exit is not lost.
            for reader in readers {
                let _ = tokio::time::timeout(Duration::from_secs(1), reader).await;
            }

            let message = match status {
                Ok(status) => format!("dev server exited with {}", status),
                Err(e) => format!("failed to wait for dev server: {}", e),
            };
            warn!("{}", message);
            settle_failed(&state, generation, message);
        });

        *slot = Some(RunningProcess {
            generation,
            pid,
            kill: Some(kill_tx),
            exited,
            exit,
            probe,
        });

        info!(pid = ?pid, "dev server spawned");
        Ok(())
    }

    /// Wait for the ready URL of the current generation.
    ///
    /// Resolves immediately once settled; fails with
    /// `RenderEngineUnavailable` if the process exited, was stopped, never
    /// started, or did not report readiness within the startup timeout.
    pub async fn get_ready_url(&self) -> Result<String> {
        let mut rx = self.state.subscribe();
        let settled = tokio::time::timeout(
            self.options.startup_timeout,
            rx.wait_for(|state| state.phase != ReadyPhase::Starting),
        )
        .await;

        let state = match settled {
            Err(_) => {
                return Err(PrerenderError::RenderEngineUnavailable(format!(
                    "dev server not ready after {:?}",
                    self.options.startup_timeout
                )));
            }
            Ok(Err(_)) => {
                return Err(PrerenderError::RenderEngineUnavailable(
                    "dev server state closed".to_string(),
                ));
            }
            Ok(Ok(state)) => state.clone(),
        };

        match state.phase {
            ReadyPhase::Ready(url) => Ok(url),
            ReadyPhase::Failed(err) => Err(PrerenderError::RenderEngineUnavailable(err)),
            ReadyPhase::Idle | ReadyPhase::Starting => Err(PrerenderError::RenderEngineUnavailable(
                "dev server not started".to_string(),
            )),
        }
    }

    /// Terminate the dev process. Safe to call repeatedly.
    pub async fn stop(&self) -> Result<()> {
        let Some(mut running) = self.process.lock().await.take() else {
            return Ok(());
        };

        info!(pid = ?running.pid, "stopping dev server");

        self.state.send_modify(|state| {
            if state.generation == running.generation {
                state.phase = ReadyPhase::Failed("dev server stopped".to_string());
                state.pid = None;
            }
        });
        running.probe.abort();

        #[cfg(unix)]
        if let Some(pid) = running.pid.filter(|_| !running.has_exited()) {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!("SIGTERM to dev server group failed: {}", e);
            }
        }

        if tokio::time::timeout(self.options.stop_grace, &mut running.exit)
            .await
            .is_err()
        {
            warn!("dev server did not stop gracefully, forcing kill");
            if let Some(kill) = running.kill.take() {
                let _ = kill.send(());
            }
            let _ = running.exit.await;
        }

        info!("dev server stopped");
        Ok(())
    }

    /// Stop and start again with the last command, opening a new build generation
    pub async fn restart(&self) -> Result<()> {
        let command = self.command().ok_or_else(|| {
            PrerenderError::Configuration("dev server was never started".to_string())
        })?;
        self.stop().await?;
        self.start(&command).await
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

fn settle_ready(state: &watch::Sender<DevServerState>, generation: u64, url: String) {
    let settled = state.send_if_modified(|current| {
        if current.generation == generation && current.phase == ReadyPhase::Starting {
            current.phase = ReadyPhase::Ready(url.clone());
            true
        } else {
            false
        }
    });
    if settled {
        info!(url = %url, generation, "dev server ready");
    }
}

fn settle_failed(state: &watch::Sender<DevServerState>, generation: u64, message: String) {
    state.send_if_modified(|current| {
        let live = matches!(current.phase, ReadyPhase::Starting | ReadyPhase::Ready(_));
        if current.generation == generation && live {
            current.phase = ReadyPhase::Failed(message);
            current.pid = None;
            true
        } else {
            false
        }
    });
}

async fn scrape_output<R>(
    stream: R,
    is_stderr: bool,
    detector: Arc<dyn ReadySignalDetector>,
    state: Arc<watch::Sender<DevServerState>>,
    generation: u64,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("dev server output closed: {}", e);
                break;
            }
        }

        let raw = String::from_utf8_lossy(&buf);
        let line = strip_ansi(raw.trim_end());
        if is_stderr {
            warn!("[dev-server] {}", line);
        } else {
            debug!("[dev-server] {}", line);
        }

        if let Some(url) = detector.inspect_line(&line) {
            settle_ready(&state, generation, url);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ready::RegexReadyDetector;

    fn manager(startup_timeout: Duration) -> DevProcessManager {
        let detector = RegexReadyDetector::new(&[r"Local:\s+(?<url>https?://\S+)"]).unwrap();
        DevProcessManager::new(
            Arc::new(detector),
            DevServerOptions {
                startup_timeout,
                stop_grace: Duration::from_secs(2),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_idle_manager_is_unavailable() {
        let manager = manager(Duration::from_secs(1));
        assert_eq!(manager.state().phase, ReadyPhase::Idle);
        assert!(matches!(
            manager.get_ready_url().await,
            Err(PrerenderError::RenderEngineUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_ready_line_resolves_url() {
        let manager = manager(Duration::from_secs(10));
        manager
            .start("echo 'Building...'; echo 'Local:   http://localhost:4200/'; sleep 30")
            .await
            .unwrap();

        let url = manager.get_ready_url().await.unwrap();
        assert_eq!(url, "http://localhost:4200/");
        assert_eq!(manager.state().ready_url(), Some("http://localhost:4200/"));
        assert_eq!(manager.generation(), 1);

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_ready_line_on_stderr() {
        let manager = manager(Duration::from_secs(10));
        manager
            .start("echo 'Local: http://127.0.0.1:9999' >&2; sleep 30")
            .await
            .unwrap();
        assert_eq!(manager.get_ready_url().await.unwrap(), "http://127.0.0.1:9999");
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let manager = manager(Duration::from_secs(10));
        manager.start("sleep 30").await.unwrap();
        assert!(matches!(
            manager.start("sleep 30").await,
            Err(PrerenderError::AlreadyRunning(_))
        ));
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_after_process_exited() {
        let manager = manager(Duration::from_secs(10));
        manager.start("exit 3").await.unwrap();

        let err = manager.get_ready_url().await.unwrap_err();
        assert!(err.to_string().contains("exited"));

        manager
            .start("echo 'Local: http://localhost:4300'; sleep 30")
            .await
            .unwrap();
        assert_eq!(manager.generation(), 2);
        assert_eq!(manager.get_ready_url().await.unwrap(), "http://localhost:4300");

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_after_process_exited() {
        let manager = manager(Duration::from_secs(10));
        manager.start("exit 0").await.unwrap();
        assert!(manager.get_ready_url().await.is_err());

        tokio::time::timeout(Duration::from_secs(1), manager.stop())
            .await
            .expect("stop should not wait for the grace period")
            .unwrap();
        assert_eq!(manager.state().pid, None);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let manager = manager(Duration::from_secs(10));
        manager.stop().await.unwrap();

        manager.start("sleep 30").await.unwrap();
        manager.stop().await.unwrap();
        manager.stop().await.unwrap();

        assert_eq!(manager.state().last_error(), Some("dev server stopped"));
        assert!(manager.get_ready_url().await.is_err());
    }

    #[tokio::test]
    async fn test_restart_bumps_generation() {
        let manager = manager(Duration::from_secs(10));
        manager
            .start("echo 'Local: http://localhost:4200'; sleep 30")
            .await
            .unwrap();
        manager.get_ready_url().await.unwrap();

        manager.restart().await.unwrap();
        assert_eq!(manager.generation(), 2);
        assert_eq!(manager.get_ready_url().await.unwrap(), "http://localhost:4200");

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_without_start_fails() {
        let manager = manager(Duration::from_secs(1));
        assert!(matches!(
            manager.restart().await,
            Err(PrerenderError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_startup_timeout() {
        let manager = manager(Duration::from_millis(100));
        manager.start("sleep 30").await.unwrap();

        let err = manager.get_ready_url().await.unwrap_err();
        assert!(err.to_string().contains("not ready"));

        manager.stop().await.unwrap();
    }
}
