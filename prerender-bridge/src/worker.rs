//! Production rendering through a long-lived render worker.
//!
//! The prebuilt server module is loaded once into a child process (a
//! Node.js bootstrap by default). Requests and replies are
//! newline-delimited JSON on the worker's stdin/stdout, correlated by id,
//! so concurrent renders share the same worker:
//!
//! ```text
//! -> {"id":1,"requestUrl":"/about","absoluteBaseUrl":"http://localhost:5000"}
//! <- {"id":1,"result":{"html":"<h1>About</h1>","status":200}}
//! <- {"id":2,"error":"Error: boom"}
//! ```
//!
//! Stdout lines that are not replies are forwarded to the log.

use crate::renderer::Renderer;
use crate::{PrerenderError, RenderRequest, RenderResult, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{OnceCell, oneshot};
use tracing::{debug, error, info, warn};

/// Node.js bootstrap: imports the module given as last argument and serves render calls
const BOOTSTRAP_JS: &str = r#"
const { pathToFileURL } = require('url');
const readline = require('readline');
const modulePath = process.argv[process.argv.length - 1];
const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
console.log = (...args) => console.error(...args);
const ready = import(pathToFileURL(modulePath).href).then((mod) => {
  if (typeof mod.render === 'function') return mod.render;
  if (typeof mod.default === 'function') return mod.default;
  if (mod.default && typeof mod.default.render === 'function') return mod.default.render;
  throw new Error('module exports no render function: ' + modulePath);
});
ready.catch(() => {});
readline.createInterface({ input: process.stdin }).on('line', async (line) => {
  let id = null;
  try {
    const msg = JSON.parse(line);
    id = msg.id;
    const render = await ready;
    const out = await render({ requestUrl: msg.requestUrl, absoluteBaseUrl: msg.absoluteBaseUrl });
    send({ id, result: typeof out === 'string' ? { html: out } : out });
  } catch (err) {
    send({ id, error: String((err && err.stack) || err) });
  }
});
"#;

/// Program and arguments that start a render worker.
///
/// The module path is appended as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The Node.js bootstrap run by `node_path`
    pub fn node(node_path: impl Into<PathBuf>) -> Self {
        Self::new(node_path).arg("-e").arg(BOOTSTRAP_JS)
    }
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    id: u64,
    #[serde(flatten)]
    request: &'a RenderRequest,
}

/// Reply envelope; `result` is converted once the id is known so a
/// malformed payload still completes its render
#[derive(Deserialize)]
struct WorkerReply {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<RenderResult, String>>>>>;

/// A running render worker process
pub struct RenderWorker {
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: Pending,
    alive: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl RenderWorker {
    pub fn spawn(command: &WorkerCommand, module_path: &Path) -> Result<Arc<Self>> {
        info!(
            program = %command.program.display(),
            module = %module_path.display(),
            "starting render worker"
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .arg(module_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PrerenderError::RenderEngineUnavailable(format!(
                    "failed to spawn render worker '{}': {}",
                    command.program.display(),
                    e
                ))
            })?;

        let stdin = child.stdin.take();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        if let Some(stdout) = child.stdout.take() {
            let pending = pending.clone();
            let alive = alive.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => dispatch_reply(&pending, &line),
                        Ok(None) => break,
                        Err(e) => {
                            debug!("render worker output closed: {}", e);
                            break;
                        }
                    }
                }

                alive.store(false, Ordering::SeqCst);
                let orphans: Vec<_> = pending.lock().drain().collect();
                if !orphans.is_empty() {
                    error!(pending = orphans.len(), "render worker exited with renders in flight");
                }
                for (_, tx) in orphans {
                    let _ = tx.send(Err("render worker exited".to_string()));
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[render-worker] {}", line);
                }
            });
        }

        Ok(Arc::new(Self {
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(Some(child)),
            pending,
            alive,
            next_id: AtomicU64::new(1),
        }))
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<RenderResult> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut line = serde_json::to_vec(&WorkerRequest { id, request })?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        {
            // The output reader clears `alive` before draining under this lock,
            // so an entry inserted here is either drained or answered.
            let mut pending = self.pending.lock();
            if !self.is_alive() {
                return Err(PrerenderError::RenderEngineUnavailable(
                    "render worker is not running".to_string(),
                ));
            }
            pending.insert(id, tx);
        }

        if let Err(e) = self.write(&line).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(cause)) => Err(PrerenderError::RenderFailed { cause }),
            Err(_) => Err(PrerenderError::render_failed("render worker dropped the request")),
        }
    }

    async fn write(&self, line: &[u8]) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let pipe = stdin.as_mut().ok_or_else(|| {
            PrerenderError::RenderEngineUnavailable("render worker stdin closed".to_string())
        })?;
        pipe.write_all(line).await?;
        pipe.flush().await?;
        Ok(())
    }

    /// Close stdin and wait briefly for the worker to exit, then kill it
    pub async fn shutdown(&self) {
        self.stdin.lock().await.take();

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "render worker exited"),
            Ok(Err(e)) => warn!("failed to wait for render worker: {}", e),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("failed to kill render worker: {}", e);
                }
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        info!("render worker stopped");
    }
}

fn dispatch_reply(pending: &Pending, line: &str) {
    let reply = match serde_json::from_str::<WorkerReply>(line) {
        Ok(reply) => reply,
        Err(_) => {
            debug!("[render-worker] {}", line);
            return;
        }
    };

    let Some(tx) = pending.lock().remove(&reply.id) else {
        debug!(id = reply.id, "reply for unknown render");
        return;
    };

    let outcome = match (reply.result, reply.error) {
        (_, Some(serde_json::Value::String(error))) => Err(error),
        (_, Some(error)) if !error.is_null() => Err(error.to_string()),
        (Some(result), _) if !result.is_null() => serde_json::from_value::<RenderResult>(result)
            .map_err(|e| format!("malformed render result: {}", e)),
        _ => Err("render worker replied without result".to_string()),
    };
    let _ = tx.send(outcome);
}

/// Renders by calling a prebuilt server module in a render worker.
///
/// The worker is spawned on first use; concurrent first calls share the
/// same spawn.
pub struct ModuleRenderer {
    module_path: PathBuf,
    command: WorkerCommand,
    worker: OnceCell<Arc<RenderWorker>>,
}

impl ModuleRenderer {
    pub fn new(module_path: impl Into<PathBuf>, command: WorkerCommand) -> Self {
        Self {
            module_path: module_path.into(),
            command,
            worker: OnceCell::new(),
        }
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    async fn worker(&self) -> Result<&Arc<RenderWorker>> {
        self.worker
            .get_or_try_init(|| async { RenderWorker::spawn(&self.command, &self.module_path) })
            .await
    }
}

#[async_trait]
impl Renderer for ModuleRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResult> {
        self.worker().await?.render(request).await
    }

    async fn prepare(&self) -> Result<()> {
        self.worker().await.map(|_| ())
    }

    async fn shutdown(&self) {
        if let Some(worker) = self.worker.get() {
            worker.shutdown().await;
        }
    }
}
