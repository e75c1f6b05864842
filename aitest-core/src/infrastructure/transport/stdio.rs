//! Newline-delimited JSON-RPC over a child process's stdin/stdout.

use super::{Transport, server_request_reply};
use super::error::TransportError;
use super::pending::PendingRequests;
use crate::config::{ServerConfig, ServerEndpoint, TransportKind};
use crate::rpc::{Inbound, RpcRequest};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, info, warn};

pub struct StdioTransport {
    server: String,
    pending: PendingRequests,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    child: AsyncMutex<Option<Child>>,
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
    closed: AtomicBool,
    stop_grace: Duration,
}

impl StdioTransport {
    pub async fn spawn(config: &ServerConfig) -> Result<Self, TransportError> {
        let ServerEndpoint::Stdio {
            command: program,
            args,
            env,
            workdir,
        } = &config.endpoint
        else {
            return Err(TransportError::Connect {
                server: config.name.clone(),
                message: "server is not configured for the stdio transport".into(),
            });
        };

        let mut command = Command::new(program);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = workdir {
            command.current_dir(dir);
        }
        if !args.is_empty() {
            command.args(args);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            server: config.name.clone(),
            source,
        })?;
        let pid = child.id();
        info!(server = %config.name, pid, command = %program.display(), "Spawned MCP server");

        let io_error = |what: &str| TransportError::Io {
            server: config.name.clone(),
            message: format!("failed to capture server {what}"),
        };
        let stdin = child.stdin.take().ok_or_else(|| io_error("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| io_error("stdout"))?;
        let stderr = child.stderr.take();

        let pending = PendingRequests::new(&config.name);
        let exited = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(writer_loop(config.name.clone(), stdin, rx));
        tokio::spawn(reader_loop(
            config.name.clone(),
            stdout,
            pending.clone(),
            tx.downgrade(),
            Arc::clone(&exited),
        ));
        if let Some(stderr) = stderr {
            tokio::spawn(stderr_loop(config.name.clone(), stderr));
        }

        Ok(Self {
            server: config.name.clone(),
            pending,
            outbound: Mutex::new(Some(tx)),
            child: AsyncMutex::new(Some(child)),
            pid,
            exited,
            closed: AtomicBool::new(false),
            stop_grace: config.stop_grace,
        })
    }

    fn send_line<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        let encoded = serde_json::to_string(message).map_err(|source| TransportError::InvalidJson {
            server: self.server.clone(),
            source,
        })?;
        let outbound = self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = outbound.as_ref().ok_or_else(|| self.gone())?;
        sender.send(encoded).map_err(|_| self.gone())
    }

    fn gone(&self) -> TransportError {
        if self.exited.load(Ordering::SeqCst) {
            TransportError::Terminated {
                server: self.server.clone(),
            }
        } else {
            TransportError::Closed {
                server: self.server.clone(),
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.exited.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(self.gone());
        }
        let guard = self.pending.register().map_err(|_| self.gone())?;
        self.send_line(&RpcRequest::call(guard.id(), method, params))?;
        guard.wait().await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        self.send_line(&RpcRequest::notification(method, params))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pending.fail_all(|server| TransportError::Closed {
            server: server.to_string(),
        });
        // Dropping the sender ends the writer task, which closes stdin.
        self.outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        if let Ok(Some(status)) = child.try_wait() {
            debug!(server = %self.server, %status, "MCP server already exited");
            return;
        }

        request_shutdown(&self.server, self.pid);

        match tokio::time::timeout(self.stop_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.server, %status, "MCP server exited after shutdown request");
            }
            Ok(Err(err)) => {
                debug!(server = %self.server, %err, "failed to reap MCP server process");
            }
            Err(_) => {
                warn!(
                    server = %self.server,
                    grace_ms = self.stop_grace.as_millis() as u64,
                    "MCP server ignored shutdown request; killing"
                );
                if let Err(err) = child.kill().await {
                    debug!(
                        server = %self.server,
                        %err,
                        "failed to kill MCP server process (may have already exited)"
                    );
                }
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            || self.exited.load(Ordering::SeqCst)
            || self.pending.is_closed()
    }

    fn process_id(&self) -> Option<u32> {
        self.pid
    }
}

#[cfg(unix)]
fn request_shutdown(server: &str, pid: Option<u32>) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(server, pid, %err, "failed to deliver SIGTERM");
    }
}

// Without signals the grace period only covers servers that exit on stdin EOF.
#[cfg(not(unix))]
fn request_shutdown(_server: &str, _pid: Option<u32>) {}

async fn writer_loop(server: String, stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    let mut writer = BufWriter::new(stdin);
    while let Some(line) = rx.recv().await {
        if let Err(err) = write_frame(&mut writer, &line).await {
            debug!(server = %server, %err, "stdin closed while writing to MCP server");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_frame(writer: &mut BufWriter<ChildStdin>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn reader_loop(
    server: String,
    stdout: ChildStdout,
    pending: PendingRequests,
    replies: mpsc::WeakUnboundedSender<String>,
    exited: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stdout);
    let mut frame = Vec::new();
    loop {
        frame.clear();
        match reader.read_until(b'\n', &mut frame).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(server = %server, %err, "failed to read from MCP server stdout");
                break;
            }
        }
        let Ok(line) = std::str::from_utf8(&frame) else {
            debug!(
                server = %server,
                bytes = frame.len(),
                "skipping non-UTF-8 line from MCP server"
            );
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('\u{1b}') {
            debug!(
                server = %server,
                line = trimmed,
                "skipping non-JSON ANSI log line from MCP server"
            );
            continue;
        }
        let value = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => value,
            Err(source) => {
                debug!(server = %server, line = trimmed, %source, "skipping non-JSON line from MCP server");
                continue;
            }
        };
        match Inbound::classify(value) {
            Some(Inbound::Response { id, outcome }) => {
                pending.resolve(&id, outcome);
            }
            Some(Inbound::Request { id, method, .. }) => {
                let reply = server_request_reply(&server, id, &method);
                let Some(sender) = replies.upgrade() else {
                    continue;
                };
                if let Ok(encoded) = serde_json::to_string(&reply) {
                    let _ = sender.send(encoded);
                }
            }
            Some(Inbound::Notification { method, .. }) => {
                debug!(server = %server, %method, "received notification from server");
            }
            None => {}
        }
    }

    exited.store(true, Ordering::SeqCst);
    pending.fail_all(|server| TransportError::Terminated {
        server: server.to_string(),
    });
    debug!(server = %server, "MCP server stdout closed");
}

async fn stderr_loop(server: String, stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut frame = Vec::new();
    while let Ok(read) = reader.read_until(b'\n', &mut frame).await {
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&frame);
        debug!(server = %server, line = %line.trim_end(), "MCP server stderr");
        frame.clear();
    }
}
