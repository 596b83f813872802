// ─── Server Process ───
// Spawns the server, relays its console, forwards operator input and
// guarantees the child never outlives its supervisor.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::console::{ConsoleLine, OutputSink, StreamKind};
use crate::core::error::{ServerError, ServerResult};
use crate::core::server::Server;

/// How long to wait for the output readers to hit EOF after the child exits.
/// Grandchildren that inherited the pipes could otherwise hold them open.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Program, arguments and working directory for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    /// `java -Xmx<max> -Xms<min> -jar <server>/server.jar nogui`, run inside
    /// the server directory.
    pub fn for_server(
        java: impl Into<PathBuf>,
        max_memory: &str,
        min_memory: &str,
        server: &Server,
    ) -> Self {
        Self {
            program: java.into(),
            args: vec![
                format!("-Xmx{max_memory}"),
                format!("-Xms{min_memory}"),
                "-jar".into(),
                server.server_jar().to_string_lossy().to_string(),
                "nogui".into(),
            ],
            working_dir: server.path.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit status 0.
    Clean,
    /// Any other status. `None` when the child was killed by a signal it
    /// did not receive from us.
    Abnormal { code: Option<i32> },
    /// Terminated by the supervisor after a host interrupt.
    Interrupted,
}

impl ExitOutcome {
    fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => ExitOutcome::Clean,
            code => ExitOutcome::Abnormal { code },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub outcome: ExitOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExitReport {
    pub fn is_clean(&self) -> bool {
        self.outcome == ExitOutcome::Clean
    }

    pub fn uptime(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(ExitOutcome),
}

/// Sole owner of a running child.
///
/// While armed, dropping the guard starts a kill, so every exit path of the
/// supervisor (return, `?`, panic, runtime shutdown) takes the child down.
/// Disarmed only once the child's exit has been observed.
struct ChildGuard {
    child: Child,
    armed: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self { child, armed: true }
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kill the child and reap it; returns once it is gone.
    async fn terminate(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.child.start_kill() {
            Ok(()) => warn!("Supervisor released a running server; process killed"),
            Err(e) => debug!("Child already gone on guard release: {}", e),
        }
    }
}

/// A launched server process: `Running` until [`supervise`](Self::supervise)
/// observes its exit, then `Exited` for good.
pub struct ServerProcess {
    guard: Option<ChildGuard>,
    state: ProcessState,
    started_at: DateTime<Utc>,
    pid: Option<u32>,
}

impl ServerProcess {
    /// Start the child with all three standard streams piped.
    pub fn launch(spec: &LaunchSpec) -> ServerResult<Self> {
        if !spec.working_dir.is_dir() {
            return Err(ServerError::Launch(format!(
                "working directory {:?} does not exist",
                spec.working_dir
            )));
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            "Command (copy/paste): {}",
            format_command_for_logs(&spec.program, &spec.args)
        );

        let child = cmd
            .spawn()
            .map_err(|e| ServerError::Launch(format!("{}: {}", spec.program.display(), e)))?;
        let pid = child.id();

        info!("Launched {:?} (PID {:?})", spec.program, pid);

        Ok(Self {
            guard: Some(ChildGuard::new(child)),
            state: ProcessState::Running,
            started_at: Utc::now(),
            pid,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    /// Relay output to `sink`, forward `input` lines to the child, and block
    /// until the child exits or `interrupt` resolves.
    ///
    /// On interrupt the child is killed and reaped before this returns. All
    /// output the child produced is delivered to the sink before the report.
    pub async fn supervise<I, S, F>(
        &mut self,
        input: I,
        sink: S,
        interrupt: F,
    ) -> ServerResult<ExitReport>
    where
        I: AsyncBufRead + Unpin,
        S: OutputSink,
        F: Future<Output = ()>,
    {
        let Some(guard) = self.guard.as_mut() else {
            return Err(ServerError::Other("server process has already exited".into()));
        };

        let (tx, rx) = mpsc::unbounded_channel::<ConsoleLine>();
        let readers = [
            guard
                .child
                .stdout
                .take()
                .map(|out| tokio::spawn(pump(out, StreamKind::Stdout, tx.clone()))),
            guard
                .child
                .stderr
                .take()
                .map(|err| tokio::spawn(pump(err, StreamKind::Stderr, tx.clone()))),
        ];
        drop(tx);
        let sink_task = tokio::spawn(drain_into(rx, sink));

        // Writes to the child's stdin happen on their own task: a child that
        // stops reading must not keep the loop from seeing an interrupt.
        let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();
        let writer = guard
            .child
            .stdin
            .take()
            .map(|stdin| tokio::spawn(write_input(stdin, input_rx)));
        let mut input_tx = Some(input_tx);
        let mut lines = input.lines();
        let mut input_open = true;
        tokio::pin!(interrupt);

        let outcome = loop {
            tokio::select! {
                status = guard.wait() => {
                    let status = status.map_err(|e| ServerError::Other(format!("waiting for server: {e}")))?;
                    break ExitOutcome::from_status(status);
                }
                _ = &mut interrupt => {
                    warn!("Interrupt received, terminating server (PID {:?})", self.pid);
                    guard.terminate().await.map_err(|e| {
                        ServerError::Other(format!("could not terminate server: {e}"))
                    })?;
                    break ExitOutcome::Interrupted;
                }
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => {
                        if input_tx.as_ref().is_some_and(|tx| tx.send(line).is_err()) {
                            debug!("Server stdin closed, input no longer forwarded");
                            input_tx = None;
                        }
                    }
                    Ok(None) => {
                        debug!("Operator input closed");
                        input_open = false;
                        input_tx = None;
                    }
                    Err(e) => {
                        warn!("Cannot read operator input: {}", e);
                        input_open = false;
                    }
                },
            }
        };

        guard.disarm();
        // Input still queued for an exited child is dropped
        drop(input_tx);
        if let Some(writer) = writer {
            writer.abort();
        }
        self.guard = None;
        self.state = ProcessState::Exited(outcome);

        for mut reader in readers.into_iter().flatten() {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
                .await
                .is_err()
            {
                warn!("Output reader still open after server exit, abandoning it");
                reader.abort();
            }
        }
        if let Err(e) = sink_task.await {
            error!("Console sink task failed: {}", e);
        }

        let report = ExitReport {
            outcome,
            started_at: self.started_at,
            finished_at: Utc::now(),
        };
        match outcome {
            ExitOutcome::Clean => info!("Server exited cleanly after {}s", report.uptime().num_seconds()),
            ExitOutcome::Abnormal { code } => error!("Server exited abnormally (code {:?})", code),
            ExitOutcome::Interrupted => info!("Server terminated by interrupt"),
        }
        Ok(report)
    }
}

/// Feed queued operator lines to the child until the queue closes or the
/// pipe breaks. Dropping `stdin` on return closes the child's input.
async fn write_input(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');

        let result = async {
            stdin.write_all(&bytes).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = result {
            debug!("Server stdin closed, input no longer forwarded: {}", e);
            return;
        }
    }
}

/// Read `reader` line by line until EOF. Invalid UTF-8 is replaced rather
/// than stopping the reader, which would stall the child on a full pipe.
async fn pump<R>(reader: R, stream: StreamKind, tx: mpsc::UnboundedSender<ConsoleLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                trace!("{} {}", stream.prefix(), text);
                if tx.send(ConsoleLine { stream, text }).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("{} reader stopped: {}", stream.prefix(), e);
                break;
            }
        }
    }
}

async fn drain_into<S: OutputSink>(mut rx: mpsc::UnboundedReceiver<ConsoleLine>, mut sink: S) {
    while let Some(line) = rx.recv().await {
        sink.emit(line);
    }
}

fn format_command_for_logs(program: &Path, args: &[String]) -> String {
    std::iter::once(shell_escape(&program.to_string_lossy()))
        .chain(args.iter().map(|a| shell_escape(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
