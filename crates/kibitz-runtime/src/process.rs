use crate::handle::{EngineHandle, HandleFactory, HandleState, StateCell};
use crate::prereq::check_engine_prereqs;
use crate::RuntimeError;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// How long a disposed engine may take to exit on its own before it is killed.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Runs an external UCI engine binary as a child process.
pub struct ProcessFactory {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessFactory {
    pub fn new(program: impl Into<PathBuf>, args: &[String]) -> Self {
        Self {
            program: program.into(),
            args: args.to_vec(),
        }
    }

    fn program_str(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl HandleFactory for ProcessFactory {
    fn name(&self) -> &str {
        "process"
    }

    fn available(&self) -> bool {
        check_engine_prereqs(&self.program_str()).is_empty()
    }

    fn spawn(&self) -> Result<Box<dyn EngineHandle>, RuntimeError> {
        let program = self.program_str();
        debug!("spawning engine process: {program}");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::SpawnFailed {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(RuntimeError::SpawnFailed {
                program,
                reason: "engine stdio was not captured".to_owned(),
            });
        };

        let state = StateCell::new(HandleState::Starting);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(write_input(stdin, input_rx, state.clone()));
        tokio::spawn(read_output(stdout, output_tx));
        tokio::spawn(supervise(child, kill_rx, state.clone(), program));

        Ok(Box::new(ProcessHandle {
            state,
            input: Mutex::new(Some(input_tx)),
            output: Mutex::new(Some(output_rx)),
            kill: Mutex::new(Some(kill_tx)),
        }))
    }
}

pub struct ProcessHandle {
    state: StateCell,
    input: Mutex<Option<mpsc::UnboundedSender<String>>>,
    output: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl EngineHandle for ProcessHandle {
    fn state(&self) -> HandleState {
        self.state.get()
    }

    fn take_output(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.output.lock().ok()?.take()
    }

    fn send(&self, command: &str) -> Result<(), RuntimeError> {
        let state = self.state.get();
        if state != HandleState::Ready {
            return Err(RuntimeError::NotRunning(state));
        }
        let input = self.input.lock().map_err(|_| RuntimeError::Closed)?;
        let tx = input.as_ref().ok_or(RuntimeError::Closed)?;
        debug!("engine <- {command}");
        tx.send(command.to_owned()).map_err(|_| RuntimeError::Closed)
    }

    fn dispose(&self) {
        self.state.set(HandleState::Disposed);
        if let Ok(mut input) = self.input.lock() {
            input.take();
        }
        if let Ok(mut kill) = self.kill.lock() {
            if let Some(tx) = kill.take() {
                let _ = tx.send(());
            }
        }
    }
}

async fn write_input(
    mut stdin: ChildStdin,
    mut commands: mpsc::UnboundedReceiver<String>,
    state: StateCell,
) {
    while let Some(command) = commands.recv().await {
        let line = format!("{command}\n");
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        if let Err(e) = written.await {
            warn!("engine stdin write failed: {e}");
            state.advance(HandleState::Error);
            break;
        }
    }
}

async fn read_output(stdout: ChildStdout, lines_tx: mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!("engine -> {line}");
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("engine stdout read failed: {e}");
                break;
            }
        }
    }
}

/// Owns the child: marks the handle ready once the process is running,
/// records unexpected exits, and enforces disposal.
async fn supervise(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    state: StateCell,
    program: String,
) {
    state.advance(HandleState::Ready);

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill => None,
    };

    match exited {
        Some(status) => {
            warn!("engine process {program} exited unexpectedly: {status:?}");
            state.advance(HandleState::Error);
        }
        None => {
            if tokio::time::timeout(EXIT_GRACE, child.wait()).await.is_err() {
                debug!("engine process {program} did not exit in time, killing");
                if let Err(e) = child.kill().await {
                    warn!("failed to kill engine process {program}: {e}");
                }
            }
        }
    }
}
