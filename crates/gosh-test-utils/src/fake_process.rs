//! Fake session processes driven by scripted behaviors.
//!
//! Each launched process runs as a tokio task talking to the slave side of a
//! [`FakePtyFactory`](crate::FakePtyFactory) pair.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{mpsc, watch};

use gosh_core::error::{Error, Result};
use gosh_core::platform::{LaunchSpec, ProcessExit, ProcessLauncher, ProcessSignal, SessionProcess};

use crate::event_log::{Event, EventLog};
use crate::fake_pty::FakeSlave;

const SIGHUP: i32 = 1;
const SIGINT: i32 = 2;
const SIGKILL: i32 = 9;

/// What a fake process does once started.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Exit with `code` without touching the terminal.
    ExitImmediately(i32),
    /// Write `data` to the terminal, then exit 0.
    Output(Vec<u8>),
    /// Echo input back until Ctrl-D (`0x04`) or EOF, then exit 0.
    Echo,
    /// Behave like `login`: prompt for user and password, then echo.
    ///
    /// Wrong credentials print `Login incorrect` and exit 1.
    Login { user: String, password: String },
    /// Print `prompt` and wait forever.
    Prompt {
        prompt: String,
        /// Keep running when interrupted.
        ignore_interrupt: bool,
    },
}

impl FakeBehavior {
    fn ignores_interrupt(&self) -> bool {
        matches!(
            self,
            FakeBehavior::Prompt {
                ignore_interrupt: true,
                ..
            }
        )
    }
}

#[derive(Debug, Default)]
struct LauncherState {
    launches: Mutex<Vec<LaunchSpec>>,
    signals: Arc<Mutex<Vec<ProcessSignal>>>,
    terminal_input: Arc<Mutex<Vec<String>>>,
    next_pid: AtomicU32,
    fail: AtomicBool,
}

/// Launcher starting [`FakeProcess`]es.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    behavior: FakeBehavior,
    state: Arc<LauncherState>,
    log: EventLog,
}

impl FakeLauncher {
    /// Create a launcher whose processes follow `behavior`.
    pub fn new(behavior: FakeBehavior, log: EventLog) -> Self {
        Self {
            behavior,
            state: Arc::default(),
            log,
        }
    }

    /// Make every subsequent launch fail.
    pub fn fail_launch(&self) {
        self.state.fail.store(true, Ordering::SeqCst);
    }

    /// Specs of every launched process, in order.
    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.state.launches.lock().unwrap().clone()
    }

    /// Signals delivered to launched processes, in order.
    pub fn signals(&self) -> Vec<ProcessSignal> {
        self.state.signals.lock().unwrap().clone()
    }

    /// Lines a [`FakeBehavior::Login`] process read from its terminal.
    pub fn terminal_input(&self) -> Vec<String> {
        self.state.terminal_input.lock().unwrap().clone()
    }
}

impl ProcessLauncher<FakeSlave> for FakeLauncher {
    type Process = FakeProcess;

    fn launch(&self, slave: FakeSlave, spec: &LaunchSpec) -> Result<FakeProcess> {
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(Error::Process {
                message: format!("cannot execute {}", spec.program.display()),
            });
        }

        self.state.launches.lock().unwrap().push(spec.clone());
        self.log.record(Event::ProcessStarted);

        let pid = 1000 + self.state.next_pid.fetch_add(1, Ordering::SeqCst);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(run(
            self.behavior.clone(),
            slave.stream,
            signal_rx,
            exit_tx,
            self.state.terminal_input.clone(),
        ));

        Ok(FakeProcess {
            pid,
            signal_tx,
            exit_rx,
            signals: self.state.signals.clone(),
            reaped: false,
            log: self.log.clone(),
        })
    }
}

/// Handle to a running fake process.
#[derive(Debug)]
pub struct FakeProcess {
    pid: u32,
    signal_tx: mpsc::UnboundedSender<ProcessSignal>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    signals: Arc<Mutex<Vec<ProcessSignal>>>,
    reaped: bool,
    log: EventLog,
}

impl FakeProcess {
    fn reap(&mut self, exit: ProcessExit) -> ProcessExit {
        if !self.reaped {
            self.reaped = true;
            self.log.record(Event::ProcessReaped);
        }
        exit
    }
}

#[async_trait]
impl SessionProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn signal(&mut self, signal: ProcessSignal) -> Result<()> {
        self.signals.lock().unwrap().push(signal);
        // A finished script no longer listens; the signal is a no-op then.
        let _ = self.signal_tx.send(signal);
        Ok(())
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        loop {
            let current = *self.exit_rx.borrow_and_update();
            if let Some(exit) = current {
                return Ok(self.reap(exit));
            }
            self.exit_rx.changed().await.map_err(|_| Error::Process {
                message: "fake process vanished".to_string(),
            })?;
        }
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        let current = *self.exit_rx.borrow();
        Ok(current.map(|exit| self.reap(exit)))
    }
}

async fn run(
    behavior: FakeBehavior,
    slave: DuplexStream,
    mut signals: mpsc::UnboundedReceiver<ProcessSignal>,
    exit: watch::Sender<Option<ProcessExit>>,
    terminal_input: Arc<Mutex<Vec<String>>>,
) {
    let ignore_interrupt = behavior.ignores_interrupt();
    let status = {
        let script = script(behavior, slave, terminal_input);
        tokio::pin!(script);
        loop {
            tokio::select! {
                status = &mut script => break status,
                Some(signal) = signals.recv() => match signal {
                    ProcessSignal::Interrupt if ignore_interrupt => continue,
                    ProcessSignal::Interrupt => break ProcessExit::signaled(SIGINT),
                    ProcessSignal::Hangup => break ProcessExit::signaled(SIGHUP),
                    ProcessSignal::Kill => break ProcessExit::signaled(SIGKILL),
                },
            }
        }
    };
    let _ = exit.send(Some(status));
}

async fn script(
    behavior: FakeBehavior,
    slave: DuplexStream,
    terminal_input: Arc<Mutex<Vec<String>>>,
) -> ProcessExit {
    match behavior {
        FakeBehavior::ExitImmediately(code) => ProcessExit::code(code),
        FakeBehavior::Output(data) => {
            let mut slave = slave;
            let _ = slave.write_all(&data).await;
            ProcessExit::code(0)
        }
        FakeBehavior::Echo => echo(BufReader::new(slave)).await,
        FakeBehavior::Login { user, password } => {
            let mut term = BufReader::new(slave);
            let Some(given_user) = prompt_line(&mut term, "fakehost login: ").await else {
                return ProcessExit::code(1);
            };
            let Some(given_password) = prompt_line(&mut term, "Password: ").await else {
                return ProcessExit::code(1);
            };
            terminal_input
                .lock()
                .unwrap()
                .extend([given_user.clone(), given_password.clone()]);

            if given_user != user || given_password != password {
                let _ = term.get_mut().write_all(b"\r\nLogin incorrect\r\n").await;
                return ProcessExit::code(1);
            }
            let _ = term.get_mut().write_all(b"Welcome\r\n").await;
            echo(term).await
        }
        FakeBehavior::Prompt { prompt, .. } => {
            let mut slave = slave;
            let _ = slave.write_all(prompt.as_bytes()).await;
            std::future::pending::<()>().await;
            ProcessExit::code(0)
        }
    }
}

async fn prompt_line(term: &mut BufReader<DuplexStream>, prompt: &str) -> Option<String> {
    term.get_mut().write_all(prompt.as_bytes()).await.ok()?;
    let mut line = String::new();
    match term.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

async fn echo(mut term: BufReader<DuplexStream>) -> ProcessExit {
    let mut buf = [0u8; 1024];
    loop {
        let n = match term.read(&mut buf).await {
            Ok(0) | Err(_) => return ProcessExit::code(0),
            Ok(n) => n,
        };
        let chunk = &buf[..n];
        let (data, done) = match chunk.iter().position(|&b| b == 0x04) {
            Some(i) => (&chunk[..i], true),
            None => (chunk, false),
        };
        if term.get_mut().write_all(data).await.is_err() || done {
            return ProcessExit::code(0);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
