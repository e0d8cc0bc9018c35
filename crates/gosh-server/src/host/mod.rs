//! Session host.
//!
//! Drives one connection through `Connected → Negotiating → Spawning →
//! Serving → Closed`: negotiates the context, authenticates, starts the
//! session process on a fresh PTY and forwards bytes until it exits.
//!
//! Teardown order is fixed: the process is reaped, forwarding is stopped,
//! the PTY is released and only then is the transport shut down.

mod login;

pub use login::bridge_login;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use gosh_core::auth::{AuthMethod, AuthOutcome, CredentialProvider, KeyStore};
use gosh_core::constants::{DEFAULT_LOGIN_PROGRAM, DEFAULT_PROMPT_TIMEOUT, DRAIN_TIMEOUT, KILL_GRACE};
use gosh_core::error::Result;
use gosh_core::identity::{Identity, IdentityDirectory, lookup_identity};
use gosh_core::platform::{
    LaunchSpec, ProcessExit, ProcessLauncher, ProcessSignal, PtyFactory, PtyPair, SessionProcess,
};
use gosh_core::protocol::{Packet, write_packet};
use gosh_core::session::{SessionContext, SessionPhase, SessionState};

use crate::auth::{AuthConfig, Authenticator};
use crate::forward::{ForwardStats, Forwarder};
use crate::negotiate::Negotiator;

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Program run when no shell can be started directly.
    pub login_program: PathBuf,
    /// Variables copied from the remote side.
    pub forward_env: Vec<String>,
    /// Time the login program gets to show each prompt.
    pub prompt_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_program: PathBuf::from(DEFAULT_LOGIN_PROGRAM),
            forward_env: vec!["TERM".to_string(), "LANG".to_string()],
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
        }
    }
}

/// Collaborators a host needs.
pub struct HostServices<P, L> {
    pub pty: P,
    pub launcher: L,
    pub identities: Arc<dyn IdentityDirectory>,
    pub keys: Arc<dyn KeyStore>,
    pub credentials: Arc<dyn CredentialProvider>,
}

/// What happened on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub peer: SocketAddr,
    /// Local user the session ran as, if authenticated.
    pub user: Option<String>,
    pub outcome: Option<AuthOutcome>,
    pub exit: Option<ProcessExit>,
    pub stats: ForwardStats,
}

impl SessionSummary {
    fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            user: None,
            outcome: None,
            exit: None,
            stats: ForwardStats::default(),
        }
    }
}

struct Spawned<M, C> {
    master: M,
    process: C,
}

/// Hosts sessions on the given platform.
pub struct SessionHost<P, L> {
    auth: Authenticator,
    negotiator: Negotiator,
    config: SessionConfig,
    pty: P,
    launcher: L,
    identities: Arc<dyn IdentityDirectory>,
}

impl<P, L> SessionHost<P, L>
where
    P: PtyFactory,
    L: ProcessLauncher<P::Slave>,
{
    pub fn new(auth: AuthConfig, config: SessionConfig, services: HostServices<P, L>) -> Self {
        let HostServices {
            pty,
            launcher,
            identities,
            keys,
            credentials,
        } = services;
        Self {
            auth: Authenticator::new(auth, keys, credentials, identities.clone()),
            negotiator: Negotiator::new(&config.forward_env),
            config,
            pty,
            launcher,
            identities,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Serve one connection to completion.
    ///
    /// The transport is always shut down and released before this returns.
    pub async fn serve<T>(&self, transport: T, peer: SocketAddr) -> Result<SessionSummary>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut state = SessionState::new();
        let mut ctx = SessionContext::new(peer);
        let mut summary = SessionSummary::new(peer);
        let mut stream = BufReader::new(transport);

        let spawned = match self.handshake(&mut stream, &mut state, &mut ctx, &mut summary).await {
            Ok(Some(spawned)) => spawned,
            Ok(None) => {
                close_transport(stream).await;
                state.close();
                return Ok(summary);
            }
            Err(e) => {
                warn!(peer = %peer, phase = %state.phase(), error = %e, "Session setup failed");
                if let Some(packet) = e.reply_packet() {
                    let _ = write_packet(&mut stream, &packet).await;
                }
                close_transport(stream).await;
                state.close();
                return Err(e);
            }
        };

        let result = self.supervise(stream, spawned, &mut summary).await;
        state.close();
        info!(
            peer = %peer,
            user = summary.user.as_deref().unwrap_or(""),
            duration_secs = state.age().as_secs(),
            "Session closed"
        );
        result.map(|()| summary)
    }

    async fn handshake<T>(
        &self,
        stream: &mut BufReader<T>,
        state: &mut SessionState,
        ctx: &mut SessionContext,
        summary: &mut SessionSummary,
    ) -> Result<Option<Spawned<P::Master, L::Process>>>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        state.transition(SessionPhase::Negotiating)?;
        // Negotiation and authentication share one grace period.
        let deadline = Instant::now() + self.auth.config().login_grace_time;
        let outcome = match timeout_at(deadline, self.negotiator.negotiate(stream, ctx)).await {
            Ok(negotiated) => {
                negotiated?;
                self.auth.authenticate_until(stream, ctx, deadline).await?
            }
            Err(_) => self.auth.expire(stream, ctx).await?,
        };

        summary.outcome = Some(outcome.clone());
        if let Some(err) = outcome.failure(self.auth.config().max_tries) {
            if err.is_fatal() {
                warn!(peer = %ctx.peer, error = %err, "Authentication did not complete");
            } else {
                info!(peer = %ctx.peer, error = %err, "Authentication rejected");
            }
            // Timeouts and exhaustion were already announced.
            if let Some(packet) = err.reply_packet() {
                write_packet(stream, &packet).await?;
            }
            return Ok(None);
        }
        let AuthOutcome::Accepted { method, .. } = outcome else {
            return Ok(None);
        };
        summary.user = Some(ctx.local_user.clone());

        state.transition(SessionPhase::Spawning)?;
        let mut spawned = self.spawn(ctx, method).await?;
        ctx.clear_password();

        if let Err(e) = write_packet(stream, &Packet::Done(true)).await {
            terminate(&mut spawned.process).await;
            return Err(e);
        }
        state.transition(SessionPhase::Serving)?;
        Ok(Some(spawned))
    }

    async fn spawn(
        &self,
        ctx: &SessionContext,
        method: AuthMethod,
    ) -> Result<Spawned<P::Master, L::Process>> {
        let identity = lookup_identity(self.identities.clone(), &ctx.local_user).await?;
        let PtyPair {
            mut master,
            slave,
            slave_name,
        } = self.pty.open()?;
        debug!(peer = %ctx.peer, tty = %slave_name, "Allocated PTY");

        let (spec, bridge) = match (method, identity) {
            (AuthMethod::PublicKey, Some(identity)) => (shell_spec(ctx, &identity), false),
            _ => (self.login_spec(ctx), !ctx.local_user.is_empty()),
        };

        let mut process = self.launcher.launch(slave, &spec)?;
        info!(
            peer = %ctx.peer,
            pid = process.id(),
            program = %spec.program.display(),
            uid = spec.uid,
            "Started session process"
        );

        if bridge {
            let bridged = bridge_login(
                &mut master,
                &ctx.local_user,
                ctx.password(),
                self.config.prompt_timeout,
            )
            .await;
            if let Err(e) = bridged {
                warn!(peer = %ctx.peer, error = %e, "Login program rejected bridged credentials");
                terminate(&mut process).await;
                return Err(e);
            }
        }

        Ok(Spawned { master, process })
    }

    fn login_spec(&self, ctx: &SessionContext) -> LaunchSpec {
        LaunchSpec {
            program: self.config.login_program.clone(),
            args: vec!["-h".to_string(), ctx.remote_host.clone()],
            uid: None,
            gid: None,
            cwd: PathBuf::from("/"),
            env: ctx.env().to_vec(),
        }
    }

    async fn supervise<T>(
        &self,
        stream: BufReader<T>,
        spawned: Spawned<P::Master, L::Process>,
        summary: &mut SessionSummary,
    ) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Spawned {
            master,
            mut process,
        } = spawned;
        let mut forwarder = Forwarder::start(stream, master);
        let mut hung_up = false;

        let exit = loop {
            tokio::select! {
                exit = process.wait() => break exit,
                _ = forwarder.inbound_closed(), if !hung_up => {
                    hung_up = true;
                    info!(peer = %summary.peer, "Remote side hung up");
                    if let Err(e) = process.signal(ProcessSignal::Hangup) {
                        warn!(error = %e, "Failed to deliver SIGHUP");
                    }
                }
            }
        };
        let exit = match exit {
            Ok(exit) => {
                info!(peer = %summary.peer, pid = process.id(), status = %exit, "Session process exited");
                summary.exit = Some(exit);
                Ok(())
            }
            Err(e) => {
                warn!(peer = %summary.peer, error = %e, "Waiting for session process failed");
                terminate(&mut process).await;
                Err(e)
            }
        };

        let (transport, master, stats) = forwarder.stop(DRAIN_TIMEOUT).await?;
        summary.stats = stats;
        drop(master);
        close_transport(transport).await;
        exit
    }
}

fn shell_spec(ctx: &SessionContext, identity: &Identity) -> LaunchSpec {
    let shell = identity.login_shell().to_path_buf();
    let mut env = ctx.env().to_vec();
    for (name, value) in [
        ("USER", identity.name.clone()),
        ("LOGNAME", identity.name.clone()),
        ("HOME", identity.home.display().to_string()),
        ("SHELL", shell.display().to_string()),
    ] {
        match env.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => env.push((name.to_string(), value)),
        }
    }

    LaunchSpec {
        program: shell,
        args: vec!["--login".to_string()],
        uid: Some(identity.uid),
        gid: Some(identity.gid),
        cwd: identity.home.clone(),
        env,
    }
}

/// Interrupt `process`, escalate to a kill after [`KILL_GRACE`], and reap it.
async fn terminate<C: SessionProcess>(process: &mut C) {
    if let Err(e) = process.signal(ProcessSignal::Interrupt) {
        debug!(error = %e, "Failed to interrupt session process");
    }
    if let Ok(Ok(exit)) = timeout(KILL_GRACE, process.wait()).await {
        debug!(status = %exit, "Session process exited after interrupt");
        return;
    }

    warn!(pid = process.id(), "Session process ignored interrupt, killing");
    if let Err(e) = process.signal(ProcessSignal::Kill) {
        warn!(error = %e, "Failed to kill session process");
    }
    match process.wait().await {
        Ok(exit) => debug!(status = %exit, "Session process killed"),
        Err(e) => warn!(error = %e, "Failed to reap session process"),
    }
}

async fn close_transport<T>(stream: BufReader<T>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut transport = stream.into_inner();
    if let Err(e) = transport.shutdown().await {
        debug!(error = %e, "Transport shutdown failed");
    }
}
