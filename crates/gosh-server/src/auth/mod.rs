//! Authentication engine.
//!
//! Runs at most one public-key challenge, falls back to the delegated
//! credential flow, and applies the root-login policy to whatever
//! principal comes out. The whole exchange is bounded by the login grace
//! time.

mod delegated;
mod pubkey;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use gosh_core::auth::{AuthMethod, AuthOutcome, CredentialProvider, KeyStore, lookup_key};
use gosh_core::error::Result;
use gosh_core::identity::{IdentityDirectory, lookup_identity};
use gosh_core::protocol::{Packet, write_packet};
use gosh_core::session::{KeyChallengeState, SessionContext};

/// Authentication settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Delegated attempts before `?X:`.
    pub max_tries: u32,
    /// Bound on the whole authentication exchange.
    pub login_grace_time: Duration,
    pub permit_root_login: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_tries: gosh_core::constants::DEFAULT_MAX_TRIES,
            login_grace_time: gosh_core::constants::DEFAULT_LOGIN_GRACE_TIME,
            permit_root_login: false,
        }
    }
}

/// Authenticates one connection.
#[derive(Clone)]
pub struct Authenticator {
    config: AuthConfig,
    keys: Arc<dyn KeyStore>,
    credentials: Arc<dyn CredentialProvider>,
    identities: Arc<dyn IdentityDirectory>,
}

impl Authenticator {
    pub fn new(
        config: AuthConfig,
        keys: Arc<dyn KeyStore>,
        credentials: Arc<dyn CredentialProvider>,
        identities: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            config,
            keys,
            credentials,
            identities,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticate the principal behind `stream`.
    ///
    /// `ctx` must already hold the negotiated users. On success via the
    /// delegated flow, `ctx.local_user` is set to the principal.
    ///
    /// `?T:` and `?X:` are written here; `?D` is left to the caller.
    pub async fn authenticate<S>(&self, stream: &mut S, ctx: &mut SessionContext) -> Result<AuthOutcome>
    where
        S: AsyncBufRead + AsyncWrite + Unpin + Send,
    {
        let deadline = Instant::now() + self.config.login_grace_time;
        self.authenticate_until(stream, ctx, deadline).await
    }

    /// Like [`authenticate`](Self::authenticate), bounded by `deadline`
    /// instead of a fresh grace period.
    pub async fn authenticate_until<S>(
        &self,
        stream: &mut S,
        ctx: &mut SessionContext,
        deadline: Instant,
    ) -> Result<AuthOutcome>
    where
        S: AsyncBufRead + AsyncWrite + Unpin + Send,
    {
        let outcome = match timeout_at(deadline, self.run_flows(stream, ctx)).await {
            Ok(result) => result?,
            Err(_) => return self.expire(stream, ctx).await,
        };

        match outcome {
            AuthOutcome::Accepted { principal, method } => {
                self.admit(ctx, principal, method).await
            }
            other => Ok(other),
        }
    }

    /// Report an elapsed grace period with `?T:`.
    pub async fn expire<S>(&self, stream: &mut S, ctx: &SessionContext) -> Result<AuthOutcome>
    where
        S: AsyncWrite + Unpin,
    {
        warn!(
            peer = %ctx.peer,
            grace_secs = self.config.login_grace_time.as_secs(),
            "Login grace time elapsed"
        );
        write_packet(stream, &Packet::Timeout).await?;
        Ok(AuthOutcome::TimedOut)
    }

    async fn run_flows<S>(&self, stream: &mut S, ctx: &mut SessionContext) -> Result<AuthOutcome>
    where
        S: AsyncBufRead + AsyncWrite + Unpin + Send,
    {
        if !ctx.local_user.is_empty() {
            match lookup_key(self.keys.clone(), &ctx.local_user, &ctx.remote_user).await {
                Ok(Some(pem)) => {
                    let outcome = pubkey::challenge(stream, &pem, &ctx.local_user).await?;
                    if outcome.is_accepted() {
                        ctx.key_state = KeyChallengeState::Succeeded;
                        return Ok(outcome);
                    }
                    ctx.key_state = KeyChallengeState::Failed;
                    debug!(peer = %ctx.peer, "Falling back to password authentication");
                }
                Ok(None) => ctx.key_state = KeyChallengeState::NoKey,
                Err(e) => {
                    warn!(user = %ctx.local_user, error = %e, "Key store lookup failed");
                    ctx.key_state = KeyChallengeState::NoKey;
                }
            }
        }

        delegated::run(stream, self.credentials.as_ref(), ctx, self.config.max_tries).await
    }

    async fn admit(
        &self,
        ctx: &mut SessionContext,
        principal: String,
        method: AuthMethod,
    ) -> Result<AuthOutcome> {
        let is_root = principal == "root"
            || lookup_identity(self.identities.clone(), &principal)
                .await?
                .is_some_and(|identity| identity.is_root());
        if is_root && !self.config.permit_root_login {
            warn!(peer = %ctx.peer, user = %principal, "Root login refused");
            return Ok(AuthOutcome::Rejected { retryable: false });
        }

        info!(peer = %ctx.peer, user = %principal, method = %method, "Authenticated");
        ctx.local_user = principal.clone();
        Ok(AuthOutcome::Accepted { principal, method })
    }
}
