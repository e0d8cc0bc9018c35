//! Public-key challenge.
//!
//! A fresh secret is encrypted to the registered key and sent as
//! `?K<n>:` followed by the ciphertext. The remote side must answer with
//! the plaintext secret, raw and unterminated.

use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use gosh_core::auth::{
    AuthMethod, AuthOutcome, encrypt_secret, generate_secret, parse_public_key, secrets_match,
};
use gosh_core::constants::SECRET_LEN;
use gosh_core::error::{Error, Result};
use gosh_core::protocol::{Packet, read_raw, write_raw};

/// Challenge the remote side with `pem` on behalf of `local_user`.
///
/// Only a closed or broken transport is an error; every other failure is
/// a retryable rejection.
pub(crate) async fn challenge<S>(stream: &mut S, pem: &[u8], local_user: &str) -> Result<AuthOutcome>
where
    S: AsyncBufRead + AsyncWrite + Unpin + Send,
{
    let rejected = AuthOutcome::Rejected { retryable: true };

    let key = match parse_public_key(pem) {
        Ok(key) => key,
        Err(e) => {
            warn!(user = %local_user, error = %e, "Unusable public key");
            return Ok(rejected);
        }
    };

    let secret = generate_secret();
    let ciphertext = match encrypt_secret(&key, &secret) {
        Ok(ciphertext) => ciphertext,
        Err(e) => {
            warn!(user = %local_user, error = %e, "Cannot encrypt challenge");
            return Ok(rejected);
        }
    };

    let mut frame = Packet::KeyChallenge(ciphertext.len()).encode()?;
    frame.extend_from_slice(&ciphertext);
    write_raw(stream, &frame).await?;
    debug!(user = %local_user, len = ciphertext.len(), "Sent key challenge");

    let reply = match read_raw(stream, SECRET_LEN).await {
        Ok(reply) => reply,
        Err(e @ (Error::ConnectionClosed | Error::Transport { .. })) => return Err(e),
        Err(e) => {
            warn!(user = %local_user, error = %e, "Cannot read challenge reply");
            return Ok(rejected);
        }
    };

    if secrets_match(&secret, &reply) {
        info!(user = %local_user, "Public key authentication succeeded");
        Ok(AuthOutcome::Accepted {
            principal: local_user.to_string(),
            method: AuthMethod::PublicKey,
        })
    } else {
        info!(user = %local_user, "Public key challenge answered incorrectly");
        Ok(rejected)
    }
}
