//! Retransmission policy for commands that must reach a final result.
//!
//! An unanswered command is resent with its confirmation count incremented.
//! TemporarilyRejected answers are retried after a backoff. Once the vehicle
//! reports InProgress the command is never resent; the helper keeps waiting
//! for the terminal ack instead.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use gcs_core::{AckResult, CommandAck, CommandInvocation};

use crate::backoff::Backoff;
use crate::dispatcher::CommandDispatcher;
use crate::error::LinkError;
use crate::resolver::AckResolver;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Transmissions allowed, including the first
    pub max_attempts: u32,
    /// Wait for each ack (and between InProgress reports)
    pub ack_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            ack_timeout: Duration::from_millis(1500),
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub command: u16,
    pub result: AckResult,
    pub attempts: u32,
    /// Last progress reported while InProgress
    pub progress: Option<u8>,
    pub result_param2: Option<i32>,
}

impl CommandOutcome {
    fn from_ack(ack: &CommandAck, attempts: u32, progress: Option<u8>) -> Self {
        Self {
            command: ack.command,
            result: ack.result,
            attempts,
            progress,
            result_param2: ack.result_param2,
        }
    }
}

/// Send `invocation` until the vehicle answers with a terminal result or the
/// policy is exhausted.
///
/// Terminal results other than TemporarilyRejected are returned as-is,
/// success or not. Running out of attempts without any answer is an
/// `AckTimeout`; a final TemporarilyRejected is returned as the outcome.
pub async fn send_until_terminal(
    dispatcher: &CommandDispatcher,
    resolver: &Arc<AckResolver>,
    invocation: &CommandInvocation,
    policy: &RetryPolicy,
) -> Result<CommandOutcome, LinkError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = Backoff::new(policy.backoff_base, policy.backoff_max);
    // Registered before the first send so a fast ack cannot be missed; acks
    // already held for this code answer some earlier transmission
    let mut pending = resolver.register_clean(invocation.command);
    let mut attempts = 0u32;

    loop {
        let confirmation = attempts.min(u8::MAX as u32) as u8;
        dispatcher
            .send(&invocation.clone().with_confirmation(confirmation))
            .await?;
        attempts += 1;

        let mut in_progress = false;
        let mut progress = None;
        let answer = loop {
            match pending.next(policy.ack_timeout).await {
                Ok(ack) if ack.result == AckResult::InProgress => {
                    if let Some(pct) = ack.progress {
                        tracing::debug!("Command {} in progress ({}%)", ack.command, pct);
                    }
                    in_progress = true;
                    progress = ack.progress.or(progress);
                }
                Ok(ack) => break Some(ack),
                Err(LinkError::AckTimeout { command, timeout }) => {
                    if in_progress {
                        // Already executing: resending would restart it
                        return Err(LinkError::AckTimeout { command, timeout });
                    }
                    break None;
                }
                Err(err) => return Err(err),
            }
        };

        match answer {
            Some(ack) if ack.result == AckResult::TemporarilyRejected && attempts < max_attempts => {
                let delay = backoff.failed();
                tracing::info!(
                    "Command {} temporarily rejected, retrying in {:?}",
                    ack.command,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Some(ack) => return Ok(CommandOutcome::from_ack(&ack, attempts, progress)),
            None if attempts < max_attempts => {
                tracing::warn!(
                    "No ack for command {} after attempt {}, retransmitting",
                    invocation.command,
                    attempts
                );
            }
            None => {
                return Err(LinkError::AckTimeout {
                    command: invocation.command,
                    timeout: policy.ack_timeout,
                })
            }
        }
    }
}
