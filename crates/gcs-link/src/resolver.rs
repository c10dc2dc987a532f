//! Acknowledgement resolver.
//!
//! Inbound COMMAND_ACKs are routed through a registry keyed by command code.
//! Callers register interest and receive every ack for that code until they
//! drop the registration. An ack nobody is waiting for is held for a short
//! while, so a caller that sends first and waits afterwards still sees it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use gcs_core::{AckResult, CommandAck};

use crate::error::LinkError;

/// Unclaimed acks kept per command code.
pub const UNCLAIMED_PER_COMMAND: usize = 4;
/// Age after which an unclaimed ack is discarded.
pub const UNCLAIMED_MAX_AGE: Duration = Duration::from_secs(3);

struct Waiter {
    id: u64,
    tx: mpsc::UnboundedSender<CommandAck>,
}

/// Registry of pending commands.
pub struct AckResolver {
    waiters: DashMap<u16, Vec<Waiter>>,
    /// Acks that arrived with no waiter, oldest first. Always locked after
    /// the `waiters` entry of the same code.
    unclaimed: DashMap<u16, VecDeque<(Instant, CommandAck)>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    acks_received: AtomicU64,
    acks_unmatched: AtomicU64,
    /// Unix millis, 0 when no ack has arrived
    last_ack_at: AtomicI64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolverStats {
    pub pending: usize,
    pub unclaimed: usize,
    pub acks_received: u64,
    pub acks_unmatched: u64,
    pub last_ack_at: Option<DateTime<Utc>>,
}

impl AckResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            waiters: DashMap::new(),
            unclaimed: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            acks_received: AtomicU64::new(0),
            acks_unmatched: AtomicU64::new(0),
            last_ack_at: AtomicI64::new(0),
        })
    }

    /// Register interest in acks for `command`, starting with any recent ack
    /// for it that nobody claimed yet. The registration is removed when the
    /// returned handle is dropped.
    pub fn register(self: &Arc<Self>, command: u16) -> PendingCommand {
        self.attach(command, true)
    }

    /// Register for acks that arrive from now on. Recent unclaimed acks for
    /// `command` are discarded: they answer an earlier transmission.
    pub fn register_clean(self: &Arc<Self>, command: u16) -> PendingCommand {
        self.attach(command, false)
    }

    fn attach(self: &Arc<Self>, command: u16, take_unclaimed: bool) -> PendingCommand {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // A closed resolver drops the sender right away: the handle reports
        // ResolverClosed on its first wait
        if !self.closed.load(Ordering::Acquire) {
            let mut waiters = self.waiters.entry(command).or_default();
            if let Some((_, backlog)) = self.unclaimed.remove(&command) {
                if take_unclaimed {
                    for (received_at, ack) in backlog {
                        if received_at.elapsed() <= UNCLAIMED_MAX_AGE {
                            let _ = tx.send(ack);
                        }
                    }
                }
            }
            waiters.push(Waiter { id, tx });
            drop(waiters);

            // close() may have cleared the map between the check and the push
            if self.closed.load(Ordering::Acquire) {
                self.deregister(command, id);
            }
        }

        PendingCommand {
            command,
            id,
            rx,
            resolver: Arc::clone(self),
        }
    }

    /// Wait for the next ack for `command` and classify it. An ack that
    /// arrived after the send but before this call is still seen.
    pub async fn await_ack(
        self: &Arc<Self>,
        command: u16,
        timeout: Duration,
    ) -> Result<AckResult, LinkError> {
        let mut pending = self.register(command);
        let ack = pending.next(timeout).await?;
        Ok(ack.result)
    }

    /// Deliver an inbound ack to every waiter registered for its command.
    /// Returns the number of waiters reached; an unmatched ack is held for
    /// the next registration.
    pub fn resolve(&self, ack: CommandAck) -> usize {
        self.acks_received.fetch_add(1, Ordering::Relaxed);
        self.last_ack_at
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);

        let mut waiters = self.waiters.entry(ack.command).or_default();
        waiters.retain(|waiter| waiter.tx.send(ack).is_ok());
        let delivered = waiters.len();

        if delivered == 0 && !self.closed.load(Ordering::Acquire) {
            self.acks_unmatched.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Holding unclaimed ack for command {} ({})",
                ack.command,
                ack.result
            );
            let now = Instant::now();
            let mut backlog = self.unclaimed.entry(ack.command).or_default();
            backlog.retain(|(received_at, _)| now.duration_since(*received_at) <= UNCLAIMED_MAX_AGE);
            if backlog.len() == UNCLAIMED_PER_COMMAND {
                backlog.pop_front();
            }
            backlog.push_back((now, ack));
        }
        drop(waiters);

        if delivered == 0 {
            self.waiters.remove_if(&ack.command, |_, waiters| waiters.is_empty());
        }
        delivered
    }

    /// Number of live registrations for `command`.
    pub fn pending(&self, command: u16) -> usize {
        self.waiters
            .get(&command)
            .map(|waiters| waiters.len())
            .unwrap_or(0)
    }

    /// Fail every current and future wait with `ResolverClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.waiters.clear();
        self.unclaimed.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ResolverStats {
        let last_ack_at = match self.last_ack_at.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::<Utc>::from_timestamp_millis(millis),
        };
        ResolverStats {
            pending: self.waiters.iter().map(|entry| entry.value().len()).sum(),
            unclaimed: self.unclaimed.iter().map(|entry| entry.value().len()).sum(),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            acks_unmatched: self.acks_unmatched.load(Ordering::Relaxed),
            last_ack_at,
        }
    }

    fn deregister(&self, command: u16, id: u64) {
        if let Some(mut waiters) = self.waiters.get_mut(&command) {
            waiters.retain(|waiter| waiter.id != id);
        }
        self.waiters.remove_if(&command, |_, waiters| waiters.is_empty());
    }
}

/// A registration for acks of one command code.
pub struct PendingCommand {
    command: u16,
    id: u64,
    rx: mpsc::UnboundedReceiver<CommandAck>,
    resolver: Arc<AckResolver>,
}

impl PendingCommand {
    pub fn command(&self) -> u16 {
        self.command
    }

    /// Next ack for this command. May be called repeatedly, e.g. to follow
    /// InProgress reports up to the final result.
    pub async fn next(&mut self, timeout: Duration) -> Result<CommandAck, LinkError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(ack)) => Ok(ack),
            Ok(None) => Err(LinkError::ResolverClosed),
            Err(_) => Err(LinkError::AckTimeout {
                command: self.command,
                timeout,
            }),
        }
    }

    /// An ack that already arrived, without waiting.
    pub fn try_next(&mut self) -> Option<CommandAck> {
        self.rx.try_recv().ok()
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        self.resolver.deregister(self.command, self.id);
    }
}

impl std::fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCommand")
            .field("command", &self.command)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ack_reaches_only_matching_waiter() {
        let resolver = AckResolver::new();
        let mut takeoff = resolver.register(22);
        let mut arm = resolver.register(400);

        assert_eq!(resolver.resolve(CommandAck::new(400, AckResult::Denied)), 1);

        assert!(takeoff.try_next().is_none());
        let ack = arm.next(Duration::from_millis(10)).await.unwrap();
        assert_eq!(ack.result, AckResult::Denied);
    }

    #[tokio::test]
    async fn test_same_code_waiters_all_receive() {
        let resolver = AckResolver::new();
        let mut first = resolver.register(22);
        let mut second = resolver.register(22);

        assert_eq!(resolver.resolve(CommandAck::new(22, AckResult::Accepted)), 2);
        assert!(first.try_next().is_some());
        assert!(second.try_next().is_some());
    }

    #[tokio::test]
    async fn test_registration_removed_on_drop() {
        let resolver = AckResolver::new();
        let pending = resolver.register(22);
        assert_eq!(resolver.pending(22), 1);

        drop(pending);
        assert_eq!(resolver.pending(22), 0);
        assert_eq!(resolver.resolve(CommandAck::new(22, AckResult::Accepted)), 0);
        assert_eq!(resolver.stats().acks_unmatched, 1);
    }

    #[tokio::test]
    async fn test_timeout_names_command() {
        let resolver = AckResolver::new();
        let err = resolver
            .await_ack(176, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::AckTimeout { command: 176, .. }));
        assert_eq!(resolver.pending(176), 0);
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let resolver = AckResolver::new();
        let mut pending = resolver.register(22);
        resolver.close();

        assert!(matches!(
            pending.next(Duration::from_secs(1)).await,
            Err(LinkError::ResolverClosed)
        ));
        assert!(matches!(
            resolver.await_ack(22, Duration::from_secs(1)).await,
            Err(LinkError::ResolverClosed)
        ));
    }

    #[tokio::test]
    async fn test_in_progress_then_terminal_on_one_registration() {
        let resolver = AckResolver::new();
        let mut pending = resolver.register(241);

        resolver.resolve(CommandAck::new(241, AckResult::InProgress).with_progress(50));
        resolver.resolve(CommandAck::new(241, AckResult::Accepted));

        let first = pending.next(Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.result, AckResult::InProgress);
        assert_eq!(first.progress, Some(50));
        let second = pending.next(Duration::from_millis(10)).await.unwrap();
        assert_eq!(second.result, AckResult::Accepted);
        assert!(resolver.stats().last_ack_at.is_some());
    }

    #[tokio::test]
    async fn test_ack_before_wait_is_claimed() {
        let resolver = AckResolver::new();
        assert_eq!(resolver.resolve(CommandAck::new(22, AckResult::Accepted)), 0);
        assert_eq!(resolver.stats().unclaimed, 1);

        let result = resolver
            .await_ack(22, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(result, AckResult::Accepted);
        assert_eq!(resolver.stats().unclaimed, 0);
    }

    #[tokio::test]
    async fn test_clean_registration_drops_earlier_acks() {
        let resolver = AckResolver::new();
        resolver.resolve(CommandAck::new(22, AckResult::Denied));

        let mut pending = resolver.register_clean(22);
        assert!(pending.try_next().is_none());
        assert_eq!(resolver.stats().unclaimed, 0);

        resolver.resolve(CommandAck::new(22, AckResult::Accepted));
        assert_eq!(pending.try_next().unwrap().result, AckResult::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclaimed_acks_expire() {
        let resolver = AckResolver::new();
        resolver.resolve(CommandAck::new(22, AckResult::Accepted));
        tokio::time::advance(UNCLAIMED_MAX_AGE + Duration::from_millis(1)).await;

        let err = resolver
            .await_ack(22, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::AckTimeout { command: 22, .. }));
    }

    #[tokio::test]
    async fn test_unclaimed_backlog_keeps_newest() {
        let resolver = AckResolver::new();
        for pct in 0..6u8 {
            resolver.resolve(CommandAck::new(241, AckResult::InProgress).with_progress(pct));
        }

        let mut pending = resolver.register(241);
        let mut seen = Vec::new();
        while let Some(ack) = pending.try_next() {
            seen.push(ack.progress.unwrap());
        }
        assert_eq!(seen.len(), UNCLAIMED_PER_COMMAND);
        assert_eq!(seen.last(), Some(&5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registrations_racing_close_end_closed() {
        let resolver = AckResolver::new();
        let mut tasks = Vec::new();
        for i in 0..64u16 {
            let resolver = Arc::clone(&resolver);
            tasks.push(tokio::spawn(async move {
                let mut pending = resolver.register(i % 8);
                pending.next(Duration::from_secs(5)).await
            }));
        }
        resolver.close();

        for task in tasks {
            assert!(matches!(task.await.unwrap(), Err(LinkError::ResolverClosed)));
        }
        assert_eq!(resolver.stats().pending, 0);
    }
}
