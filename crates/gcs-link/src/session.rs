//! Session: one connection, its receive loop, a resolver and a dispatcher.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use gcs_core::{CommandCatalog, FlightMode, Target};

use crate::config::LinkConfig;
use crate::connection::{Connection, LinkAddress};
use crate::dispatcher::CommandDispatcher;
use crate::error::LinkError;
use crate::receiver::run_receive_loop;
use crate::resolver::AckResolver;
use crate::retry::{send_until_terminal, CommandOutcome, RetryPolicy};

pub struct Session {
    connection: Arc<Connection>,
    resolver: Arc<AckResolver>,
    dispatcher: CommandDispatcher,
    policy: RetryPolicy,
    shutdown_tx: broadcast::Sender<()>,
    receiver: JoinHandle<()>,
}

impl Session {
    /// Open the configured link and start receiving.
    pub async fn connect(config: &LinkConfig) -> Result<Self, LinkError> {
        let catalog = config.load_catalog()?;
        let address = LinkAddress::parse(&config.link)?;
        let connection = Connection::open(&address, config.source()).await?;
        Ok(Self::start(
            Arc::new(connection),
            Arc::new(catalog),
            config.target(),
            config.retry_policy(),
        ))
    }

    /// Wrap an open connection. Spawns the receive loop, so this must run
    /// inside a tokio runtime. Acks are only taken from `target`'s system.
    pub fn start(
        connection: Arc<Connection>,
        catalog: Arc<CommandCatalog>,
        target: Target,
        policy: RetryPolicy,
    ) -> Self {
        let resolver = AckResolver::new();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let receiver = tokio::spawn(run_receive_loop(
            Arc::clone(&connection),
            Arc::clone(&resolver),
            target.system_id,
            shutdown_rx,
        ));
        let dispatcher = CommandDispatcher::new(Arc::clone(&connection), catalog, target);

        Self {
            connection,
            resolver,
            dispatcher,
            policy,
            shutdown_tx,
            receiver,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn resolver(&self) -> &Arc<AckResolver> {
        &self.resolver
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send a named command and follow it to its final result.
    pub async fn command(&self, name: &str, args: &[f64]) -> Result<CommandOutcome, LinkError> {
        let invocation = self.dispatcher.prepare(name, args)?;
        send_until_terminal(&self.dispatcher, &self.resolver, &invocation, &self.policy).await
    }

    pub async fn set_mode(&self, mode: FlightMode) -> Result<CommandOutcome, LinkError> {
        tracing::info!("Requesting {} mode", mode);
        self.command("do_set_mode", &mode.set_mode_args()).await
    }

    pub async fn cancel(&self, command: u16) -> Result<(), LinkError> {
        self.dispatcher.cancel(command).await
    }

    /// Stop the receive loop and close the connection. Pending waits fail
    /// with `ResolverClosed`.
    pub async fn shutdown(self) {
        // The loop may already have exited on its own
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.receiver.await {
            tracing::warn!("Receive loop ended abnormally: {}", err);
        }
        self.connection.close();
    }
}
