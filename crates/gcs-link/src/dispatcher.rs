//! Command dispatcher.
//!
//! Turns named commands into invocations through the catalog and transmits
//! them. Sending never waits for an acknowledgement; pair it with the
//! resolver (or [`crate::retry`]) for outcomes.

use std::sync::Arc;

use gcs_core::{
    build_message, CommandCancel, CommandCatalog, CommandInvocation, Encoder, FlightMode,
    Message, Target,
};

use crate::connection::Connection;
use crate::error::LinkError;

const SET_MODE_COMMAND: &str = "do_set_mode";

#[derive(Clone)]
pub struct CommandDispatcher {
    connection: Arc<Connection>,
    catalog: Arc<CommandCatalog>,
    encoder: Encoder,
}

impl CommandDispatcher {
    pub fn new(connection: Arc<Connection>, catalog: Arc<CommandCatalog>, target: Target) -> Self {
        Self {
            connection,
            catalog,
            encoder: Encoder::new(target),
        }
    }

    pub fn target(&self) -> Target {
        self.encoder.target()
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Transmit one invocation as COMMAND_LONG or COMMAND_INT.
    pub async fn send(&self, invocation: &CommandInvocation) -> Result<(), LinkError> {
        let message = build_message(invocation);
        tracing::debug!(
            "Sending command {} to {}/{} via message {} (confirmation {})",
            invocation.command,
            invocation.target.system_id,
            invocation.target.component_id,
            message.message_id(),
            invocation.confirmation
        );
        self.connection.send_message(&message).await
    }

    /// Encode a named command for the session target without sending it.
    pub fn prepare(&self, name: &str, args: &[f64]) -> Result<CommandInvocation, LinkError> {
        let definition = self.catalog.lookup(name)?;
        Ok(self.encoder.encode(definition, args)?)
    }

    /// Encode a command by numeric code without sending it.
    pub fn prepare_code(&self, code: u16, args: &[f64]) -> Result<CommandInvocation, LinkError> {
        let definition = self.catalog.lookup_code(code)?;
        Ok(self.encoder.encode(definition, args)?)
    }

    /// Look up, encode and send a named command. Returns what was sent.
    pub async fn send_named(
        &self,
        name: &str,
        args: &[f64],
    ) -> Result<CommandInvocation, LinkError> {
        let invocation = self.prepare(name, args)?;
        self.send(&invocation).await?;
        Ok(invocation)
    }

    pub async fn send_code(&self, code: u16, args: &[f64]) -> Result<CommandInvocation, LinkError> {
        let invocation = self.prepare_code(code, args)?;
        self.send(&invocation).await?;
        Ok(invocation)
    }

    /// Ask the target to abort a long-running command. Best effort: the
    /// vehicle may already be done, which is not an error here.
    pub async fn cancel(&self, command: u16) -> Result<(), LinkError> {
        let target = self.target();
        tracing::info!("Cancelling command {}", command);
        self.connection
            .send_message(&Message::CommandCancel(CommandCancel {
                target_system: target.system_id,
                target_component: target.component_id,
                command,
            }))
            .await
    }

    /// Switch flight mode with DO_SET_MODE.
    pub async fn set_mode(&self, mode: FlightMode) -> Result<CommandInvocation, LinkError> {
        tracing::info!("Requesting {} mode", mode);
        self.send_named(SET_MODE_COMMAND, &mode.set_mode_args()).await
    }
}
