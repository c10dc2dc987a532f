pub mod backoff;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod receiver;
pub mod resolver;
pub mod retry;
pub mod session;

pub use config::LinkConfig;
pub use connection::{
    ChannelLink, Connection, Link, LinkAddress, SerialLink, SourceId, TcpLink, TxStats, UdpLink,
};
pub use dispatcher::CommandDispatcher;
pub use error::LinkError;
pub use resolver::{AckResolver, PendingCommand, ResolverStats};
pub use retry::{send_until_terminal, CommandOutcome, RetryPolicy};
pub use session::Session;
