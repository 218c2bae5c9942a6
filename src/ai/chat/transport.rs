//! The outbound side of a client connection.
use anyhow::{Error, Result, anyhow};
use tokio::sync::mpsc;

use super::models::ServerEvent;

/// Delivers events to exactly one connected client. An `Err` means the
/// client is gone and nothing further can be delivered.
///
/// Calls must not block: a session invokes them while holding its own
/// lock so that nothing is delivered after `ChatSession::stop` returns.
pub trait ClientTransport: Send + Sync {
    fn send(&self, fragment: &str) -> Result<(), Error>;
    fn notify_done(&self) -> Result<(), Error>;
    fn notify_error(&self, message: &str) -> Result<(), Error>;
}

/// Pushes events onto a channel that a connection's writer drains into
/// its socket.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn push(&self, event: ServerEvent) -> Result<(), Error> {
        self.tx
            .send(event)
            .map_err(|_| anyhow!("Client connection closed"))
    }
}

impl ClientTransport for ChannelTransport {
    fn send(&self, fragment: &str) -> Result<(), Error> {
        self.push(ServerEvent::Response {
            content: fragment.to_string(),
        })
    }

    fn notify_done(&self) -> Result<(), Error> {
        self.push(ServerEvent::Done)
    }

    fn notify_error(&self, message: &str) -> Result<(), Error> {
        self.push(ServerEvent::Error {
            message: message.to_string(),
        })
    }
}
