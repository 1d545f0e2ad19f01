//! The protocol-adapter interface to the chat platform.
//!
//! The dispatch core never reaches into a platform client's internals.
//! Everything it needs is expressed here: an event stream delivering
//! inbound lines and pong frames ([`ConnectorEvent`]), and a handful of
//! outbound primitives ([`Connector`]). Real platform clients, the console
//! harness and test mocks all implement the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::chat::ChatLine;
use crate::error::SendResult;

/// Events emitted by the platform connection.
#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    /// An inbound chat line, including the bot's own echoed lines.
    Line(ChatLine),
    /// A pong frame answering a tagged ping.
    Pong(String),
}

/// The narrow interface the bot consumes the chat platform through.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The bot's own login name on the platform.
    fn bot_name(&self) -> &str;

    /// Sends one text line to a channel.
    async fn send(&self, channel: &str, text: &str) -> SendResult<()>;

    /// Sends a tagged ping frame; the answering pong arrives as a
    /// [`ConnectorEvent::Pong`] carrying the same tag.
    async fn ping(&self, tag: &str) -> SendResult<()>;

    /// Joins a channel.
    async fn join(&self, channel: &str) -> SendResult<()>;

    /// Parts a channel.
    async fn part(&self, channel: &str) -> SendResult<()>;
}

/// A shared connector trait object.
pub type BoxedConnector = Arc<dyn Connector>;

// =============================================================================
// Pong routing
// =============================================================================

/// Routes tagged pong frames to whoever sent the matching ping.
///
/// The runtime resolves every [`ConnectorEvent::Pong`] through one of
/// these; probes register a tag before pinging and await the receiver
/// under their own timeout.
#[derive(Default)]
pub struct PongRouter {
    waiters: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl PongRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in a tag. The receiver fires when the matching
    /// pong arrives.
    pub fn register(&self, tag: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(tag.to_string(), tx);
        rx
    }

    /// Resolves a pong. Returns `false` for tags nobody is waiting on.
    pub fn resolve(&self, tag: &str) -> bool {
        match self.waiters.lock().remove(tag) {
            Some(tx) => tx.send(()).is_ok(),
            None => {
                debug!(tag, "pong with no registered waiter");
                false
            }
        }
    }

    /// Drops a registration, for probes that timed out on their own.
    pub fn forget(&self, tag: &str) {
        self.waiters.lock().remove(tag);
    }
}
