//! The per-invocation context handed to handler callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::chat::{ChatLine, Chatter};
use crate::connector::BoxedConnector;
use crate::error::SendResult;
use crate::privilege::Privilege;

/// Everything one handler invocation gets to see and touch.
///
/// Each triggered handler receives its own `Context`, so a reply-target
/// redirect or an output mute applies to that invocation only. The context
/// is shared across the invocation's async task through an `Arc`; the
/// mutable bits (reply target, mute flag) use interior mutability and are
/// never held across a suspension point.
pub struct Context {
    line: ChatLine,
    reply_channel: RwLock<String>,
    muted: AtomicBool,
    connector: BoxedConnector,
    operators: Arc<[String]>,
    dev: bool,
}

impl Context {
    pub fn new(
        line: ChatLine,
        connector: BoxedConnector,
        operators: Arc<[String]>,
        dev: bool,
    ) -> Self {
        Self {
            reply_channel: RwLock::new(line.channel.clone()),
            line,
            muted: AtomicBool::new(false),
            connector,
            operators,
            dev,
        }
    }

    /// The channel the line arrived in. Unaffected by redirects.
    pub fn channel(&self) -> &str {
        &self.line.channel
    }

    /// The channel replies currently go to.
    pub fn reply_channel(&self) -> String {
        self.reply_channel.read().clone()
    }

    /// The author of the inbound line.
    pub fn author(&self) -> &Chatter {
        &self.line.author
    }

    /// The raw text of the inbound line.
    pub fn text(&self) -> &str {
        &self.line.text
    }

    /// The caller's privilege, computed from role flags and the operator
    /// list. Not cached: contexts are per-invocation anyway.
    pub fn privilege(&self) -> Privilege {
        Privilege::of(&self.line.author, &self.operators)
    }

    /// Whether the line was authored by the bot itself (echoed or
    /// synthetic).
    pub fn is_self(&self) -> bool {
        self.line.author.name == self.connector.bot_name()
    }

    /// Swaps the reply target for this invocation only.
    pub fn redirect(&self, channel: impl Into<String>) {
        let channel = channel.into();
        debug!(from = %self.line.channel, to = %channel, "reply target redirected");
        *self.reply_channel.write() = channel;
    }

    /// Discards all further outbound sends for this invocation. The
    /// computed outcome code is unaffected.
    pub fn mute(&self) {
        self.muted.store(true, Ordering::SeqCst);
    }

    /// Whether outbound sends are currently discarded.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Sends one line to the current reply target, honouring the mute
    /// flag and the dev-environment marker.
    pub async fn say(&self, text: &str) -> SendResult<()> {
        if self.is_muted() {
            debug!(channel = %self.reply_channel(), "send discarded (muted)");
            return Ok(());
        }
        let decorated = if self.dev { decorate(text) } else { text.to_string() };
        self.connector.send(&self.reply_channel(), &decorated).await
    }

    /// The platform connector, for handlers that need more than `say`.
    pub fn connector(&self) -> &BoxedConnector {
        &self.connector
    }
}

/// Marks dev-environment output so it is never mistaken for the real bot.
/// Slash commands keep their command word in front.
fn decorate(text: &str) -> String {
    if let Some(rest) = text.strip_prefix('/') {
        match rest.split_once(' ') {
            Some((cmd, tail)) => format!("/{cmd} \u{1f527} {tail}"),
            None => format!("/{rest} \u{1f527}"),
        }
    } else {
        format!("\u{1f527} {text}")
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("channel", &self.line.channel)
            .field("author", &self.line.author.name)
            .field("reply_channel", &self.reply_channel())
            .field("muted", &self.is_muted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::RoleFlags;
    use crate::error::SendResult;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct RecordingConnector {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingConnector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl crate::connector::Connector for RecordingConnector {
        fn bot_name(&self) -> &str {
            "zigbot"
        }

        async fn send(&self, channel: &str, text: &str) -> SendResult<()> {
            self.sent.lock().push((channel.to_string(), text.to_string()));
            Ok(())
        }

        async fn ping(&self, _tag: &str) -> SendResult<()> {
            Ok(())
        }

        async fn join(&self, _channel: &str) -> SendResult<()> {
            Ok(())
        }

        async fn part(&self, _channel: &str) -> SendResult<()> {
            Ok(())
        }
    }

    fn context(connector: Arc<RecordingConnector>, dev: bool) -> Context {
        let line = ChatLine::new("lobby", Chatter::plain("alice"), "hello");
        Context::new(line, connector, Arc::from(Vec::<String>::new()), dev)
    }

    #[tokio::test]
    async fn say_targets_reply_channel() {
        let connector = RecordingConnector::new();
        let ctx = context(connector.clone(), false);
        ctx.say("hi").await.unwrap();
        ctx.redirect("other");
        ctx.say("there").await.unwrap();
        let sent = connector.sent.lock();
        assert_eq!(sent[0], ("lobby".to_string(), "hi".to_string()));
        assert_eq!(sent[1], ("other".to_string(), "there".to_string()));
    }

    #[tokio::test]
    async fn mute_discards_sends() {
        let connector = RecordingConnector::new();
        let ctx = context(connector.clone(), false);
        ctx.mute();
        ctx.say("nothing").await.unwrap();
        assert!(connector.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn dev_marker_keeps_slash_commands_in_front() {
        let connector = RecordingConnector::new();
        let ctx = context(connector.clone(), true);
        ctx.say("/me waves").await.unwrap();
        let sent = connector.sent.lock();
        assert!(sent[0].1.starts_with("/me "));
    }
}
