//! A console-backed connector for local development.
//!
//! Reads chat lines from stdin in the form
//!
//! ```text
//! <channel> <user[!roles]> <text...>
//! ```
//!
//! where `roles` is any combination of `b` (broadcaster), `m` (moderator),
//! `v` (vip) and `s` (subscriber), e.g. `lobby alice!m go go go`. Outbound
//! sends are printed and, like a real chat platform, echoed back as
//! inbound lines authored by the bot. Pings answer themselves.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use ziggurat_core::{
    ChatLine, Chatter, Connector, ConnectorEvent, RoleFlags, SendError, SendResult,
};

pub struct ConsoleConnector {
    bot_name: String,
    events: mpsc::Sender<ConnectorEvent>,
}

impl ConsoleConnector {
    pub fn new(bot_name: impl Into<String>, events: mpsc::Sender<ConnectorEvent>) -> Arc<Self> {
        Arc::new(Self {
            bot_name: bot_name.into(),
            events,
        })
    }

    /// Starts forwarding stdin lines as inbound chat. Ends when stdin
    /// closes.
    pub fn spawn_stdin_reader(&self) -> tokio::task::JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Some(chat) => {
                        if events.send(ConnectorEvent::Line(chat)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        warn!(line, "unparseable console line, expected '<channel> <user[!roles]> <text>'");
                    }
                }
            }
            debug!("console input closed");
        })
    }

    async fn echo(&self, channel: &str, text: &str) -> SendResult<()> {
        let line = ChatLine::new(channel, Chatter::plain(&self.bot_name), text);
        self.events
            .send(ConnectorEvent::Line(line))
            .await
            .map_err(|_| SendError::Closed)
    }
}

#[async_trait]
impl Connector for ConsoleConnector {
    fn bot_name(&self) -> &str {
        &self.bot_name
    }

    async fn send(&self, channel: &str, text: &str) -> SendResult<()> {
        println!("[#{channel}] {}: {text}", self.bot_name);
        // Platforms deliver the bot's own lines back; so does the console.
        self.echo(channel, text).await
    }

    async fn ping(&self, tag: &str) -> SendResult<()> {
        self.events
            .send(ConnectorEvent::Pong(tag.to_string()))
            .await
            .map_err(|_| SendError::Closed)
    }

    async fn join(&self, channel: &str) -> SendResult<()> {
        println!("* joined #{channel}");
        Ok(())
    }

    async fn part(&self, channel: &str) -> SendResult<()> {
        println!("* parted #{channel}");
        Ok(())
    }
}

/// Parses `<channel> <user[!roles]> <text...>`.
fn parse_line(line: &str) -> Option<ChatLine> {
    let mut parts = line.splitn(3, ' ');
    let channel = parts.next()?.trim();
    let author = parts.next()?.trim();
    let text = parts.next().unwrap_or("").to_string();
    if channel.is_empty() || author.is_empty() {
        return None;
    }

    let (name, roles) = match author.split_once('!') {
        Some((name, flags)) => (
            name,
            RoleFlags {
                broadcaster: flags.contains('b'),
                moderator: flags.contains('m'),
                vip: flags.contains('v'),
                subscriber: flags.contains('s'),
            },
        ),
        None => (author, RoleFlags::none()),
    };

    Some(ChatLine::new(channel, Chatter::new(name, roles), text))
}
