//! Shared fixtures for this crate's unit tests.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tower::util::{service_fn, BoxCloneSyncService};

use ziggurat_core::{
    ChatLine, Chatter, Connector, Context, Outcome, RoleFlags, SendResult,
};

use crate::middleware::{GateService, Invocation};

/// A connector that records every send instead of talking to a platform.
pub struct RecordingConnector {
    name: String,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            name: "zigbot".to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    fn bot_name(&self) -> &str {
        &self.name
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

/// A context for a line authored in `channel` by `author` with the given
/// roles, backed by a throwaway recording connector.
pub fn context_with_author(
    channel: &str,
    author: &str,
    roles: RoleFlags,
) -> Arc<Context> {
    context_on(RecordingConnector::new(), channel, author, roles, &[])
}

/// Same, but on a caller-supplied connector and operator list.
pub fn context_on(
    connector: Arc<RecordingConnector>,
    channel: &str,
    author: &str,
    roles: RoleFlags,
    operators: &[&str],
) -> Arc<Context> {
    let line = ChatLine::new(channel, Chatter::new(author, roles), "");
    let operators: Vec<String> = operators.iter().map(|s| s.to_string()).collect();
    Arc::new(Context::new(line, connector, Arc::from(operators), false))
}

/// A base trigger service that always succeeds with `Outcome::ok()`.
pub fn noop_service() -> GateService {
    BoxCloneSyncService::new(service_fn(|_inv: Invocation| {
        std::future::ready(Ok::<_, Infallible>(Outcome::ok()))
    }))
}
