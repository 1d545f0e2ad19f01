//! Pattern handlers: triggered when the inbound text matches a regex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use ziggurat_core::{Context, Outcome};

use crate::bus::Bus;
use crate::handler::{run_guarded, Handler, TriggerFuture, TriggerResult};

/// The owned match handed to a pattern callback as its extra argument.
#[derive(Debug, Clone)]
pub struct TextMatch {
    /// The full matched text.
    pub text: String,
    /// Capture groups, in declaration order, excluding the implicit whole
    /// match.
    pub groups: Vec<Option<String>>,
}

/// The type-erased callback a pattern handler runs.
pub type PatternCallback =
    Arc<dyn Fn(Arc<Context>, TextMatch) -> TriggerFuture + Send + Sync>;

/// A handler triggered only when the inbound text matches its compiled
/// regular expression; the match is passed along to the callback.
pub struct PatternHandler {
    namespace: String,
    name: String,
    regex: Regex,
    callback: PatternCallback,
    registered: AtomicBool,
}

impl PatternHandler {
    pub fn new<F, Fut>(
        namespace: impl Into<String>,
        name: impl Into<String>,
        pattern: &str,
        callback: F,
    ) -> Result<Arc<Self>, regex::Error>
    where
        F: Fn(Arc<Context>, TextMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TriggerResult> + Send + 'static,
    {
        Ok(Arc::new(Self {
            namespace: namespace.into(),
            name: name.into(),
            regex: Regex::new(pattern)?,
            callback: Arc::new(move |ctx, m| Box::pin(callback(ctx, m))),
            registered: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl Handler for PatternHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn register(self: Arc<Self>, bus: &Bus) -> String {
        bus.add_passive(self.clone());
        self.registered.store(true, Ordering::SeqCst);
        format!("pattern = /{}/", self.regex)
    }

    fn unregister(self: Arc<Self>, bus: &Bus) {
        bus.remove_passive(&self.qualified_name());
        self.registered.store(false, Ordering::SeqCst);
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn actuate(self: Arc<Self>, ctx: Arc<Context>, _raw: &str) -> Outcome {
        let captures = match self.regex.captures(ctx.text()) {
            Some(captures) => captures,
            None => return Outcome::silent(),
        };
        let matched = TextMatch {
            text: captures
                .get(0)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            groups: captures
                .iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        };
        run_guarded((self.callback)(ctx, matched)).await
    }
}
