//! Passive handlers: triggered unconditionally on every inbound line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use ziggurat_core::{Context, Outcome};

use crate::bus::Bus;
use crate::handler::{run_guarded, Handler, TriggerFuture, TriggerResult};

/// The type-erased callback a passive handler runs.
pub type PassiveCallback =
    Arc<dyn Fn(Arc<Context>) -> TriggerFuture + Send + Sync>;

/// A handler the bus triggers for every qualifying inbound line, with no
/// alias and no argument parsing. The pyramid observer is one of these.
pub struct PassiveHandler {
    namespace: String,
    name: String,
    callback: PassiveCallback,
    registered: AtomicBool,
}

impl PassiveHandler {
    pub fn new<F, Fut>(
        namespace: impl Into<String>,
        name: impl Into<String>,
        callback: F,
    ) -> Arc<Self>
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TriggerResult> + Send + 'static,
    {
        Arc::new(Self {
            namespace: namespace.into(),
            name: name.into(),
            callback: Arc::new(move |ctx| Box::pin(callback(ctx))),
            registered: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Handler for PassiveHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn register(self: Arc<Self>, bus: &Bus) -> String {
        bus.add_passive(self.clone());
        self.registered.store(true, Ordering::SeqCst);
        "on every line".to_string()
    }

    fn unregister(self: Arc<Self>, bus: &Bus) {
        bus.remove_passive(&self.qualified_name());
        self.registered.store(false, Ordering::SeqCst);
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn actuate(self: Arc<Self>, ctx: Arc<Context>, _raw: &str) -> Outcome {
        run_guarded((self.callback)(ctx)).await
    }
}
