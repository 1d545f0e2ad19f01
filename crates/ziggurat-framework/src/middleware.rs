//! Gate middleware around a handler's trigger path.
//!
//! Each policy wraps the trigger service and preserves its contract: the
//! service returns an [`Outcome`] and never errors. Policies are tower
//! [`Layer`]s stacked in declaration order (first declared is outermost)
//! over a boxed service, so any number may compose:
//!
//! ```rust,ignore
//! CommandHandler::builder("pyramid", "setprofile")
//!     .restrict(Privilege::Moderator)          // outermost
//!     .cooldown(Duration::from_secs(10))       // then this
//!     .handler(set_profile)                    // innermost trigger
//! ```
//!
//! A refused invocation short-circuits to [`Outcome::silent`]: no output,
//! no log escalation beyond debug.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::time::Instant;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use tracing::debug;

use ziggurat_core::{Context, Outcome, Privilege};

use crate::args::BoundArgs;

/// One request travelling down a handler's trigger path.
#[derive(Clone)]
pub struct Invocation {
    pub ctx: Arc<Context>,
    pub args: BoundArgs,
}

/// The boxed, cloneable trigger service every gate wraps.
pub type GateService = BoxCloneSyncService<Invocation, Outcome, Infallible>;

/// A declared gate, materialized into the stack at build time.
#[derive(Clone)]
pub enum GateLayer {
    Privilege(PrivilegeLayer),
    Cooldown(CooldownLayer),
    Channel(ChannelLayer),
}

impl GateLayer {
    fn wrap(&self, inner: GateService) -> GateService {
        match self {
            GateLayer::Privilege(layer) => BoxCloneSyncService::new(layer.layer(inner)),
            GateLayer::Cooldown(layer) => BoxCloneSyncService::new(layer.layer(inner)),
            GateLayer::Channel(layer) => BoxCloneSyncService::new(layer.layer(inner)),
        }
    }
}

/// Applies gates in declaration order: the first declared wraps all the
/// rest.
pub fn stack(gates: &[GateLayer], base: GateService) -> GateService {
    gates.iter().rev().fold(base, |svc, gate| gate.wrap(svc))
}

/// The callback shape at the bottom of every gate stack.
pub(crate) type InvocationCallback =
    Arc<dyn Fn(Invocation) -> crate::handler::TriggerFuture + Send + Sync>;

/// Builds the innermost trigger service: runs the callback under the
/// actuation contract so every gate above it sees a plain outcome.
pub(crate) fn guarded_service(callback: InvocationCallback) -> GateService {
    BoxCloneSyncService::new(TriggerService { callback })
}

#[derive(Clone)]
struct TriggerService {
    callback: InvocationCallback,
}

impl Service<Invocation> for TriggerService {
    type Response = Outcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Outcome, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let callback = self.callback.clone();
        Box::pin(async move {
            Ok(crate::handler::run_guarded(callback(invocation)).await)
        })
    }
}

// =============================================================================
// Privilege gate
// =============================================================================

/// Short-circuits callers below a minimum privilege.
#[derive(Clone)]
pub struct PrivilegeLayer {
    min: Privilege,
}

impl PrivilegeLayer {
    pub fn at_least(min: Privilege) -> Self {
        Self { min }
    }
}

impl<S> Layer<S> for PrivilegeLayer {
    type Service = PrivilegeGate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PrivilegeGate {
            inner,
            min: self.min,
        }
    }
}

#[derive(Clone)]
pub struct PrivilegeGate<S> {
    inner: S,
    min: Privilege,
}

impl<S> Service<Invocation> for PrivilegeGate<S>
where
    S: Service<Invocation, Response = Outcome, Error = Infallible>,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Outcome, Infallible>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let held = invocation.ctx.privilege();
        if held < self.min {
            debug!(
                caller = %invocation.ctx.author().name,
                %held,
                required = %self.min,
                "privilege gate refused"
            );
            return Box::pin(std::future::ready(Ok(Outcome::silent())));
        }
        Box::pin(self.inner.call(invocation))
    }
}

// =============================================================================
// Cooldown gate
// =============================================================================

/// Granularity at which a cooldown key is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    User,
    #[default]
    Channel,
    Global,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CooldownKey {
    handler: Arc<str>,
    scope: ScopeKey,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum ScopeKey {
    Global,
    Channel(String),
    User { channel: String, user: String },
}

/// Throttles invocations per (handler, scope) key.
///
/// The entry map is owned by the layer instance and shared across its
/// service clones. Timestamps are monotonic and only ever move forward.
#[derive(Clone)]
pub struct CooldownLayer {
    handler: Arc<str>,
    window: Duration,
    exempt: Privilege,
    scope: Scope,
    entries: Arc<Mutex<HashMap<CooldownKey, Instant>>>,
}

impl CooldownLayer {
    /// A cooldown with the conventional defaults: per-channel scope,
    /// moderators and above exempt.
    pub fn new(handler: impl Into<Arc<str>>, window: Duration) -> Self {
        Self {
            handler: handler.into(),
            window,
            exempt: Privilege::Moderator,
            scope: Scope::Channel,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Callers at or above this level always pass (and still stamp).
    pub fn exempt(mut self, level: Privilege) -> Self {
        self.exempt = level;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

impl<S> Layer<S> for CooldownLayer {
    type Service = CooldownGate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CooldownGate {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CooldownGate<S> {
    inner: S,
    layer: CooldownLayer,
}

impl<S> Service<Invocation> for CooldownGate<S>
where
    S: Service<Invocation, Response = Outcome, Error = Infallible>,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Outcome, Infallible>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let layer = &self.layer;
        let key = CooldownKey {
            handler: layer.handler.clone(),
            scope: match layer.scope {
                Scope::Global => ScopeKey::Global,
                Scope::Channel => ScopeKey::Channel(invocation.ctx.channel().to_string()),
                Scope::User => ScopeKey::User {
                    channel: invocation.ctx.channel().to_string(),
                    user: invocation.ctx.author().name.clone(),
                },
            },
        };

        let now = Instant::now();
        let accepted = {
            let mut entries = layer.entries.lock();
            let pass = invocation.ctx.privilege() >= layer.exempt
                || entries
                    .get(&key)
                    .is_none_or(|last| now.duration_since(*last) >= layer.window);
            if pass {
                entries.insert(key, now);
            }
            pass
        };

        if !accepted {
            debug!(
                handler = %layer.handler,
                caller = %invocation.ctx.author().name,
                "cooldown gate refused"
            );
            return Box::pin(std::future::ready(Ok(Outcome::silent())));
        }
        Box::pin(self.inner.call(invocation))
    }
}

// =============================================================================
// Channel allow-list gate
// =============================================================================

/// Delegates only for invocations arriving in an allowed channel.
#[derive(Clone)]
pub struct ChannelLayer {
    allowed: Arc<HashSet<String>>,
}

impl ChannelLayer {
    pub fn allow(channels: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: Arc::new(channels.into_iter().collect()),
        }
    }
}

impl<S> Layer<S> for ChannelLayer {
    type Service = ChannelGate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ChannelGate {
            inner,
            allowed: self.allowed.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ChannelGate<S> {
    inner: S,
    allowed: Arc<HashSet<String>>,
}

impl<S> Service<Invocation> for ChannelGate<S>
where
    S: Service<Invocation, Response = Outcome, Error = Infallible>,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Outcome, Infallible>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        if !self.allowed.contains(invocation.ctx.channel()) {
            debug!(channel = %invocation.ctx.channel(), "channel gate refused");
            return Box::pin(std::future::ready(Ok(Outcome::silent())));
        }
        Box::pin(self.inner.call(invocation))
    }
}
