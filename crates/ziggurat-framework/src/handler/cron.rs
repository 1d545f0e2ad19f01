//! Scheduled handlers: re-invoked on a cron-style schedule.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use cron::Schedule;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ziggurat_core::{Context, Outcome, Privilege};

use crate::args::BoundArgs;
use crate::bus::Bus;
use crate::handler::{Handler, TriggerFuture};
use crate::middleware::{
    guarded_service, stack, CooldownLayer, GateLayer, GateService, Invocation,
    PrivilegeLayer, Scope,
};
use crate::scheduler;

/// Failures constructing a scheduled handler.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {reason}")]
    Cron { expr: String, reason: String },

    #[error("unknown timezone '{0}'")]
    Timezone(String),
}

/// The type-erased callback a scheduled handler runs on each tick.
pub type ScheduledCallback =
    Arc<dyn Fn(Arc<Context>) -> TriggerFuture + Send + Sync>;

/// A handler fired by a recurring cron schedule in an explicit timezone.
///
/// Each tick synthesizes a self-authored context in the bot's home
/// channel, runs the normal actuation path - gates included, judged
/// against the synthetic identity - and forwards the outcome through the
/// same delivery path user-triggered commands use. Ticks are
/// fire-and-forget: a slow or failing tick never delays or cancels the
/// next one.
///
/// The timer arms on registration and disarms on unregistration.
#[derive(Debug)]
pub struct ScheduledHandler {
    namespace: String,
    name: String,
    expr: String,
    schedule: Schedule,
    tz: Tz,
    gate: GateService,
    armed: Mutex<Option<CancellationToken>>,
    registered: AtomicBool,
}

impl ScheduledHandler {
    /// Builds a scheduled handler from a cron expression (seconds-resolution
    /// syntax) and an IANA timezone name, with no gates.
    pub fn new<F, Fut>(
        namespace: impl Into<String>,
        name: impl Into<String>,
        expr: &str,
        timezone: &str,
        callback: F,
    ) -> Result<Arc<Self>, ScheduleError>
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::handler::TriggerResult> + Send + 'static,
    {
        Self::builder(namespace, name, expr, timezone).handler(callback)
    }

    pub fn builder(
        namespace: impl Into<String>,
        name: impl Into<String>,
        expr: &str,
        timezone: &str,
    ) -> ScheduledBuilder {
        ScheduledBuilder {
            namespace: namespace.into(),
            name: name.into(),
            expr: expr.to_string(),
            timezone: timezone.to_string(),
            gates: Vec::new(),
        }
    }

    pub(crate) fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub(crate) fn timezone(&self) -> Tz {
        self.tz
    }

    /// Whether the timer is currently running.
    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }
}

/// Builder for [`ScheduledHandler`]. Gates apply to every tick exactly as
/// they would to a user-triggered invocation, judged against the
/// synthetic self-authored identity.
pub struct ScheduledBuilder {
    namespace: String,
    name: String,
    expr: String,
    timezone: String,
    gates: Vec<GateLayer>,
}

impl ScheduledBuilder {
    /// Gate: require at least this privilege of the synthetic identity.
    pub fn restrict(mut self, min: Privilege) -> Self {
        self.gates.push(GateLayer::Privilege(PrivilegeLayer::at_least(min)));
        self
    }

    /// Gate: cooldown with explicit exemption level and scope.
    pub fn cooldown_with(
        mut self,
        window: Duration,
        exempt: Privilege,
        scope: Scope,
    ) -> Self {
        let id: Arc<str> = format!("{}.{}", self.namespace, self.name).into();
        self.gates.push(GateLayer::Cooldown(
            CooldownLayer::new(id, window).exempt(exempt).scope(scope),
        ));
        self
    }

    /// Finalizes the handler; fails on a bad expression or timezone.
    pub fn handler<F, Fut>(self, callback: F) -> Result<Arc<ScheduledHandler>, ScheduleError>
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::handler::TriggerResult> + Send + 'static,
    {
        let schedule =
            Schedule::from_str(&self.expr).map_err(|e| ScheduleError::Cron {
                expr: self.expr.clone(),
                reason: e.to_string(),
            })?;
        let tz = Tz::from_str(&self.timezone)
            .map_err(|_| ScheduleError::Timezone(self.timezone.clone()))?;

        let callback: ScheduledCallback = Arc::new(move |ctx| Box::pin(callback(ctx)));
        let base = guarded_service(Arc::new(move |invocation: Invocation| {
            callback(invocation.ctx)
        }));

        Ok(Arc::new(ScheduledHandler {
            namespace: self.namespace,
            name: self.name,
            expr: self.expr,
            schedule,
            tz,
            gate: stack(&self.gates, base),
            armed: Mutex::new(None),
            registered: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl Handler for ScheduledHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn register(self: Arc<Self>, bus: &Bus) -> String {
        let token = scheduler::arm(self.clone(), bus.clone());
        *self.armed.lock() = Some(token);
        self.registered.store(true, Ordering::SeqCst);
        format!("cron '{}' @ {}", self.expr, self.tz)
    }

    fn unregister(self: Arc<Self>, _bus: &Bus) {
        if let Some(token) = self.armed.lock().take() {
            token.cancel();
        }
        self.registered.store(false, Ordering::SeqCst);
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn actuate(self: Arc<Self>, ctx: Arc<Context>, _raw: &str) -> Outcome {
        let gate = self.gate.clone();
        match gate
            .oneshot(Invocation {
                ctx,
                args: BoundArgs::empty(),
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        }
    }
}
