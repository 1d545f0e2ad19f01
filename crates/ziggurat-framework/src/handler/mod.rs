//! Handler core: the invokable unit bound to the dispatch bus.
//!
//! A [`Handler`] is something the bus can trigger. Four variants exist:
//!
//! - [`CommandHandler`](command::CommandHandler) - reached by explicit
//!   prefixed invocation through the alias table
//! - [`ScheduledHandler`](cron::ScheduledHandler) - reached by a cron
//!   timer with a synthetic self-authored context
//! - [`PassiveHandler`](passive::PassiveHandler) - triggered on every
//!   qualifying inbound line
//! - [`PatternHandler`](pattern::PatternHandler) - triggered when the
//!   inbound text matches a regular expression
//!
//! The actuation contract is absolute: `actuate` returns an [`Outcome`]
//! and never fails. Deliberate domain failures, author contract
//! violations and panics are all normalized at this boundary, so no
//! handler execution can disturb another handler or the scheduler.

pub mod command;
pub mod cron;
pub mod passive;
pub mod pattern;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;

use ziggurat_core::{Context, DomainError, Outcome};

use crate::args::ArgMismatch;
use crate::bus::Bus;

/// A recoverable failure deliberately surfaced by a handler callback.
#[derive(Debug, Clone, Error)]
pub enum TriggerError {
    /// User-meaningful; reported to the caller.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The callback broke its own author contract; never the user's fault.
    #[error("{0}")]
    Contract(String),
}

impl From<ArgMismatch> for TriggerError {
    fn from(mismatch: ArgMismatch) -> Self {
        TriggerError::Contract(mismatch.to_string())
    }
}

/// What a handler callback resolves to.
pub type TriggerResult = Result<Outcome, TriggerError>;

/// The boxed future every callback produces.
pub type TriggerFuture = BoxFuture<'static, TriggerResult>;

/// An invokable unit owned by a component namespace.
///
/// Lifecycle: Unregistered → Registered (on [`register`](Handler::register))
/// → Unregistered (on [`unregister`](Handler::unregister)). Registration is
/// performed against the bus the component is mounted on.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// The local name within the owning namespace.
    fn name(&self) -> &str;

    /// The owning namespace (the component name).
    fn namespace(&self) -> &str;

    /// `namespace.name`, the globally unique handler id.
    fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace(), self.name())
    }

    /// Wires this handler into the bus. Returns a short description for
    /// the registration log.
    fn register(self: Arc<Self>, bus: &Bus) -> String;

    /// Removes this handler from the bus.
    fn unregister(self: Arc<Self>, bus: &Bus);

    fn is_registered(&self) -> bool;

    /// Runs the trigger path. `raw` is the unparsed argument string for
    /// command handlers and empty for every other variant.
    ///
    /// Never fails: all failure modes are folded into the outcome.
    async fn actuate(self: Arc<Self>, ctx: Arc<Context>, raw: &str) -> Outcome;
}

/// Runs a callback future under the actuation contract: domain failures
/// become error outcomes, contract violations malformed ones, and panics
/// are caught as uncaught outcomes.
pub(crate) async fn run_guarded(fut: TriggerFuture) -> Outcome {
    match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(TriggerError::Domain(err))) => Outcome::error(err.to_string()),
        Ok(Err(TriggerError::Contract(detail))) => Outcome::malformed(detail),
        Err(panic) => Outcome::uncaught(panic_text(&panic)),
    }
}

fn panic_text(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ziggurat_core::OutcomeCode;

    #[tokio::test]
    async fn guarded_run_passes_outcomes_through() {
        let out = run_guarded(Box::pin(async { Ok(Outcome::say("fine")) })).await;
        assert_eq!(out.code(), OutcomeCode::Ok);
    }

    #[tokio::test]
    async fn guarded_run_maps_domain_errors() {
        let out = run_guarded(Box::pin(async {
            Err(TriggerError::from(DomainError::new("unknown profile")))
        }))
        .await;
        assert_eq!(out.code(), OutcomeCode::Error);
        assert_eq!(out.fault(), Some("unknown profile"));
    }

    #[tokio::test]
    async fn guarded_run_maps_contract_violations() {
        let out = run_guarded(Box::pin(async {
            Err(TriggerError::Contract("argument 'x' was never bound".into()))
        }))
        .await;
        assert_eq!(out.code(), OutcomeCode::Malformed);
    }

    #[tokio::test]
    async fn guarded_run_catches_panics() {
        let out = run_guarded(Box::pin(async { panic!("boom") })).await;
        assert_eq!(out.code(), OutcomeCode::Uncaught);
        assert_eq!(out.fault(), Some("boom"));
    }
}
