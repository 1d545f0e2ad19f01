//! Handler dispatch framework for the Ziggurat chat bot.
//!
//! This crate turns raw inbound chat lines into typed, privilege- and
//! rate-limited handler invocations and normalizes every outcome into the
//! uniform result type from `ziggurat-core`:
//!
//! - [`args`] - the command-argument grammar and binder
//! - [`handler`] - the handler core and its four variants
//! - [`middleware`] - privilege, cooldown and channel gates as tower layers
//! - [`bus`] - the dispatch bus and outcome delivery
//! - [`component`] - explicit handler registration tables
//! - scheduler - the cron timer loop behind scheduled handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use ziggurat_framework::prelude::*;
//!
//! let ping = CommandHandler::builder("meta", "ping")
//!     .cooldown_with(Duration::from_secs(10), Privilege::Nobody, Scope::Channel)
//!     .handler(|ctx, _args| async move { Ok(Outcome::say("pong")) });
//!
//! let bus = Bus::new(connector, BusOptions::default());
//! bus.mount(&my_component);
//! ```

pub mod args;
pub mod bus;
pub mod component;
pub mod handler;
pub mod middleware;
mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use args::{bind, tokenize, ArgType, ArgValue, BoundArgs, Signature};
pub use bus::{Bus, BusOptions};
pub use component::Component;
pub use handler::command::{AliasPolicy, CommandHandler};
pub use handler::cron::{ScheduleError, ScheduledBuilder, ScheduledHandler};
pub use handler::passive::PassiveHandler;
pub use handler::pattern::{PatternHandler, TextMatch};
pub use handler::{Handler, TriggerError, TriggerResult};
pub use middleware::{ChannelLayer, CooldownLayer, PrivilegeLayer, Scope};

/// Everything a component implementation usually needs.
pub mod prelude {
    pub use crate::args::{ArgType, ArgValue, BoundArgs, Signature};
    pub use crate::bus::{Bus, BusOptions};
    pub use crate::component::Component;
    pub use crate::handler::command::{AliasPolicy, CommandHandler};
    pub use crate::handler::cron::ScheduledHandler;
    pub use crate::handler::passive::PassiveHandler;
    pub use crate::handler::pattern::{PatternHandler, TextMatch};
    pub use crate::handler::{Handler, TriggerError, TriggerResult};
    pub use crate::middleware::Scope;
    pub use ziggurat_core::{
        Context, DomainError, Outcome, OutcomeCode, Privilege,
    };
}
