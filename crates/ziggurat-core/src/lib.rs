//! Core types for the Ziggurat chat bot.
//!
//! This crate holds everything the higher layers agree on but none of them
//! own exclusively:
//!
//! - [`Outcome`] - the uniform result of every handler invocation
//! - [`ChatLine`] / [`Chatter`] / [`RoleFlags`] - the inbound chat model
//! - [`Privilege`] - the ordered capability ladder of an invoking identity
//! - [`Context`] - the per-invocation context handed to handler callbacks
//! - [`Connector`] - the narrow protocol-adapter interface to the platform
//! - the error taxonomy ([`ParseFailure`], [`DomainError`], [`SendError`])
//!
//! The dispatch framework lives in `ziggurat-framework`; configuration and
//! process assembly in `ziggurat-runtime`.

pub mod chat;
pub mod connector;
pub mod context;
pub mod error;
pub mod outcome;
pub mod privilege;

pub use chat::{ChatLine, Chatter, RoleFlags};
pub use connector::{BoxedConnector, Connector, ConnectorEvent, PongRouter};
pub use context::Context;
pub use error::{DomainError, ParseFailure, SendError, SendResult};
pub use outcome::{Body, Outcome, OutcomeCode};
pub use privilege::Privilege;
