//! Error taxonomy shared across the bot.
//!
//! The taxonomy follows the containment policy: parse failures and domain
//! failures are reported back to the caller, gate refusals are silent, and
//! programming faults are logged but never surfaced verbatim outside the
//! dev environment. Conversion into the uniform outcome happens at the
//! dispatch boundary in `ziggurat-framework`.

use thiserror::Error;

// =============================================================================
// Argument parsing
// =============================================================================

/// A failure while binding a raw argument string against a declared
/// signature. The handler body never runs when one of these is produced.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseFailure {
    /// Every required parameter left unfilled after all tokens were
    /// consumed, batched rather than first-only.
    #[error("missing required parameter(s): {}", .0.join(", "))]
    Missing(Vec<String>),

    /// A bound value could not be cast to the parameter's declared type.
    #[error("parameter '{name}' expects {expected}, got '{got}'")]
    Cast {
        name: String,
        expected: String,
        got: String,
    },
}

// =============================================================================
// Handler failures
// =============================================================================

/// A deliberate, user-meaningful failure raised by a handler body.
///
/// These are reported to the caller and logged at warn. Anything else
/// escaping a handler is a programming fault, not a `DomainError`.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct DomainError(String);

impl DomainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// =============================================================================
// Platform connection
// =============================================================================

/// Failures from the platform-connection collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SendError {
    /// The connection is gone.
    #[error("connection closed")]
    Closed,

    /// The platform rejected or dropped the operation.
    #[error("send failed: {0}")]
    Rejected(String),
}

/// Result type for connector operations.
pub type SendResult<T> = Result<T, SendError>;
