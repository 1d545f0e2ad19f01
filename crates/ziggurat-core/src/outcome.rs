//! The uniform outcome of a handler invocation.
//!
//! Every trigger path in the bot - commands, scheduled ticks, passive
//! observers, pattern matches - ends in exactly one [`Outcome`]. The
//! dispatch bus consumes it once and decides what (if anything) goes back
//! to chat. Nothing else escapes a handler: failures are normalized into
//! the [`Uncaught`](OutcomeCode::Uncaught), [`Error`](OutcomeCode::Error)
//! and [`Malformed`](OutcomeCode::Malformed) codes before the bus ever
//! sees them.

/// Classification of an invocation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeCode {
    /// The handler ran and (optionally) produced chat output.
    Ok,
    /// The handler ran (or was gated off) and nothing may be sent.
    Silent,
    /// A deliberate, user-meaningful failure raised by the handler.
    Error,
    /// An unhandled fault (panic) escaped the handler body.
    Uncaught,
    /// The handler violated its own author contract.
    Malformed,
}

/// The payload carried alongside an [`OutcomeCode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Nothing to deliver.
    Empty,
    /// A single chat line.
    Text(String),
    /// An ordered sequence of chat lines, delivered in order.
    Lines(Vec<String>),
    /// Failure detail. Never sent verbatim to chat in production.
    Fault(String),
}

/// The immutable result of one handler invocation.
///
/// Constructed at the end of every trigger path and consumed exactly once
/// by the delivery side of the dispatch bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    code: OutcomeCode,
    body: Body,
}

impl Outcome {
    /// A successful invocation with no output.
    pub fn ok() -> Self {
        Self {
            code: OutcomeCode::Ok,
            body: Body::Empty,
        }
    }

    /// A successful invocation that sends one chat line.
    pub fn say(text: impl Into<String>) -> Self {
        Self {
            code: OutcomeCode::Ok,
            body: Body::Text(text.into()),
        }
    }

    /// A successful invocation that sends several chat lines in order.
    pub fn lines(lines: impl IntoIterator<Item = String>) -> Self {
        Self {
            code: OutcomeCode::Ok,
            body: Body::Lines(lines.into_iter().collect()),
        }
    }

    /// A gated or deliberately mute invocation. Never produces output.
    pub fn silent() -> Self {
        Self {
            code: OutcomeCode::Silent,
            body: Body::Empty,
        }
    }

    /// A user-meaningful failure, reported back to the caller.
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            code: OutcomeCode::Error,
            body: Body::Fault(detail.into()),
        }
    }

    /// An unhandled fault caught at the dispatch boundary.
    pub fn uncaught(detail: impl Into<String>) -> Self {
        Self {
            code: OutcomeCode::Uncaught,
            body: Body::Fault(detail.into()),
        }
    }

    /// An author contract violation (not a user error).
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            code: OutcomeCode::Malformed,
            body: Body::Fault(detail.into()),
        }
    }

    /// The outcome classification.
    pub fn code(&self) -> OutcomeCode {
        self.code
    }

    /// The carried payload.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The failure detail, if this outcome carries one.
    pub fn fault(&self) -> Option<&str> {
        match &self.body {
            Body::Fault(d) => Some(d),
            _ => None,
        }
    }

    /// Whether this outcome represents a programming fault rather than a
    /// user-facing result.
    pub fn is_fault(&self) -> bool {
        matches!(self.code, OutcomeCode::Uncaught | OutcomeCode::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pair_code_and_body() {
        assert_eq!(Outcome::ok().code(), OutcomeCode::Ok);
        assert_eq!(Outcome::silent().body(), &Body::Empty);
        assert_eq!(
            Outcome::say("hi").body(),
            &Body::Text("hi".to_string())
        );
        let out = Outcome::error("bad profile");
        assert_eq!(out.code(), OutcomeCode::Error);
        assert_eq!(out.fault(), Some("bad profile"));
    }

    #[test]
    fn fault_classification() {
        assert!(Outcome::uncaught("boom").is_fault());
        assert!(Outcome::malformed("bad read").is_fault());
        assert!(!Outcome::error("user error").is_fault());
        assert!(!Outcome::silent().is_fault());
    }
}
