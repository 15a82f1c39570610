//! Error taxonomy shared across the engine.
//!
//! Every fallible operation in the workspace returns [`EngineResult`]. The
//! four kinds map one-to-one onto the RPC status classes the daemon exposes:
//! `Validation` → invalid argument, `Gateway` and `Persistence` → internal,
//! `State` → failed precondition. Errors from nested calls are propagated
//! unchanged; callers journal `ERROR_OCCURRED` as their only side-effect.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input: non-positive quantity, unknown strategy, empty symbol.
    Validation,
    /// The broker refused a submit/cancel/replace; the message is the
    /// broker's, forwarded verbatim.
    Gateway,
    /// A database read or write failed.
    Persistence,
    /// The engine's own state refuses the operation: order not found,
    /// already terminal, broker id not yet assigned.
    State,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Gateway => "GATEWAY",
            ErrorKind::Persistence => "PERSISTENCE",
            ErrorKind::State => "STATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Gateway, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = EngineError::state("Order not found: ORD_1");
        assert_eq!(err.to_string(), "STATE: Order not found: ORD_1");
    }

    #[test]
    fn constructors_set_the_kind() {
        assert_eq!(EngineError::validation("x").kind, ErrorKind::Validation);
        assert_eq!(EngineError::gateway("x").kind, ErrorKind::Gateway);
        assert_eq!(EngineError::persistence("x").kind, ErrorKind::Persistence);
        assert_eq!(EngineError::state("x").kind, ErrorKind::State);
    }
}
