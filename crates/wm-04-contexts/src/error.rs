//! # Context Errors

use thiserror::Error;

/// Errors of context mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    /// Context values are JSON objects; scalars and arrays are rejected.
    #[error("context value must be a JSON object")]
    NotAnObject,

    /// A path command traversed through a non-object value.
    #[error("invalid context path: '{path}'")]
    InvalidPath { path: String },
}
