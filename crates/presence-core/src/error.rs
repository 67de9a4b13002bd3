//! # Error Hierarchy
//!
//! Validation errors for the domain primitives of the Presence Stack,
//! built with `thiserror`. Each variant carries the rejected input so an
//! operator can find the offending observation or log line without
//! guesswork.

use thiserror::Error;

/// Validation errors for domain primitive newtypes and log lines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identity token is empty or whitespace-only.
    #[error("invalid identity: must be non-empty")]
    EmptyIdentity,

    /// Identity token contains a character the flat log cannot represent.
    #[error("invalid identity {value:?}: contains forbidden character {forbidden:?}")]
    IdentityForbiddenChar {
        /// The rejected token.
        value: String,
        /// The first offending character.
        forbidden: char,
    },

    /// Timestamp string is not valid UTC ISO 8601.
    #[error("invalid timestamp: \"{value}\" ({reason})")]
    InvalidTimestamp {
        /// The string that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A flat log line does not have the `identity,entry,exit` shape.
    #[error("malformed log line {line:?}: {reason}")]
    MalformedLine {
        /// The offending line, without its terminator.
        line: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An exit time precedes its entry time.
    #[error("exit time {exit} precedes entry time {entry} for {identity}")]
    ExitBeforeEntry {
        /// Identity on the record.
        identity: String,
        /// Entry time, rendered.
        entry: String,
        /// Exit time, rendered.
        exit: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_char_message_names_the_character() {
        let err = ValidationError::IdentityForbiddenChar {
            value: "a\rb".into(),
            forbidden: '\r',
        };
        let msg = err.to_string();
        assert!(msg.contains("a\\rb"));
        assert!(msg.contains("'\\r'"));
    }

    #[test]
    fn malformed_line_message_includes_reason() {
        let err = ValidationError::MalformedLine {
            line: "alice".into(),
            reason: "expected 3 fields, found 1".into(),
        };
        assert!(err.to_string().contains("expected 3 fields"));
    }
}
