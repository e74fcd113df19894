//! Parameter validation errors.

use thiserror::Error;

/// Why an invocation cannot be executed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterValidationError {
    /// A required parameter has no valid value
    #[error("missing required parameter `{param}`")]
    MissingRequired {
        /// Parameter name
        param: &'static str,
    },

    /// A member parameter was given without the mention marker
    #[error("`{param}` expects a mention, got `{raw}`")]
    MissingMention {
        /// Parameter name
        param: &'static str,
        /// Token as typed
        raw: String,
    },

    /// No channel member matches the mention
    #[error("`{param}`: no member matches `{reference}`")]
    UnresolvedMember {
        /// Parameter name
        param: &'static str,
        /// Mention text without the marker
        reference: String,
    },

    /// Token is not a calendar date
    #[error("`{param}`: `{raw}` is not a date (YYYY-MM-DD)")]
    InvalidDate {
        /// Parameter name
        param: &'static str,
        /// Token as typed
        raw: String,
    },

    /// Token is not one of the allowed options
    #[error("`{param}`: `{raw}` is not one of {options}")]
    InvalidOption {
        /// Parameter name
        param: &'static str,
        /// Token as typed
        raw: String,
        /// Allowed values, comma separated
        options: String,
    },

    /// Token left over after every parameter was bound
    #[error("unexpected argument `{raw}`")]
    UnexpectedArgument {
        /// Token as typed
        raw: String,
    },

    /// Name does not match any catalog command
    #[error("unknown command `{name}`")]
    UnknownCommand {
        /// Name as typed
        name: String,
    },

    /// Nothing is being composed
    #[error("no command in progress")]
    NoCommand,
}
