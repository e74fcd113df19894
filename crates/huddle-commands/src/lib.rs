//! Slash commands for project channels.
//!
//! The composer feeds every keystroke to a [`CommandParser`]. Once the input
//! starts with the command marker the parser narrows the [`Catalog`] by name,
//! then binds the remaining tokens to the chosen command's parameters in
//! declared order. Only a fully bound, fully valid invocation can be
//! confirmed; execution itself lives in the client crate.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──marker──> Matching ──name + space──> Binding <──edit──> Ready ──confirm──> Sent
//!   ↑                  │                         │                 │
//!   └──────────────────┴──── marker removed / cancel() ───────────┴──> Cancelled
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod binder;
pub mod catalog;
mod directory;
mod error;
mod parser;
mod projection;
mod tokenizer;

pub use binder::{BoundValue, CommandInvocation, ParamValue};
pub use catalog::{Catalog, CommandDefinition, CommandParameter, ParameterKind};
pub use directory::{MemberDirectory, MemberRef};
pub use error::ParameterValidationError;
pub use parser::{CommandParser, Markers, Matching, ParserState};
pub use projection::{CandidateView, CommandProjection, ParameterView, ProjectionStage};
