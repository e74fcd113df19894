//! Read-only view of the parser for rendering the composer.

use crate::{
    binder::CommandInvocation,
    catalog::CommandDefinition,
    parser::ParserState,
};

/// Coarse parser stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionStage {
    /// No command
    Idle,
    /// Choosing a command
    Matching,
    /// Filling parameters
    Binding,
    /// Executable
    Ready,
    /// Submitted
    Sent,
    /// Abandoned
    Cancelled,
}

/// A catalog entry offered while matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateView {
    /// Command name
    pub name: &'static str,
    /// Summary
    pub description: &'static str,
    /// Usage line
    pub usage: String,
}

/// One parameter slot of the chosen command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterView {
    /// Parameter name
    pub name: &'static str,
    /// Type label
    pub kind: &'static str,
    /// Whether execution needs it
    pub required: bool,
    /// Token typed into this slot
    pub raw: Option<String>,
    /// Validation message for an invalid value
    pub error: Option<String>,
}

/// Everything the composer needs to show command state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProjection {
    /// Stage
    pub stage: ProjectionStage,
    /// Name typed so far, while matching
    pub query: Option<String>,
    /// Matching commands
    pub candidates: Vec<CandidateView>,
    /// Chosen command
    pub command: Option<&'static str>,
    /// Usage line of the chosen command
    pub usage: Option<String>,
    /// Parameter slots in declared order
    pub parameters: Vec<ParameterView>,
    /// Required parameters still unbound
    pub missing: Vec<&'static str>,
    /// Validation messages
    pub errors: Vec<String>,
    /// Whether confirming would execute
    pub can_execute: bool,
}

impl CommandProjection {
    /// Projection of the idle state.
    pub fn idle() -> Self {
        Self::empty(ProjectionStage::Idle)
    }

    /// Build from a parser state.
    pub fn from_state(state: &ParserState, marker: char) -> Self {
        match state {
            ParserState::Idle => Self::idle(),
            ParserState::Cancelled => Self::empty(ProjectionStage::Cancelled),
            ParserState::Matching(matching) => Self {
                query: Some(matching.query.clone()),
                candidates: matching
                    .candidates
                    .iter()
                    .map(|c| CandidateView {
                        name: c.name,
                        description: c.description,
                        usage: c.usage(marker),
                    })
                    .collect(),
                ..Self::empty(ProjectionStage::Matching)
            },
            ParserState::Binding(inv) => Self::invocation(ProjectionStage::Binding, inv, marker),
            ParserState::Ready(inv) => Self::invocation(ProjectionStage::Ready, inv, marker),
            ParserState::Sent(inv) => Self::invocation(ProjectionStage::Sent, inv, marker),
        }
    }

    /// Whether a command is being composed.
    pub fn is_active(&self) -> bool {
        matches!(
            self.stage,
            ProjectionStage::Matching | ProjectionStage::Binding | ProjectionStage::Ready
        )
    }

    /// Matching found nothing.
    pub fn no_match(&self) -> bool {
        self.stage == ProjectionStage::Matching && self.candidates.is_empty()
    }

    fn empty(stage: ProjectionStage) -> Self {
        Self {
            stage,
            query: None,
            candidates: Vec::new(),
            command: None,
            usage: None,
            parameters: Vec::new(),
            missing: Vec::new(),
            errors: Vec::new(),
            can_execute: false,
        }
    }

    fn invocation(stage: ProjectionStage, inv: &CommandInvocation, marker: char) -> Self {
        let definition: &CommandDefinition = inv.definition();
        let parameters = definition
            .parameters
            .iter()
            .map(|p| {
                let bound = inv.bound(p.name);
                ParameterView {
                    name: p.name,
                    kind: p.kind.label(),
                    required: p.required,
                    raw: bound.map(|b| b.raw.clone()),
                    error: bound.and_then(|b| b.value.as_ref().err()).map(ToString::to_string),
                }
            })
            .collect();

        Self {
            command: Some(definition.name),
            usage: Some(definition.usage(marker)),
            parameters,
            missing: inv.missing_required(),
            errors: inv.errors().iter().map(ToString::to_string).collect(),
            can_execute: stage == ProjectionStage::Ready,
            ..Self::empty(stage)
        }
    }
}
