//! External services the client calls into.
//!
//! Commands describe intent; these services carry it out. The client calls
//! them synchronously after a command result has been appended to the
//! stream, so implementations should hand long work off rather than block.

use std::{fmt, str::FromStr, sync::Arc};

use chrono::NaiveDate;
use huddle_commands::{MemberDirectory, MemberRef};
use huddle_core::SessionToken;
use huddle_proto::{ChannelId, UserId};
use thiserror::Error;

/// Failure reported by a collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service}: {message}")]
pub struct CollaboratorError {
    /// Service that failed
    pub service: &'static str,
    /// What went wrong
    pub message: String,
}

impl CollaboratorError {
    /// Error attributed to `service`.
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self { service, message: message.into() }
    }
}

/// Task urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// low
    Low,
    /// medium
    Medium,
    /// high
    High,
    /// urgent
    Urgent,
}

impl FromStr for Priority {
    type Err = CollaboratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(CollaboratorError::new("tasks", format!("unknown priority {other}"))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        })
    }
}

/// A task to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Project channel
    pub channel_id: ChannelId,
    /// Title
    pub title: String,
    /// Owner
    pub assignee: MemberRef,
    /// Due date
    pub due_date: Option<NaiveDate>,
    /// Urgency
    pub priority: Option<Priority>,
    /// Issuer
    pub created_by: UserId,
}

/// A created task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    /// Service-assigned id
    pub id: String,
}

/// A milestone to set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMilestone {
    /// Project channel
    pub channel_id: ChannelId,
    /// Name
    pub name: String,
    /// Target date
    pub due_date: NaiveDate,
    /// Details
    pub description: Option<String>,
    /// Issuer
    pub created_by: UserId,
}

/// A milestone that was set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneRef {
    /// Service-assigned id
    pub id: String,
}

/// A task handed to a new owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    /// Project channel
    pub channel_id: ChannelId,
    /// Task description
    pub task: String,
    /// New owner
    pub to: MemberRef,
    /// Issuer
    pub delegated_by: UserId,
}

/// Creates tasks.
pub trait TaskService {
    /// Create `task`.
    fn create_task(&self, task: NewTask) -> Result<TaskRef, CollaboratorError>;
}

/// Records milestones.
pub trait MilestoneService {
    /// Set `milestone`.
    fn set_milestone(&self, milestone: NewMilestone) -> Result<MilestoneRef, CollaboratorError>;
}

/// Reassigns work.
pub trait DelegationService {
    /// Record `delegation`.
    fn delegate(&self, delegation: Delegation) -> Result<(), CollaboratorError>;
}

/// Supplies the credential for each (re)connect.
pub trait SessionTokenSource {
    /// Latest token, if signed in.
    fn current_session_token(&self) -> Option<SessionToken>;
}

/// Everything the client calls out to.
#[derive(Clone)]
pub struct Collaborators {
    /// Mention resolution
    pub members: Arc<dyn MemberDirectory + Send + Sync>,
    /// Task creation
    pub tasks: Arc<dyn TaskService + Send + Sync>,
    /// Milestones
    pub milestones: Arc<dyn MilestoneService + Send + Sync>,
    /// Delegation
    pub delegation: Arc<dyn DelegationService + Send + Sync>,
    /// Session credentials
    pub tokens: Arc<dyn SessionTokenSource + Send + Sync>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
