//! In-process collaborators for the terminal client.
//!
//! The terminal client has no task tracker behind it. Tasks, milestones and
//! delegations are logged and numbered locally, and mentions resolve against
//! the roster given on the command line.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use huddle_client::{
    CollaboratorError, Collaborators, Delegation, DelegationService, MemberDirectory, MemberRef,
    MilestoneRef, MilestoneService, NewMilestone, NewTask, SessionTokenSource, TaskRef,
    TaskService,
};
use huddle_core::SessionToken;
use huddle_proto::{ChannelId, UserId};

/// Collaborators backed by a fixed roster and a counter.
#[derive(Debug, Default)]
pub struct LocalServices {
    roster: BTreeMap<String, MemberRef>,
    token: Option<SessionToken>,
    next_id: AtomicU64,
}

impl LocalServices {
    /// Services handing out `token`; `None` starts signed out.
    pub fn new(token: Option<SessionToken>) -> Self {
        Self { token, ..Self::default() }
    }

    /// Add a member that mentions can resolve to, by id or display name.
    #[must_use]
    pub fn with_member(mut self, id: &str, display: &str) -> Self {
        self.roster.insert(
            id.to_lowercase(),
            MemberRef { id: UserId::from(id), display: display.to_owned() },
        );
        self
    }

    /// Wrap into the client's collaborator set.
    pub fn into_collaborators(self) -> Collaborators {
        let shared = Arc::new(self);
        Collaborators {
            members: shared.clone(),
            tasks: shared.clone(),
            milestones: shared.clone(),
            delegation: shared.clone(),
            tokens: shared,
        }
    }

    fn next(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n}")
    }
}

impl MemberDirectory for LocalServices {
    fn resolve_member(&self, _channel: &ChannelId, reference: &str) -> Option<MemberRef> {
        let wanted = reference.to_lowercase();
        self.roster.get(&wanted).cloned().or_else(|| {
            self.roster.values().find(|m| m.display.to_lowercase() == wanted).cloned()
        })
    }
}

impl TaskService for LocalServices {
    fn create_task(&self, task: NewTask) -> Result<TaskRef, CollaboratorError> {
        let id = self.next("task");
        tracing::info!(
            %id,
            channel = %task.channel_id,
            title = %task.title,
            assignee = %task.assignee.id,
            "task created"
        );
        Ok(TaskRef { id })
    }
}

impl MilestoneService for LocalServices {
    fn set_milestone(&self, milestone: NewMilestone) -> Result<MilestoneRef, CollaboratorError> {
        let id = self.next("milestone");
        tracing::info!(
            %id,
            channel = %milestone.channel_id,
            name = %milestone.name,
            due = %milestone.due_date,
            "milestone set"
        );
        Ok(MilestoneRef { id })
    }
}

impl DelegationService for LocalServices {
    fn delegate(&self, delegation: Delegation) -> Result<(), CollaboratorError> {
        tracing::info!(
            channel = %delegation.channel_id,
            task = %delegation.task,
            to = %delegation.to.id,
            "task delegated"
        );
        Ok(())
    }
}

impl SessionTokenSource for LocalServices {
    fn current_session_token(&self) -> Option<SessionToken> {
        self.token.clone()
    }
}
