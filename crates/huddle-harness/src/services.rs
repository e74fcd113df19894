//! Recording stand-ins for the workspace services.
//!
//! [`RecordingServices`] implements every collaborator trait the client
//! needs. It resolves mentions from a fixed roster, hands out a configurable
//! session token, and records each task, milestone and delegation it is asked
//! to create so tests can assert exactly how often side effects ran.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use huddle_client::{
    CollaboratorError, Collaborators, Delegation, DelegationService, MemberDirectory, MemberRef,
    MilestoneRef, MilestoneService, NewMilestone, NewTask, SessionTokenSource, TaskRef,
    TaskService,
};
use huddle_core::SessionToken;
use huddle_proto::{ChannelId, UserId};

#[derive(Debug, Default)]
struct Records {
    roster: BTreeMap<String, MemberRef>,
    token: Option<SessionToken>,
    tasks: Vec<NewTask>,
    milestones: Vec<NewMilestone>,
    delegations: Vec<Delegation>,
    failure: Option<CollaboratorError>,
}

/// In-memory collaborators that record every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingServices {
    records: Arc<Mutex<Records>>,
}

impl RecordingServices {
    /// Services handing out `token`.
    pub fn new(token: &str) -> Self {
        let services = Self::default();
        services.set_token(Some(SessionToken::new(token)));
        services
    }

    /// Add a member that mentions can resolve to.
    #[must_use]
    pub fn with_member(self, id: &str, display: &str) -> Self {
        self.records().roster.insert(
            id.to_lowercase(),
            MemberRef { id: UserId::from(id), display: display.to_owned() },
        );
        self
    }

    /// Replace the session token; `None` simulates a signed-out user.
    pub fn set_token(&self, token: Option<SessionToken>) {
        self.records().token = token;
    }

    /// Fail every service call with `error` until cleared with `None`.
    pub fn fail_with(&self, error: Option<CollaboratorError>) {
        self.records().failure = error;
    }

    /// Tasks created so far.
    pub fn tasks(&self) -> Vec<NewTask> {
        self.records().tasks.clone()
    }

    /// Milestones set so far.
    pub fn milestones(&self) -> Vec<NewMilestone> {
        self.records().milestones.clone()
    }

    /// Delegations made so far.
    pub fn delegations(&self) -> Vec<Delegation> {
        self.records().delegations.clone()
    }

    /// Collaborators backed by these services.
    pub fn collaborators(&self) -> Collaborators {
        let shared = Arc::new(self.clone());
        Collaborators {
            members: shared.clone(),
            tasks: shared.clone(),
            milestones: shared.clone(),
            delegation: shared.clone(),
            tokens: shared,
        }
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failure(&self) -> Result<(), CollaboratorError> {
        self.records().failure.clone().map_or(Ok(()), Err)
    }
}

impl MemberDirectory for RecordingServices {
    fn resolve_member(&self, _channel: &ChannelId, reference: &str) -> Option<MemberRef> {
        let key = reference.to_lowercase();
        let records = self.records();
        records.roster.get(&key).cloned().or_else(|| {
            records.roster.values().find(|m| m.display.to_lowercase() == key).cloned()
        })
    }
}

impl TaskService for RecordingServices {
    fn create_task(&self, task: NewTask) -> Result<TaskRef, CollaboratorError> {
        self.check_failure()?;
        let mut records = self.records();
        records.tasks.push(task);
        Ok(TaskRef { id: format!("task-{}", records.tasks.len()) })
    }
}

impl MilestoneService for RecordingServices {
    fn set_milestone(&self, milestone: NewMilestone) -> Result<MilestoneRef, CollaboratorError> {
        self.check_failure()?;
        let mut records = self.records();
        records.milestones.push(milestone);
        Ok(MilestoneRef { id: format!("milestone-{}", records.milestones.len()) })
    }
}

impl DelegationService for RecordingServices {
    fn delegate(&self, delegation: Delegation) -> Result<(), CollaboratorError> {
        self.check_failure()?;
        self.records().delegations.push(delegation);
        Ok(())
    }
}

impl SessionTokenSource for RecordingServices {
    fn current_session_token(&self) -> Option<SessionToken> {
        self.records().token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_resolve_by_id_or_display() {
        let services = RecordingServices::new("t").with_member("u-alice", "Alice");
        let channel = ChannelId::from("p1");

        assert_eq!(
            services.resolve_member(&channel, "U-ALICE").map(|m| m.display),
            Some("Alice".to_owned())
        );
        assert_eq!(
            services.resolve_member(&channel, "alice").map(|m| m.id),
            Some(UserId::from("u-alice"))
        );
        assert!(services.resolve_member(&channel, "bob").is_none());
    }

    #[test]
    fn failures_are_not_recorded() {
        let services = RecordingServices::new("t");
        services.fail_with(Some(CollaboratorError::new("delegation", "offline")));

        let result = services.delegate(Delegation {
            channel_id: ChannelId::from("p1"),
            task: "x".to_owned(),
            to: MemberRef { id: UserId::from("u"), display: "U".to_owned() },
            delegated_by: UserId::from("me"),
        });

        assert!(result.is_err());
        assert!(services.delegations().is_empty());
    }
}
