//! Idempotent, race-free group assignment.
//!
//! A visitor's first eligible visit creates their participant row; every
//! later call returns the stored group. Concurrent first-visits are
//! settled by the store's uniqueness constraint: the losing writer
//! re-reads and adopts the winner's group instead of erroring.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::analytics::{AnalyticsDispatcher, AnalyticsEvent, VisitorContext};
use crate::experiment::{Experiment, ExperimentState};
use crate::identity::Visitor;
use crate::participant::{Group, Participant};
use crate::storage::{self, Store};

/// Why a visitor was refused assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotEligibleReason {
    /// The experiment is disabled
    ExperimentDisabled,
    /// The visitor has not passed the human-confirmation check
    UnconfirmedVisitor,
}

impl std::fmt::Display for NotEligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExperimentDisabled => write!(f, "experiment is disabled"),
            Self::UnconfirmedVisitor => write!(f, "visitor is not confirmed human"),
        }
    }
}

/// Errors from assignment.
#[derive(Debug, Error)]
pub enum AssignError {
    /// The visitor does not participate; callers fall back to the
    /// non-participating behavior.
    #[error("not eligible: {0}")]
    NotEligible(NotEligibleReason),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] storage::Error),
}

/// The outcome of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// The visitor's group, permanent once persisted
    pub group: Group,
    /// Whether this call created the participant row. Always false for
    /// promoted experiments, which persist nothing.
    pub created: bool,
}

/// Picks a group for a first-time participant.
pub type GroupSplit = Arc<dyn Fn() -> Group + Send + Sync>;

/// Uniform 50/50 split.
fn uniform_split() -> Group {
    if rand::random::<bool>() {
        Group::Test
    } else {
        Group::Control
    }
}

/// Binds visitors to experiment groups, exactly once each.
pub struct AssignmentService {
    store: Arc<dyn Store>,
    analytics: Arc<AnalyticsDispatcher>,
    split: GroupSplit,
}

impl AssignmentService {
    /// Create a service with the default uniform split.
    pub fn new(store: Arc<dyn Store>, analytics: Arc<AnalyticsDispatcher>) -> Self {
        Self {
            store,
            analytics,
            split: Arc::new(uniform_split),
        }
    }

    /// Replace the split function (weighted rollouts, deterministic tests).
    #[must_use]
    pub fn with_split(mut self, split: GroupSplit) -> Self {
        self.split = split;
        self
    }

    /// The visitor's permanent group for this experiment, creating the
    /// binding if this is their first eligible visit.
    #[instrument(skip(self, experiment, visitor), fields(experiment = %experiment.name), level = "debug")]
    pub async fn assign(
        &self,
        experiment: &Experiment,
        visitor: &Visitor,
    ) -> Result<Assignment, AssignError> {
        match experiment.state {
            // Concluded: everyone gets the winning variant, nothing is
            // persisted.
            ExperimentState::Promoted => {
                return Ok(Assignment {
                    group: Group::Test,
                    created: false,
                });
            }
            ExperimentState::Disabled => {
                return Err(AssignError::NotEligible(
                    NotEligibleReason::ExperimentDisabled,
                ));
            }
            ExperimentState::Enabled => {}
        }

        if !visitor.confirmed_human {
            return Err(AssignError::NotEligible(
                NotEligibleReason::UnconfirmedVisitor,
            ));
        }

        if let Some(existing) = self
            .store
            .find_participant(experiment.id, &visitor.identity)
            .await?
        {
            return Ok(Assignment {
                group: existing.group,
                created: false,
            });
        }

        let candidate = Participant::new(experiment.id, visitor.identity.clone(), (self.split)());
        let (winner, created) = self.store.insert_participant_if_absent(&candidate).await?;

        if created {
            debug!(group = winner.group.as_str(), "enrolled new participant");
            self.analytics.dispatch(AnalyticsEvent::Enrolled {
                experiment: experiment.name.clone(),
                group: winner.group,
                ctx: VisitorContext::of(visitor),
            });
        }

        Ok(Assignment {
            group: winner.group,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::VisitorIdentity;
    use crate::storage::TursoStore;
    use crate::types::{AnonymousId, UserId};
    use chrono::Utc;
    use uuid::Uuid;

    async fn service_with_experiment(
        state: ExperimentState,
    ) -> (Arc<AssignmentService>, Arc<TursoStore>, Experiment) {
        let store = Arc::new(TursoStore::new_memory().await.unwrap());
        let service = Arc::new(AssignmentService::new(
            store.clone(),
            Arc::new(AnalyticsDispatcher::noop()),
        ));

        let mut experiment = Experiment::new("exp");
        experiment.state = state;
        store.create_experiment(&experiment).await.unwrap();

        (service, store, experiment)
    }

    async fn participant_count(store: &TursoStore, experiment: &Experiment) -> u64 {
        let sizes = store
            .group_sizes(experiment.id, Utc::now().date_naive())
            .await
            .unwrap();
        sizes.control + sizes.test
    }

    #[tokio::test]
    async fn repeated_assignment_returns_the_same_group_once() {
        let (service, store, experiment) =
            service_with_experiment(ExperimentState::Enabled).await;
        let visitor = Visitor::confirmed(VisitorIdentity::anonymous(AnonymousId::new()));

        let first = service.assign(&experiment, &visitor).await.unwrap();
        assert!(first.created);

        for _ in 0..5 {
            let again = service.assign(&experiment, &visitor).await.unwrap();
            assert_eq!(again.group, first.group);
            assert!(!again.created);
        }

        assert_eq!(participant_count(&store, &experiment).await, 1);
    }

    #[tokio::test]
    async fn concurrent_assignments_agree_on_one_row() {
        let (service, store, experiment) =
            service_with_experiment(ExperimentState::Enabled).await;
        let visitor = Visitor::confirmed(VisitorIdentity::authenticated(UserId(Uuid::now_v7())));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let experiment = experiment.clone();
            let visitor = visitor.clone();
            handles.push(tokio::spawn(async move {
                service.assign(&experiment, &visitor).await.unwrap()
            }));
        }

        let mut groups = Vec::new();
        let mut created_count = 0;
        for handle in handles {
            let assignment = handle.await.unwrap();
            groups.push(assignment.group);
            if assignment.created {
                created_count += 1;
            }
        }

        assert!(groups.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(created_count, 1);
        assert_eq!(participant_count(&store, &experiment).await, 1);
    }

    #[tokio::test]
    async fn losing_a_creation_race_adopts_the_winner() {
        let (_service, store, experiment) =
            service_with_experiment(ExperimentState::Enabled).await;
        let visitor = Visitor::confirmed(VisitorIdentity::anonymous(AnonymousId::new()));

        // Another worker already enrolled this visitor in control.
        let winner = Participant::new(experiment.id, visitor.identity.clone(), Group::Control);
        store.insert_participant_if_absent(&winner).await.unwrap();

        // A test-biased split must not override the durable row.
        let service = AssignmentService::new(store.clone(), Arc::new(AnalyticsDispatcher::noop()))
            .with_split(Arc::new(|| Group::Test));

        let assignment = service.assign(&experiment, &visitor).await.unwrap();
        assert_eq!(assignment.group, Group::Control);
        assert!(!assignment.created);
        assert_eq!(participant_count(&store, &experiment).await, 1);
    }

    #[tokio::test]
    async fn promoted_experiment_never_persists() {
        let (service, store, experiment) =
            service_with_experiment(ExperimentState::Promoted).await;
        let visitor = Visitor::confirmed(VisitorIdentity::anonymous(AnonymousId::new()));

        for _ in 0..3 {
            let assignment = service.assign(&experiment, &visitor).await.unwrap();
            assert_eq!(assignment.group, Group::Test);
            assert!(!assignment.created);
        }

        assert_eq!(participant_count(&store, &experiment).await, 0);
    }

    #[tokio::test]
    async fn disabled_experiment_refuses_assignment() {
        let (service, _store, experiment) =
            service_with_experiment(ExperimentState::Disabled).await;
        let visitor = Visitor::confirmed(VisitorIdentity::anonymous(AnonymousId::new()));

        let result = service.assign(&experiment, &visitor).await;
        assert!(matches!(
            result,
            Err(AssignError::NotEligible(
                NotEligibleReason::ExperimentDisabled
            ))
        ));
    }

    #[tokio::test]
    async fn unconfirmed_visitor_never_consumes_a_slot() {
        let (service, store, experiment) =
            service_with_experiment(ExperimentState::Enabled).await;
        let visitor = Visitor {
            identity: VisitorIdentity::anonymous(AnonymousId::new()),
            confirmed_human: false,
            remote_addr: None,
        };

        let result = service.assign(&experiment, &visitor).await;
        assert!(matches!(
            result,
            Err(AssignError::NotEligible(
                NotEligibleReason::UnconfirmedVisitor
            ))
        ));
        assert_eq!(participant_count(&store, &experiment).await, 0);
    }

    #[tokio::test]
    async fn split_function_controls_new_groups() {
        let (_, store, experiment) = service_with_experiment(ExperimentState::Enabled).await;
        let service = AssignmentService::new(store.clone(), Arc::new(AnalyticsDispatcher::noop()))
            .with_split(Arc::new(|| Group::Control));

        for _ in 0..4 {
            let visitor = Visitor::confirmed(VisitorIdentity::anonymous(AnonymousId::new()));
            let assignment = service.assign(&experiment, &visitor).await.unwrap();
            assert_eq!(assignment.group, Group::Control);
        }

        let sizes = store
            .group_sizes(experiment.id, Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(sizes.control, 4);
        assert_eq!(sizes.test, 0);
    }
}
