use chrono::Utc;
use db::{
    DbErr, DbPool, TransactionTrait,
    models::{
        milestone::Milestone,
        phase::Phase,
        task::{CreateTask, Task, TaskError, TaskScope},
    },
    types::ProgressState,
};
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("Phase not found")]
    PhaseNotFound,
    #[error("Milestone not found")]
    MilestoneNotFound,
    #[error("{remaining} task(s) must be completed first")]
    UnfinishedTasks { remaining: u64 },
    #[error("Cannot complete from the {0} state")]
    InvalidState(ProgressState),
    #[error("Tasks cannot be added to a completed {0}")]
    ScopeClosed(&'static str),
}

/// Outcome of a phase completion: the completed phase and the successor
/// the cascade activated, if one existed.
#[derive(Debug, Clone, Serialize, TS)]
pub struct PhaseCompletion {
    pub phase: Phase,
    pub activated: Option<Phase>,
}

/// The phase/milestone progression state machine. Completion is
/// all-or-nothing: the unfinished-task guard, the status swap and the
/// cascade run inside one transaction, and the swap itself is
/// conditioned on the previous state so concurrent attempts cannot
/// double-fire.
#[derive(Clone, Default)]
pub struct LifecycleService;

impl LifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub async fn complete_phase(
        &self,
        db: &DbPool,
        phase_id: Uuid,
    ) -> Result<PhaseCompletion, LifecycleError> {
        let tx = db.begin().await?;

        let phase = Phase::find_by_id(&tx, phase_id)
            .await?
            .ok_or(LifecycleError::PhaseNotFound)?;
        if phase.state != ProgressState::InProgress {
            return Err(LifecycleError::InvalidState(phase.state));
        }

        let remaining = Task::count_unfinished_in_scope(&tx, TaskScope::Phase(phase_id)).await?;
        if remaining > 0 {
            return Err(LifecycleError::UnfinishedTasks { remaining });
        }

        let now = Utc::now();
        if !Phase::try_mark_done(&tx, phase_id, now).await? {
            // Lost the race against a concurrent completion.
            return Err(LifecycleError::InvalidState(ProgressState::Done));
        }

        let activated =
            Phase::try_activate_next(&tx, phase.project_id, phase.phase_order, now).await?;

        tx.commit().await?;

        let phase = Phase::find_by_id(db, phase_id)
            .await?
            .ok_or(LifecycleError::PhaseNotFound)?;
        tracing::info!(
            phase = %phase.label,
            activated = activated.as_ref().map(|p| p.label.as_str()).unwrap_or("none"),
            "Phase completed"
        );
        Ok(PhaseCompletion { phase, activated })
    }

    /// Same guard and swap as phases, without the cascade: completing a
    /// milestone never touches its siblings.
    pub async fn complete_milestone(
        &self,
        db: &DbPool,
        milestone_id: Uuid,
    ) -> Result<Milestone, LifecycleError> {
        let tx = db.begin().await?;

        let milestone = Milestone::find_by_id(&tx, milestone_id)
            .await?
            .ok_or(LifecycleError::MilestoneNotFound)?;
        if milestone.state != ProgressState::InProgress {
            return Err(LifecycleError::InvalidState(milestone.state));
        }

        let remaining =
            Task::count_unfinished_in_scope(&tx, TaskScope::Milestone(milestone_id)).await?;
        if remaining > 0 {
            return Err(LifecycleError::UnfinishedTasks { remaining });
        }

        if !Milestone::try_mark_done(&tx, milestone_id, Utc::now()).await? {
            return Err(LifecycleError::InvalidState(ProgressState::Done));
        }

        tx.commit().await?;

        Milestone::find_by_id(db, milestone_id)
            .await?
            .ok_or(LifecycleError::MilestoneNotFound)
    }

    /// Task creation precondition: a completed phase or milestone no
    /// longer accepts tasks.
    pub async fn ensure_scope_open(
        &self,
        db: &DbPool,
        data: &CreateTask,
    ) -> Result<(), LifecycleError> {
        if let Some(phase_id) = data.phase_id {
            let phase = Phase::find_by_id(db, phase_id)
                .await?
                .ok_or(LifecycleError::PhaseNotFound)?;
            if phase.state == ProgressState::Done {
                return Err(LifecycleError::ScopeClosed("phase"));
            }
        }
        if let Some(milestone_id) = data.milestone_id {
            let milestone = Milestone::find_by_id(db, milestone_id)
                .await?
                .ok_or(LifecycleError::MilestoneNotFound)?;
            if milestone.state == ProgressState::Done {
                return Err(LifecycleError::ScopeClosed("milestone"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::{
        milestone::CreateMilestone,
        phase::CreatePhase,
        project::{CreateProject, Project},
        status::{DONE_LABEL, Status},
        user::{CreateUser, User},
    };
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    struct Fixture {
        db: DbPool,
        user: User,
        project: Project,
    }

    async fn setup() -> Fixture {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        let user = User::create(
            &db,
            &CreateUser {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let project = Project::create(
            &db,
            &CreateProject {
                name: "Apollo".to_string(),
                description: None,
                category: None,
                code: "APL".to_string(),
            },
            Uuid::new_v4(),
            user.id,
        )
        .await
        .unwrap();
        Fixture { db, user, project }
    }

    async fn add_phase(fixture: &Fixture, label: &str) -> Phase {
        Phase::create(
            &fixture.db,
            &CreatePhase {
                project_id: fixture.project.id,
                label: label.to_string(),
                phase_order: None,
                start_date: None,
                end_date: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap()
    }

    async fn add_task(fixture: &Fixture, phase: &Phase, title: &str) -> Task {
        Task::create(
            &fixture.db,
            &CreateTask {
                project_id: fixture.project.id,
                phase_id: Some(phase.id),
                milestone_id: None,
                parent_task_id: None,
                title: title.to_string(),
                description: None,
                status_id: None,
                priority_id: None,
                start_date: None,
                end_date: None,
                assignee_ids: Vec::new(),
            },
            Uuid::new_v4(),
            fixture.user.id,
        )
        .await
        .unwrap()
    }

    async fn finish_task(fixture: &Fixture, task: &Task) {
        let done = Status::find_by_project(&fixture.db, fixture.project.id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.label == DONE_LABEL)
            .unwrap();
        Task::update_status(&fixture.db, task.id, done.id, fixture.user.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn completing_a_phase_cascades_to_the_next_in_order() {
        let fixture = setup().await;
        let planning = add_phase(&fixture, "Planning").await;
        let build = add_phase(&fixture, "Build").await;
        let launch = add_phase(&fixture, "Launch").await;

        let one = add_task(&fixture, &planning, "One").await;
        let two = add_task(&fixture, &planning, "Two").await;
        finish_task(&fixture, &one).await;
        finish_task(&fixture, &two).await;

        let service = LifecycleService::new();
        let completion = service
            .complete_phase(&fixture.db, planning.id)
            .await
            .unwrap();

        assert_eq!(completion.phase.state, ProgressState::Done);
        assert!(completion.phase.actual_end_date.is_some());
        let activated = completion.activated.expect("next phase activated");
        assert_eq!(activated.id, build.id);
        assert_eq!(activated.state, ProgressState::InProgress);

        let untouched = Phase::find_by_id(&fixture.db, launch.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.state, ProgressState::Pending);
    }

    #[tokio::test]
    async fn unfinished_tasks_block_completion_and_nothing_changes() {
        let fixture = setup().await;
        let planning = add_phase(&fixture, "Planning").await;
        let build = add_phase(&fixture, "Build").await;

        let one = add_task(&fixture, &planning, "One").await;
        let _two = add_task(&fixture, &planning, "Two").await;
        finish_task(&fixture, &one).await;

        let service = LifecycleService::new();
        let err = service
            .complete_phase(&fixture.db, planning.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::UnfinishedTasks { remaining: 1 }));

        let planning = Phase::find_by_id(&fixture.db, planning.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(planning.state, ProgressState::InProgress);
        assert!(planning.actual_end_date.is_none());

        let build = Phase::find_by_id(&fixture.db, build.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(build.state, ProgressState::Pending);
    }

    #[tokio::test]
    async fn a_second_completion_attempt_is_rejected() {
        let fixture = setup().await;
        let planning = add_phase(&fixture, "Planning").await;

        let service = LifecycleService::new();
        service.complete_phase(&fixture.db, planning.id).await.unwrap();

        let err = service
            .complete_phase(&fixture.db, planning.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidState(ProgressState::Done)
        ));
    }

    #[tokio::test]
    async fn completing_the_last_phase_activates_nothing() {
        let fixture = setup().await;
        let only = add_phase(&fixture, "Everything").await;

        let service = LifecycleService::new();
        let completion = service.complete_phase(&fixture.db, only.id).await.unwrap();
        assert!(completion.activated.is_none());
    }

    #[tokio::test]
    async fn milestone_completion_does_not_cascade() {
        let fixture = setup().await;
        let planning = add_phase(&fixture, "Planning").await;
        let first = Milestone::create(
            &fixture.db,
            &CreateMilestone {
                phase_id: planning.id,
                label: "Draft".to_string(),
                milestone_order: None,
                start_date: None,
                end_date: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let second = Milestone::create(
            &fixture.db,
            &CreateMilestone {
                phase_id: planning.id,
                label: "Review".to_string(),
                milestone_order: None,
                start_date: None,
                end_date: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let service = LifecycleService::new();
        let completed = service
            .complete_milestone(&fixture.db, first.id)
            .await
            .unwrap();
        assert_eq!(completed.state, ProgressState::Done);
        assert!(completed.actual_end_date.is_some());

        let sibling = Milestone::find_by_id(&fixture.db, second.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sibling.state, ProgressState::InProgress);
    }

    #[tokio::test]
    async fn tasks_cannot_join_a_completed_phase() {
        let fixture = setup().await;
        let planning = add_phase(&fixture, "Planning").await;

        let service = LifecycleService::new();
        service.complete_phase(&fixture.db, planning.id).await.unwrap();

        let data = CreateTask {
            project_id: fixture.project.id,
            phase_id: Some(planning.id),
            milestone_id: None,
            parent_task_id: None,
            title: "Too late".to_string(),
            description: None,
            status_id: None,
            priority_id: None,
            start_date: None,
            end_date: None,
            assignee_ids: Vec::new(),
        };
        let err = service
            .ensure_scope_open(&fixture.db, &data)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::ScopeClosed("phase")));
    }
}
