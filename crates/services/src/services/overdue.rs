use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use db::{DbPool, models::task::Task};
use tokio::sync::mpsc;
use uuid::Uuid;

const DEBOUNCE: Duration = Duration::from_secs(1);

/// Background sweep that denormalizes overdue state onto task statuses.
///
/// Task-list reads request a sweep for their project; requests arriving
/// within the debounce window are coalesced so rapid re-reads produce
/// one batch write. Best effort only: readers derive overdue from the
/// end date regardless of whether the sweep has run.
#[derive(Clone)]
pub struct OverdueSweeper {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl OverdueSweeper {
    pub fn spawn(db: DbPool) -> Self {
        Self::spawn_with_debounce(db, DEBOUNCE)
    }

    pub fn spawn_with_debounce(db: DbPool, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(db, rx, debounce));
        Self { tx }
    }

    /// Queues a sweep for the project. Never blocks; a dropped worker
    /// only disables the denormalization.
    pub fn request_sweep(&self, project_id: Uuid) {
        let _ = self.tx.send(project_id);
    }
}

async fn run(db: DbPool, mut rx: mpsc::UnboundedReceiver<Uuid>, debounce: Duration) {
    while let Some(first) = rx.recv().await {
        let mut pending = HashSet::from([first]);

        let deadline = tokio::time::sleep(debounce);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(project_id) => {
                        pending.insert(project_id);
                    }
                    None => break,
                },
            }
        }

        let today = Utc::now().date_naive();
        for project_id in pending {
            match Task::mark_overdue_batch(&db, project_id, today).await {
                Ok(0) => {}
                Ok(count) => {
                    tracing::info!(%project_id, count, "Marked tasks overdue");
                }
                Err(err) => {
                    tracing::warn!(%project_id, error = %err, "Overdue sweep failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::{
        project::{CreateProject, Project},
        status::{OVERDUE_LABEL, Status},
        task::{CreateTask, Task},
        user::{CreateUser, User},
    };
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    #[tokio::test]
    async fn sweep_marks_past_due_tasks_after_the_debounce() {
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
        let task = Task::create(
            &db,
            &CreateTask {
                project_id: project.id,
                phase_id: None,
                milestone_id: None,
                parent_task_id: None,
                title: "Late".to_string(),
                description: None,
                status_id: None,
                priority_id: None,
                start_date: None,
                end_date: Some(Utc::now().date_naive() - chrono::Duration::days(2)),
                assignee_ids: Vec::new(),
            },
            Uuid::new_v4(),
            user.id,
        )
        .await
        .unwrap();

        let sweeper = OverdueSweeper::spawn_with_debounce(db.clone(), Duration::from_millis(20));
        // Coalesced into a single batch.
        sweeper.request_sweep(project.id);
        sweeper.request_sweep(project.id);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let overdue = Status::find_by_project(&db, project.id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.label == OVERDUE_LABEL)
            .unwrap();
        let task = Task::find_by_id(&db, task.id).await.unwrap().unwrap();
        assert_eq!(task.status_id, overdue.id);
    }
}
