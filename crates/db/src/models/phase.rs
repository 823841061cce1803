use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::phase,
    models::ids,
    types::ProgressState,
};

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Phase not found")]
    PhaseNotFound,
    #[error("Project not found")]
    ProjectNotFound,
    #[error("Phase order {0} is already taken in this project")]
    DuplicateOrder(i32),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Phase {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: String,
    pub phase_order: i32,
    pub state: ProgressState,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[ts(type = "Date | null")]
    pub actual_end_date: Option<DateTime<Utc>>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreatePhase {
    pub project_id: Uuid,
    pub label: String,
    /// Appended after the highest existing order when omitted.
    pub phase_order: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdatePhase {
    pub label: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Phase {
    async fn from_model<C: ConnectionTrait>(db: &C, model: phase::Model) -> Result<Self, DbErr> {
        let project_id = ids::project_uuid_by_id(db, model.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        Ok(Self {
            id: model.uuid,
            project_id,
            label: model.label,
            phase_order: model.phase_order,
            state: model.state,
            start_date: model.start_date,
            end_date: model.end_date,
            actual_end_date: model.actual_end_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    /// The first phase of a project starts out in progress; every later
    /// phase waits for the cascade from its predecessor.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreatePhase,
        phase_id: Uuid,
    ) -> Result<Self, PhaseError> {
        let project_row_id = ids::project_id_by_uuid(db, data.project_id)
            .await?
            .ok_or(PhaseError::ProjectNotFound)?;

        let existing = phase::Entity::find()
            .filter(phase::Column::ProjectId.eq(project_row_id))
            .order_by_desc(phase::Column::PhaseOrder)
            .all(db)
            .await?;

        let phase_order = match data.phase_order {
            Some(order) => {
                if existing.iter().any(|p| p.phase_order == order) {
                    return Err(PhaseError::DuplicateOrder(order));
                }
                order
            }
            None => existing.first().map(|p| p.phase_order + 1).unwrap_or(1),
        };

        let state = if existing.is_empty() {
            ProgressState::InProgress
        } else {
            ProgressState::Pending
        };

        let now = Utc::now();
        let active = phase::ActiveModel {
            uuid: Set(phase_id),
            project_id: Set(project_row_id),
            label: Set(data.label.trim().to_string()),
            phase_order: Set(phase_order),
            state: Set(state),
            start_date: Set(data.start_date),
            end_date: Set(data.end_date),
            actual_end_date: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Self::from_model(db, model).await.map_err(PhaseError::from)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = phase::Entity::find()
            .filter(phase::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_project<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, PhaseError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(PhaseError::ProjectNotFound)?;
        let records = phase::Entity::find()
            .filter(phase::Column::ProjectId.eq(project_row_id))
            .order_by_asc(phase::Column::PhaseOrder)
            .all(db)
            .await?;

        let mut phases = Vec::with_capacity(records.len());
        for model in records {
            phases.push(Self::from_model(db, model).await?);
        }
        Ok(phases)
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        payload: &UpdatePhase,
    ) -> Result<Self, DbErr> {
        let record = phase::Entity::find()
            .filter(phase::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Phase not found".to_string()))?;

        let mut active: phase::ActiveModel = record.into();
        if let Some(label) = payload.label.clone() {
            active.label = Set(label.trim().to_string());
        }
        if payload.start_date.is_some() {
            active.start_date = Set(payload.start_date);
        }
        if payload.end_date.is_some() {
            active.end_date = Set(payload.end_date);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    /// Conditional completion: flips `inprogress -> done` and stamps the
    /// actual end, affecting zero rows when the phase is in any other
    /// state. The rows-affected count is the compare-and-swap outcome.
    pub async fn try_mark_done<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = phase::Entity::update_many()
            .col_expr(phase::Column::State, Expr::value(ProgressState::Done))
            .col_expr(phase::Column::ActualEndDate, Expr::value(Some(now)))
            .col_expr(phase::Column::UpdatedAt, Expr::value(now))
            .filter(phase::Column::Uuid.eq(id))
            .filter(phase::Column::State.eq(ProgressState::InProgress))
            .exec(db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Cascading activation: moves the next-ordered pending phase of the
    /// same project to in progress. Returns the activated phase, if any.
    pub async fn try_activate_next<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        completed_order: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        let next = phase::Entity::find()
            .filter(phase::Column::ProjectId.eq(project_row_id))
            .filter(phase::Column::PhaseOrder.eq(completed_order + 1))
            .one(db)
            .await?;

        let Some(next) = next else {
            return Ok(None);
        };

        let result = phase::Entity::update_many()
            .col_expr(phase::Column::State, Expr::value(ProgressState::InProgress))
            .col_expr(phase::Column::UpdatedAt, Expr::value(now))
            .filter(phase::Column::Id.eq(next.id))
            .filter(phase::Column::State.eq(ProgressState::Pending))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        Self::find_by_id(db, next.uuid).await
    }
}
