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

use crate::{entities::milestone, models::ids, types::ProgressState};

#[derive(Debug, Error)]
pub enum MilestoneError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Milestone not found")]
    MilestoneNotFound,
    #[error("Phase not found")]
    PhaseNotFound,
    #[error("Milestone order {0} is already taken in this phase")]
    DuplicateOrder(i32),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Milestone {
    pub id: Uuid,
    pub phase_id: Uuid,
    pub label: String,
    pub milestone_order: i32,
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
pub struct CreateMilestone {
    pub phase_id: Uuid,
    pub label: String,
    pub milestone_order: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateMilestone {
    pub label: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Milestone {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: milestone::Model,
    ) -> Result<Self, DbErr> {
        let phase_id = ids::phase_uuid_by_id(db, model.phase_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Phase not found".to_string()))?;
        Ok(Self {
            id: model.uuid,
            phase_id,
            label: model.label,
            milestone_order: model.milestone_order,
            state: model.state,
            start_date: model.start_date,
            end_date: model.end_date,
            actual_end_date: model.actual_end_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    /// No cascade exists between sibling milestones, so each one starts
    /// in progress immediately instead of waiting on a predecessor.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateMilestone,
        milestone_id: Uuid,
    ) -> Result<Self, MilestoneError> {
        let phase_row_id = ids::phase_id_by_uuid(db, data.phase_id)
            .await?
            .ok_or(MilestoneError::PhaseNotFound)?;

        let existing = milestone::Entity::find()
            .filter(milestone::Column::PhaseId.eq(phase_row_id))
            .order_by_desc(milestone::Column::MilestoneOrder)
            .all(db)
            .await?;

        let milestone_order = match data.milestone_order {
            Some(order) => {
                if existing.iter().any(|m| m.milestone_order == order) {
                    return Err(MilestoneError::DuplicateOrder(order));
                }
                order
            }
            None => existing.first().map(|m| m.milestone_order + 1).unwrap_or(1),
        };

        let now = Utc::now();
        let active = milestone::ActiveModel {
            uuid: Set(milestone_id),
            phase_id: Set(phase_row_id),
            label: Set(data.label.trim().to_string()),
            milestone_order: Set(milestone_order),
            state: Set(ProgressState::InProgress),
            start_date: Set(data.start_date),
            end_date: Set(data.end_date),
            actual_end_date: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Self::from_model(db, model)
            .await
            .map_err(MilestoneError::from)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = milestone::Entity::find()
            .filter(milestone::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_phase<C: ConnectionTrait>(
        db: &C,
        phase_id: Uuid,
    ) -> Result<Vec<Self>, MilestoneError> {
        let phase_row_id = ids::phase_id_by_uuid(db, phase_id)
            .await?
            .ok_or(MilestoneError::PhaseNotFound)?;
        let records = milestone::Entity::find()
            .filter(milestone::Column::PhaseId.eq(phase_row_id))
            .order_by_asc(milestone::Column::MilestoneOrder)
            .all(db)
            .await?;

        let mut milestones = Vec::with_capacity(records.len());
        for model in records {
            milestones.push(Self::from_model(db, model).await?);
        }
        Ok(milestones)
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        payload: &UpdateMilestone,
    ) -> Result<Self, DbErr> {
        let record = milestone::Entity::find()
            .filter(milestone::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Milestone not found".to_string()))?;

        let mut active: milestone::ActiveModel = record.into();
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

    /// Conditional completion, same compare-and-swap shape as phases.
    /// Milestones never cascade to siblings.
    pub async fn try_mark_done<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = milestone::Entity::update_many()
            .col_expr(milestone::Column::State, Expr::value(ProgressState::Done))
            .col_expr(milestone::Column::ActualEndDate, Expr::value(Some(now)))
            .col_expr(milestone::Column::UpdatedAt, Expr::value(now))
            .filter(milestone::Column::Uuid.eq(id))
            .filter(milestone::Column::State.eq(ProgressState::InProgress))
            .exec(db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
