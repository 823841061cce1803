use sea_orm::entity::prelude::*;

use crate::types::ProgressState;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "milestones")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub uuid: Uuid,
    pub phase_id: i64,
    pub label: String,
    pub milestone_order: i32,
    pub state: ProgressState,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub actual_end_date: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
