use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub uuid: Uuid,
    pub project_id: i64,
    pub phase_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub parent_task_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub status_id: i64,
    pub priority_id: i64,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub created_by: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
