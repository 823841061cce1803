use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{milestone, phase, priority, project, project_member, status, task, user};

pub async fn project_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    project::Entity::find()
        .select_only()
        .column(project::Column::Id)
        .filter(project::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn project_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    project::Entity::find()
        .select_only()
        .column(project::Column::Uuid)
        .filter(project::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn phase_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    phase::Entity::find()
        .select_only()
        .column(phase::Column::Id)
        .filter(phase::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn phase_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    phase::Entity::find()
        .select_only()
        .column(phase::Column::Uuid)
        .filter(phase::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn milestone_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    milestone::Entity::find()
        .select_only()
        .column(milestone::Column::Id)
        .filter(milestone::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn milestone_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    milestone::Entity::find()
        .select_only()
        .column(milestone::Column::Uuid)
        .filter(milestone::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn task_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    task::Entity::find()
        .select_only()
        .column(task::Column::Id)
        .filter(task::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn task_uuid_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Uuid>, DbErr> {
    task::Entity::find()
        .select_only()
        .column(task::Column::Uuid)
        .filter(task::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn user_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .filter(user::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn user_uuid_by_id<C: ConnectionTrait>(db: &C, id: i64) -> Result<Option<Uuid>, DbErr> {
    user::Entity::find()
        .select_only()
        .column(user::Column::Uuid)
        .filter(user::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn status_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    status::Entity::find()
        .select_only()
        .column(status::Column::Id)
        .filter(status::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn status_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    status::Entity::find()
        .select_only()
        .column(status::Column::Uuid)
        .filter(status::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn priority_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    priority::Entity::find()
        .select_only()
        .column(priority::Column::Id)
        .filter(priority::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}

pub async fn priority_uuid_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<Uuid>, DbErr> {
    priority::Entity::find()
        .select_only()
        .column(priority::Column::Uuid)
        .filter(priority::Column::Id.eq(id))
        .into_tuple()
        .one(db)
        .await
}

pub async fn member_id_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<i64>, DbErr> {
    project_member::Entity::find()
        .select_only()
        .column(project_member::Column::Id)
        .filter(project_member::Column::Uuid.eq(uuid))
        .into_tuple()
        .one(db)
        .await
}
