use sea_orm_migration::{prelude::*, sea_orm::DatabaseBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Users::Table)
                    .col(pk_id_col(manager, Users::Id))
                    .col(uuid_col(Users::Uuid))
                    .col(ColumnDef::new(Users::Username).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .col(timestamp_col(Users::CreatedAt))
                    .col(timestamp_col(Users::UpdatedAt))
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_users_uuid", Users::Table, &[Users::Uuid]).await?;
        unique_index(manager, "idx_users_email", Users::Table, &[Users::Email]).await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Projects::Table)
                    .col(pk_id_col(manager, Projects::Id))
                    .col(uuid_col(Projects::Uuid))
                    .col(ColumnDef::new(Projects::Name).string().not_null())
                    .col(ColumnDef::new(Projects::Description).text())
                    .col(
                        ColumnDef::new(Projects::Category)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("internal")),
                    )
                    .col(ColumnDef::new(Projects::Code).string().not_null())
                    .col(
                        ColumnDef::new(Projects::Closed)
                            .boolean()
                            .not_null()
                            .default(Expr::val(false)),
                    )
                    .col(fk_id_col(manager, Projects::CreatedBy))
                    .col(timestamp_col(Projects::CreatedAt))
                    .col(timestamp_col(Projects::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_created_by")
                            .from(Projects::Table, Projects::CreatedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_projects_uuid", Projects::Table, &[Projects::Uuid]).await?;
        unique_index(manager, "idx_projects_code", Projects::Table, &[Projects::Code]).await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Phases::Table)
                    .col(pk_id_col(manager, Phases::Id))
                    .col(uuid_col(Phases::Uuid))
                    .col(fk_id_col(manager, Phases::ProjectId))
                    .col(ColumnDef::new(Phases::Label).string().not_null())
                    .col(ColumnDef::new(Phases::PhaseOrder).integer().not_null())
                    .col(
                        ColumnDef::new(Phases::State)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("pending")),
                    )
                    .col(ColumnDef::new(Phases::StartDate).date())
                    .col(ColumnDef::new(Phases::EndDate).date())
                    .col(ColumnDef::new(Phases::ActualEndDate).timestamp())
                    .col(timestamp_col(Phases::CreatedAt))
                    .col(timestamp_col(Phases::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_phases_project_id")
                            .from(Phases::Table, Phases::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_phases_uuid", Phases::Table, &[Phases::Uuid]).await?;
        unique_index(
            manager,
            "idx_phases_project_order",
            Phases::Table,
            &[Phases::ProjectId, Phases::PhaseOrder],
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Milestones::Table)
                    .col(pk_id_col(manager, Milestones::Id))
                    .col(uuid_col(Milestones::Uuid))
                    .col(fk_id_col(manager, Milestones::PhaseId))
                    .col(ColumnDef::new(Milestones::Label).string().not_null())
                    .col(
                        ColumnDef::new(Milestones::MilestoneOrder)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Milestones::State)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("pending")),
                    )
                    .col(ColumnDef::new(Milestones::StartDate).date())
                    .col(ColumnDef::new(Milestones::EndDate).date())
                    .col(ColumnDef::new(Milestones::ActualEndDate).timestamp())
                    .col(timestamp_col(Milestones::CreatedAt))
                    .col(timestamp_col(Milestones::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_milestones_phase_id")
                            .from(Milestones::Table, Milestones::PhaseId)
                            .to(Phases::Table, Phases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_milestones_uuid", Milestones::Table, &[Milestones::Uuid])
            .await?;
        unique_index(
            manager,
            "idx_milestones_phase_order",
            Milestones::Table,
            &[Milestones::PhaseId, Milestones::MilestoneOrder],
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Statuses::Table)
                    .col(pk_id_col(manager, Statuses::Id))
                    .col(uuid_col(Statuses::Uuid))
                    .col(fk_id_col(manager, Statuses::ProjectId))
                    .col(ColumnDef::new(Statuses::Label).string().not_null())
                    .col(ColumnDef::new(Statuses::Color).string().not_null())
                    .col(ColumnDef::new(Statuses::SortOrder).integer().not_null())
                    .col(timestamp_col(Statuses::CreatedAt))
                    .col(timestamp_col(Statuses::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_statuses_project_id")
                            .from(Statuses::Table, Statuses::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_statuses_uuid", Statuses::Table, &[Statuses::Uuid]).await?;
        unique_index(
            manager,
            "idx_statuses_project_label",
            Statuses::Table,
            &[Statuses::ProjectId, Statuses::Label],
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Priorities::Table)
                    .col(pk_id_col(manager, Priorities::Id))
                    .col(uuid_col(Priorities::Uuid))
                    .col(fk_id_col(manager, Priorities::ProjectId))
                    .col(ColumnDef::new(Priorities::Label).string().not_null())
                    .col(ColumnDef::new(Priorities::Color).string().not_null())
                    .col(ColumnDef::new(Priorities::SortOrder).integer().not_null())
                    .col(timestamp_col(Priorities::CreatedAt))
                    .col(timestamp_col(Priorities::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_priorities_project_id")
                            .from(Priorities::Table, Priorities::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_priorities_uuid", Priorities::Table, &[Priorities::Uuid])
            .await?;
        unique_index(
            manager,
            "idx_priorities_project_label",
            Priorities::Table,
            &[Priorities::ProjectId, Priorities::Label],
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Tasks::Table)
                    .col(pk_id_col(manager, Tasks::Id))
                    .col(uuid_col(Tasks::Uuid))
                    .col(fk_id_col(manager, Tasks::ProjectId))
                    .col(fk_id_nullable_col(manager, Tasks::PhaseId))
                    .col(fk_id_nullable_col(manager, Tasks::MilestoneId))
                    .col(fk_id_nullable_col(manager, Tasks::ParentTaskId))
                    .col(ColumnDef::new(Tasks::Title).string().not_null())
                    .col(ColumnDef::new(Tasks::Description).text())
                    .col(fk_id_col(manager, Tasks::StatusId))
                    .col(fk_id_col(manager, Tasks::PriorityId))
                    .col(ColumnDef::new(Tasks::StartDate).date())
                    .col(ColumnDef::new(Tasks::EndDate).date())
                    .col(fk_id_col(manager, Tasks::CreatedBy))
                    .col(timestamp_col(Tasks::CreatedAt))
                    .col(timestamp_col(Tasks::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_project_id")
                            .from(Tasks::Table, Tasks::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_phase_id")
                            .from(Tasks::Table, Tasks::PhaseId)
                            .to(Phases::Table, Phases::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_milestone_id")
                            .from(Tasks::Table, Tasks::MilestoneId)
                            .to(Milestones::Table, Milestones::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_parent_task_id")
                            .from(Tasks::Table, Tasks::ParentTaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_status_id")
                            .from(Tasks::Table, Tasks::StatusId)
                            .to(Statuses::Table, Statuses::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_priority_id")
                            .from(Tasks::Table, Tasks::PriorityId)
                            .to(Priorities::Table, Priorities::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_created_by")
                            .from(Tasks::Table, Tasks::CreatedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_tasks_uuid", Tasks::Table, &[Tasks::Uuid]).await?;
        index(manager, "idx_tasks_project_id", Tasks::Table, &[Tasks::ProjectId]).await?;
        index(manager, "idx_tasks_phase_id", Tasks::Table, &[Tasks::PhaseId]).await?;
        index(manager, "idx_tasks_milestone_id", Tasks::Table, &[Tasks::MilestoneId]).await?;
        index(manager, "idx_tasks_parent_task_id", Tasks::Table, &[Tasks::ParentTaskId]).await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(TaskAssignees::Table)
                    .col(pk_id_col(manager, TaskAssignees::Id))
                    .col(fk_id_col(manager, TaskAssignees::TaskId))
                    .col(fk_id_col(manager, TaskAssignees::UserId))
                    .col(timestamp_col(TaskAssignees::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_assignees_task_id")
                            .from(TaskAssignees::Table, TaskAssignees::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_assignees_user_id")
                            .from(TaskAssignees::Table, TaskAssignees::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(
            manager,
            "idx_task_assignees_task_user",
            TaskAssignees::Table,
            &[TaskAssignees::TaskId, TaskAssignees::UserId],
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Activities::Table)
                    .col(pk_id_col(manager, Activities::Id))
                    .col(uuid_col(Activities::Uuid))
                    .col(fk_id_col(manager, Activities::TaskId))
                    .col(fk_id_col(manager, Activities::ActorId))
                    .col(ColumnDef::new(Activities::Content).json().not_null())
                    .col(timestamp_col(Activities::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_activities_task_id")
                            .from(Activities::Table, Activities::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_activities_actor_id")
                            .from(Activities::Table, Activities::ActorId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_activities_uuid", Activities::Table, &[Activities::Uuid])
            .await?;
        index(manager, "idx_activities_task_id", Activities::Table, &[Activities::TaskId])
            .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Comments::Table)
                    .col(pk_id_col(manager, Comments::Id))
                    .col(uuid_col(Comments::Uuid))
                    .col(fk_id_col(manager, Comments::TaskId))
                    .col(fk_id_col(manager, Comments::AuthorId))
                    .col(fk_id_nullable_col(manager, Comments::ParentId))
                    .col(ColumnDef::new(Comments::Body).text().not_null())
                    .col(timestamp_col(Comments::CreatedAt))
                    .col(timestamp_col(Comments::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comments_task_id")
                            .from(Comments::Table, Comments::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comments_author_id")
                            .from(Comments::Table, Comments::AuthorId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comments_parent_id")
                            .from(Comments::Table, Comments::ParentId)
                            .to(Comments::Table, Comments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(manager, "idx_comments_uuid", Comments::Table, &[Comments::Uuid]).await?;
        index(manager, "idx_comments_task_id", Comments::Table, &[Comments::TaskId]).await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(ProjectMembers::Table)
                    .col(pk_id_col(manager, ProjectMembers::Id))
                    .col(uuid_col(ProjectMembers::Uuid))
                    .col(fk_id_col(manager, ProjectMembers::ProjectId))
                    .col(fk_id_col(manager, ProjectMembers::UserId))
                    .col(
                        ColumnDef::new(ProjectMembers::Role)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("read")),
                    )
                    .col(
                        ColumnDef::new(ProjectMembers::InviteStatus)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("invited")),
                    )
                    .col(timestamp_col(ProjectMembers::InvitedAt))
                    .col(ColumnDef::new(ProjectMembers::JoinedAt).timestamp())
                    .col(timestamp_col(ProjectMembers::CreatedAt))
                    .col(timestamp_col(ProjectMembers::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_members_project_id")
                            .from(ProjectMembers::Table, ProjectMembers::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_members_user_id")
                            .from(ProjectMembers::Table, ProjectMembers::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        unique_index(
            manager,
            "idx_project_members_uuid",
            ProjectMembers::Table,
            &[ProjectMembers::Uuid],
        )
        .await?;
        unique_index(
            manager,
            "idx_project_members_project_user",
            ProjectMembers::Table,
            &[ProjectMembers::ProjectId, ProjectMembers::UserId],
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProjectMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Comments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Activities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskAssignees::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Priorities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Statuses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Milestones::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Phases::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

async fn index<T: Iden + Copy + 'static>(
    manager: &SchemaManager<'_>,
    name: &str,
    table: T,
    columns: &[T],
) -> Result<(), DbErr> {
    let mut idx = Index::create();
    idx.if_not_exists().name(name).table(table);
    for col in columns {
        idx.col(*col);
    }
    manager.create_index(idx.to_owned()).await
}

async fn unique_index<T: Iden + Copy + 'static>(
    manager: &SchemaManager<'_>,
    name: &str,
    table: T,
    columns: &[T],
) -> Result<(), DbErr> {
    let mut idx = Index::create();
    idx.if_not_exists().name(name).table(table).unique();
    for col in columns {
        idx.col(*col);
    }
    manager.create_index(idx.to_owned()).await
}

fn pk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().auto_increment().primary_key().to_owned()
}

fn fk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().to_owned()
}

fn fk_id_nullable_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.to_owned()
}

fn uuid_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().not_null().to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden, Clone, Copy)]
enum Users {
    Table,
    Id,
    Uuid,
    Username,
    Email,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Projects {
    Table,
    Id,
    Uuid,
    Name,
    Description,
    Category,
    Code,
    Closed,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Phases {
    Table,
    Id,
    Uuid,
    ProjectId,
    Label,
    PhaseOrder,
    State,
    StartDate,
    EndDate,
    ActualEndDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Milestones {
    Table,
    Id,
    Uuid,
    PhaseId,
    Label,
    MilestoneOrder,
    State,
    StartDate,
    EndDate,
    ActualEndDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Statuses {
    Table,
    Id,
    Uuid,
    ProjectId,
    Label,
    Color,
    SortOrder,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Priorities {
    Table,
    Id,
    Uuid,
    ProjectId,
    Label,
    Color,
    SortOrder,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Tasks {
    Table,
    Id,
    Uuid,
    ProjectId,
    PhaseId,
    MilestoneId,
    ParentTaskId,
    Title,
    Description,
    StatusId,
    PriorityId,
    StartDate,
    EndDate,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum TaskAssignees {
    Table,
    Id,
    TaskId,
    UserId,
    CreatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Activities {
    Table,
    Id,
    Uuid,
    TaskId,
    ActorId,
    Content,
    CreatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Comments {
    Table,
    Id,
    Uuid,
    TaskId,
    AuthorId,
    ParentId,
    Body,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum ProjectMembers {
    Table,
    Id,
    Uuid,
    ProjectId,
    UserId,
    Role,
    InviteStatus,
    InvitedAt,
    JoinedAt,
    CreatedAt,
    UpdatedAt,
}
