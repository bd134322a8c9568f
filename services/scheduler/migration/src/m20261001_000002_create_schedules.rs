use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Schedules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Schedules::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Schedules::UserId).uuid().not_null())
                    .col(ColumnDef::new(Schedules::ReviewId).uuid().not_null())
                    .col(
                        ColumnDef::new(Schedules::ScheduledFor)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Schedules::Status)
                            .string()
                            .not_null()
                            .default("pending")
                            .check(Expr::col(Schedules::Status).is_in([
                                "pending", "posted", "failed",
                            ])),
                    )
                    .col(
                        ColumnDef::new(Schedules::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Schedules::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(ColumnDef::new(Schedules::ErrorMessage).text())
                    .col(ColumnDef::new(Schedules::NextRetryAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Schedules::TargetType).string().not_null())
                    .col(ColumnDef::new(Schedules::TargetId).string().not_null())
                    .col(ColumnDef::new(Schedules::TargetName).string())
                    .col(ColumnDef::new(Schedules::PostMessage).text().not_null())
                    .col(ColumnDef::new(Schedules::LandingPageUrl).string())
                    .col(ColumnDef::new(Schedules::PostedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Schedules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Schedules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::col(Schedules::RetryCount).lte(Expr::col(Schedules::MaxRetries)))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Schedules::Table, Schedules::ReviewId)
                            .to(Reviews::Table, Reviews::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Dispatcher candidate scan: status = 'pending' ordered by scheduled_for.
        manager
            .create_index(
                Index::create()
                    .table(Schedules::Table)
                    .col(Schedules::Status)
                    .col(Schedules::ScheduledFor)
                    .name("idx_schedules_status_scheduled_for")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Schedules::Table)
                    .col(Schedules::UserId)
                    .name("idx_schedules_user_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Schedules::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Schedules {
    Table,
    Id,
    UserId,
    ReviewId,
    ScheduledFor,
    Status,
    RetryCount,
    MaxRetries,
    ErrorMessage,
    NextRetryAt,
    TargetType,
    TargetId,
    TargetName,
    PostMessage,
    LandingPageUrl,
    PostedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Reviews {
    Table,
    Id,
}
