use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FeedItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FeedItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FeedItems::ActorId).uuid().null())
                    .col(ColumnDef::new(FeedItems::ActivityType).string().not_null())
                    .col(ColumnDef::new(FeedItems::Title).string().not_null())
                    .col(ColumnDef::new(FeedItems::Description).text().not_null())
                    .col(ColumnDef::new(FeedItems::TaskId).uuid().null())
                    .col(ColumnDef::new(FeedItems::ProjectId).uuid().null())
                    .col(ColumnDef::new(FeedItems::CommentId).uuid().null())
                    .col(ColumnDef::new(FeedItems::OrganizationId).uuid().not_null())
                    .col(
                        ColumnDef::new(FeedItems::Metadata)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FeedItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_feed_items_organization")
                            .from(FeedItems::Table, FeedItems::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create indexes separately (Postgres does not support arbitrary index-like "CONSTRAINT (...)" clauses).
        manager
            .create_index(
                Index::create()
                    .name("idx_feed_items_created_at")
                    .table(FeedItems::Table)
                    .col(FeedItems::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_feed_items_organization_id")
                    .table(FeedItems::Table)
                    .col(FeedItems::OrganizationId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FeedItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum FeedItems {
    Table,
    Id,
    ActorId,
    ActivityType,
    Title,
    Description,
    TaskId,
    ProjectId,
    CommentId,
    OrganizationId,
    Metadata,
    CreatedAt,
}
