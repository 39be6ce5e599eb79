//! Create report table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Report::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Report::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Report::Title).text().not_null())
                    .col(ColumnDef::new(Report::Description).text().not_null())
                    .col(ColumnDef::new(Report::AuthorId).string_len(128).not_null())
                    .col(ColumnDef::new(Report::AuthorName).string_len(256))
                    .col(ColumnDef::new(Report::AuthorPhotoUrl).text())
                    .col(
                        ColumnDef::new(Report::Pinned)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Report::Resolved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Report::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: created_at (feed order)
        manager
            .create_index(
                Index::create()
                    .name("idx_report_created_at")
                    .table(Report::Table)
                    .col(Report::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: pinned (pinned-only filter)
        manager
            .create_index(
                Index::create()
                    .name("idx_report_pinned")
                    .table(Report::Table)
                    .col(Report::Pinned)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Report::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Report {
    Table,
    Id,
    Title,
    Description,
    AuthorId,
    AuthorName,
    AuthorPhotoUrl,
    Pinned,
    Resolved,
    CreatedAt,
}
