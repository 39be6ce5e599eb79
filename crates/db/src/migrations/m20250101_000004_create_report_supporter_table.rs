//! Create report supporter table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReportSupporter::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReportSupporter::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReportSupporter::ReportId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportSupporter::UserId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportSupporter::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_report_supporter_report")
                            .from(ReportSupporter::Table, ReportSupporter::ReportId)
                            .to(Report::Table, Report::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (report_id, user_id) - supporters form a set
        manager
            .create_index(
                Index::create()
                    .name("idx_report_supporter_report_user")
                    .table(ReportSupporter::Table)
                    .col(ReportSupporter::ReportId)
                    .col(ReportSupporter::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReportSupporter::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ReportSupporter {
    Table,
    Id,
    ReportId,
    UserId,
    CreatedAt,
}

#[derive(Iden)]
enum Report {
    Table,
    Id,
}
