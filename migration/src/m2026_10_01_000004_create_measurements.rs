//! Migration to create the measurements table.
//!
//! Measurements are append-only. No uniqueness on `(probe_id, timestamp)`:
//! equal-timestamp arrivals are all retained.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Measurements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Measurements::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Measurements::ProbeId).uuid().not_null())
                    .col(
                        ColumnDef::new(Measurements::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Measurements::Fields).json_binary().not_null())
                    .col(
                        ColumnDef::new(Measurements::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_measurements_probe_id")
                            .from(Measurements::Table, Measurements::ProbeId)
                            .to(Probes::Table, Probes::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // History queries filter by probe and range over timestamp
        manager
            .create_index(
                Index::create()
                    .name("idx_measurements_probe_timestamp")
                    .table(Measurements::Table)
                    .col(Measurements::ProbeId)
                    .col(Measurements::Timestamp)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_measurements_probe_timestamp")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Measurements::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Measurements {
    Table,
    Id,
    ProbeId,
    Timestamp,
    Fields,
    ReceivedAt,
}

#[derive(DeriveIden)]
enum Probes {
    Table,
    Id,
}
