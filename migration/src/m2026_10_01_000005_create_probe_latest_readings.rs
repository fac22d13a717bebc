//! Migration to create the probe_latest_readings projection table.
//!
//! One row per probe, keyed by probe id. The row only ever moves forward in
//! timestamp; the store advances it with a conditional update.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProbeLatestReadings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProbeLatestReadings::ProbeId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProbeLatestReadings::MeasurementId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProbeLatestReadings::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProbeLatestReadings::AlarmState)
                            .text()
                            .not_null()
                            .default("unknown"),
                    )
                    .col(
                        ColumnDef::new(ProbeLatestReadings::PrimaryValue)
                            .double()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProbeLatestReadings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_probe_latest_readings_probe_id")
                            .from(ProbeLatestReadings::Table, ProbeLatestReadings::ProbeId)
                            .to(Probes::Table, Probes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_probe_latest_readings_measurement_id")
                            .from(
                                ProbeLatestReadings::Table,
                                ProbeLatestReadings::MeasurementId,
                            )
                            .to(Measurements::Table, Measurements::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProbeLatestReadings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProbeLatestReadings {
    Table,
    ProbeId,
    MeasurementId,
    Timestamp,
    AlarmState,
    PrimaryValue,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Probes {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Measurements {
    Table,
    Id,
}
