//! Adds secondary indexes for the dashboard read path.
//!
//! Covers listing sites per customer, probes per site, and time-ordered scans
//! across all measurements.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sites_customer_id")
                    .table(Sites::Table)
                    .col(Sites::CustomerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_probes_site_id")
                    .table(Probes::Table)
                    .col(Probes::SiteId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_measurements_timestamp")
                    .table(Measurements::Table)
                    .col(Measurements::Timestamp)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_measurements_timestamp",
            "idx_probes_site_id",
            "idx_sites_customer_id",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Sites {
    Table,
    CustomerId,
}

#[derive(DeriveIden)]
enum Probes {
    Table,
    SiteId,
}

#[derive(DeriveIden)]
enum Measurements {
    Table,
    Timestamp,
}
