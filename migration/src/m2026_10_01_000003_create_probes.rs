//! Migration to create the probes table.
//!
//! The probe address is the sensor's hardware code and is unique across the
//! whole system, not just within a site.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Probes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Probes::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Probes::Address).text().not_null())
                    .col(ColumnDef::new(Probes::SiteId).uuid().not_null())
                    .col(
                        ColumnDef::new(Probes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_probes_site_id")
                            .from(Probes::Table, Probes::SiteId)
                            .to(Sites::Table, Sites::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_probes_address")
                    .table(Probes::Table)
                    .col(Probes::Address)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_probes_address").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Probes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Probes {
    Table,
    Id,
    Address,
    SiteId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Sites {
    Table,
    Id,
}
