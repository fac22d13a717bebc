//! Database migrations for the probe ingestion service.
//!
//! Schema for the customer → site → probe → measurement hierarchy and the
//! per-probe latest-reading projection, managed with SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_10_01_000001_create_customers;
mod m2026_10_01_000002_create_sites;
mod m2026_10_01_000003_create_probes;
mod m2026_10_01_000004_create_measurements;
mod m2026_10_01_000005_create_probe_latest_readings;
mod m2026_10_02_000001_add_read_path_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_10_01_000001_create_customers::Migration),
            Box::new(m2026_10_01_000002_create_sites::Migration),
            Box::new(m2026_10_01_000003_create_probes::Migration),
            Box::new(m2026_10_01_000004_create_measurements::Migration),
            Box::new(m2026_10_01_000005_create_probe_latest_readings::Migration),
            Box::new(m2026_10_02_000001_add_read_path_indexes::Migration),
        ]
    }
}
