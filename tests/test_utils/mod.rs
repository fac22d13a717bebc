//! Test utilities for database-backed tests.
//!
//! In-memory SQLite databases with migrations applied, plus a small builder
//! for batch documents.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use probe_ingest::config::IngestConfig;
use probe_ingest::ingest::IngestionService;
use sea_orm::{Database, DatabaseConnection};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Ingestion service over a fresh database.
pub async fn setup_ingestion() -> Result<(Arc<DatabaseConnection>, IngestionService)> {
    setup_ingestion_with(IngestConfig::default()).await
}

pub async fn setup_ingestion_with(
    config: IngestConfig,
) -> Result<(Arc<DatabaseConnection>, IngestionService)> {
    let db = setup_test_db_arc().await?;
    let service = IngestionService::new(db.clone(), &config);
    Ok((db, service))
}

/// One `<Probe>` element.
#[derive(Debug, Clone)]
pub struct ProbeXml {
    pub address: Option<String>,
    pub timestamp: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl ProbeXml {
    pub fn new(address: &str, timestamp: &str) -> Self {
        Self {
            address: Some(address.to_string()),
            timestamp: Some(timestamp.to_string()),
            fields: vec![("Product".to_string(), "840.5".to_string())],
        }
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.retain(|(n, _)| n != name);
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn without_address(mut self) -> Self {
        self.address = None;
        self
    }

    fn render(&self) -> String {
        let mut xml = String::from("    <Probe>\n");
        if let Some(address) = &self.address {
            xml.push_str(&format!("      <Address>{address}</Address>\n"));
        }
        if let Some(timestamp) = &self.timestamp {
            xml.push_str(&format!("      <DateTime>{timestamp}</DateTime>\n"));
        }
        for (name, value) in &self.fields {
            xml.push_str(&format!("      <{name}>{value}</{name}>\n"));
        }
        xml.push_str("    </Probe>\n");
        xml
    }
}

/// Render a complete `<Site>` batch document.
pub fn site_document(customer_id: &str, site_id: &str, probes: &[ProbeXml]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Site>\n  <CustomerID>{customer_id}</CustomerID>\n  <SiteID>{site_id}</SiteID>\n  <Probes>\n"
    );
    for probe in probes {
        xml.push_str(&probe.render());
    }
    xml.push_str("  </Probes>\n</Site>\n");
    xml
}
