//! # Hierarchy Repository
//!
//! Resolves external customer, site and probe identifiers to persisted
//! records, creating missing records on first sight, and serves the
//! read-side hierarchy listings.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{
    Customer, Probe, ProbeLatestReading, Site, customer, probe, probe_latest_reading, site,
};

/// Internal identifiers for one resolved probe address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedProbe {
    pub customer_id: Uuid,
    pub site_id: Uuid,
    pub probe_id: Uuid,
}

/// Repository for the customer → site → probe hierarchy
#[derive(Debug, Clone)]
pub struct HierarchyRepository {
    db: Arc<DatabaseConnection>,
}

impl HierarchyRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolve (customer, site, address) to internal identifiers, creating
    /// any missing level. Safe under concurrent callers: every creation is
    /// an insert-if-absent on the natural key followed by a lookup.
    pub async fn resolve(
        &self,
        customer_external_id: &str,
        site_external_id: &str,
        address: &str,
    ) -> Result<ResolvedProbe, RepositoryError> {
        let customer = self.ensure_customer(customer_external_id).await?;
        let site = self.ensure_site(&customer, site_external_id).await?;
        let probe = self.ensure_probe(&site, address).await?;

        Ok(ResolvedProbe {
            customer_id: customer.id,
            site_id: site.id,
            probe_id: probe.id,
        })
    }

    pub async fn ensure_customer(
        &self,
        external_id: &str,
    ) -> Result<customer::Model, RepositoryError> {
        if let Some(existing) = self.find_customer(external_id).await? {
            return Ok(existing);
        }

        let candidate = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            external_id: Set(external_id.to_string()),
            name: Set(format!("Customer {external_id}")),
            created_at: Set(Utc::now().into()),
        };

        let inserted = Customer::insert(candidate)
            .on_conflict(
                OnConflict::column(customer::Column::ExternalId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        if inserted > 0 {
            tracing::info!(customer_id = external_id, "Registered new customer");
        }

        self.find_customer(external_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("customer", external_id))
    }

    /// Ensure the site exists and belongs to `customer`.
    pub async fn ensure_site(
        &self,
        customer: &customer::Model,
        external_id: &str,
    ) -> Result<site::Model, RepositoryError> {
        let site = match self.find_site(external_id).await? {
            Some(existing) => existing,
            None => {
                let candidate = site::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    external_id: Set(external_id.to_string()),
                    customer_id: Set(customer.id),
                    name: Set(format!("Site {external_id}")),
                    created_at: Set(Utc::now().into()),
                };

                let inserted = Site::insert(candidate)
                    .on_conflict(
                        OnConflict::column(site::Column::ExternalId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(&*self.db)
                    .await?;
                if inserted > 0 {
                    tracing::info!(
                        site_id = external_id,
                        customer_id = %customer.external_id,
                        "Registered new site"
                    );
                }

                self.find_site(external_id)
                    .await?
                    .ok_or_else(|| RepositoryError::not_found("site", external_id))?
            }
        };

        if site.customer_id != customer.id {
            return Err(RepositoryError::SiteConflict {
                site_id: external_id.to_string(),
                claimed_customer_id: customer.external_id.clone(),
            });
        }

        Ok(site)
    }

    /// Ensure the probe exists and is bound to `site`.
    pub async fn ensure_probe(
        &self,
        site: &site::Model,
        address: &str,
    ) -> Result<probe::Model, RepositoryError> {
        let probe = match self.find_probe(address).await? {
            Some(existing) => existing,
            None => {
                let candidate = probe::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    address: Set(address.to_string()),
                    site_id: Set(site.id),
                    created_at: Set(Utc::now().into()),
                };

                let inserted = Probe::insert(candidate)
                    .on_conflict(
                        OnConflict::column(probe::Column::Address)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(&*self.db)
                    .await?;
                if inserted > 0 {
                    tracing::info!(
                        probe = address,
                        site_id = %site.external_id,
                        "Registered new probe"
                    );
                }

                self.find_probe(address)
                    .await?
                    .ok_or_else(|| RepositoryError::not_found("probe", address))?
            }
        };

        if probe.site_id != site.id {
            return Err(RepositoryError::ProbeConflict {
                address: address.to_string(),
                claimed_site_id: site.external_id.clone(),
            });
        }

        Ok(probe)
    }

    pub async fn find_customer(
        &self,
        external_id: &str,
    ) -> Result<Option<customer::Model>, RepositoryError> {
        Ok(Customer::find()
            .filter(customer::Column::ExternalId.eq(external_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_site(&self, external_id: &str) -> Result<Option<site::Model>, RepositoryError> {
        Ok(Site::find()
            .filter(site::Column::ExternalId.eq(external_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_probe(&self, address: &str) -> Result<Option<probe::Model>, RepositoryError> {
        Ok(Probe::find()
            .filter(probe::Column::Address.eq(address))
            .one(&*self.db)
            .await?)
    }

    /// All customers, ordered by external id.
    pub async fn list_customers(&self) -> Result<Vec<customer::Model>, RepositoryError> {
        Ok(Customer::find()
            .order_by_asc(customer::Column::ExternalId)
            .all(&*self.db)
            .await?)
    }

    /// Sites of a customer, ordered by external id.
    pub async fn list_sites(
        &self,
        customer_external_id: &str,
    ) -> Result<(customer::Model, Vec<site::Model>), RepositoryError> {
        let customer = self
            .find_customer(customer_external_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("customer", customer_external_id))?;

        let sites = Site::find()
            .filter(site::Column::CustomerId.eq(customer.id))
            .order_by_asc(site::Column::ExternalId)
            .all(&*self.db)
            .await?;

        Ok((customer, sites))
    }

    /// Probes of a site together with their latest-reading projection.
    pub async fn list_probes_with_latest(
        &self,
        site_external_id: &str,
    ) -> Result<
        (
            customer::Model,
            site::Model,
            Vec<(probe::Model, Option<probe_latest_reading::Model>)>,
        ),
        RepositoryError,
    > {
        let site = self
            .find_site(site_external_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("site", site_external_id))?;
        let customer = Customer::find_by_id(site.customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("customer", site.customer_id.to_string()))?;

        let probes = Probe::find()
            .filter(probe::Column::SiteId.eq(site.id))
            .find_also_related(ProbeLatestReading)
            .order_by_asc(probe::Column::Address)
            .all(&*self.db)
            .await?;

        Ok((customer, site, probes))
    }
}
