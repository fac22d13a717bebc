//! Probe entity model
//!
//! A physical tank sensor identified by its hardware address. The address is
//! globally unique and is the natural join key for incoming readings.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "probes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Hardware/serial code from `<Address>`
    #[sea_orm(unique)]
    pub address: String,

    /// Owning site; never repointed
    pub site_id: Uuid,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::site::Entity",
        from = "Column::SiteId",
        to = "super::site::Column::Id"
    )]
    Site,
    #[sea_orm(has_many = "super::measurement::Entity")]
    Measurements,
    #[sea_orm(has_one = "super::probe_latest_reading::Entity")]
    LatestReading,
}

impl Related<super::site::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Site.def()
    }
}

impl Related<super::measurement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Measurements.def()
    }
}

impl Related<super::probe_latest_reading::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LatestReading.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
