//! Measurement entity model
//!
//! An immutable historical reading for one probe. `fields` holds the open
//! mapping of measurement names to numeric or text values as JSON.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "measurements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub probe_id: Uuid,

    /// Reading time reported by the probe (normalized to UTC)
    pub timestamp: DateTimeWithTimeZone,

    /// Named measurement values, e.g. `{"product": 123.45, "temperature_1": 23.5}`
    #[sea_orm(column_type = "JsonBinary")]
    pub fields: JsonValue,

    /// Time the batch carrying this reading was accepted
    pub received_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::probe::Entity",
        from = "Column::ProbeId",
        to = "super::probe::Column::Id"
    )]
    Probe,
}

impl Related<super::probe::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Probe.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
