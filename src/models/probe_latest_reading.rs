//! Latest-reading projection entity model
//!
//! Denormalized summary of the newest measurement per probe, used by the
//! dashboard listing. Never regresses to an older timestamp.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "probe_latest_readings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub probe_id: Uuid,

    /// Measurement currently projected
    pub measurement_id: Uuid,

    pub timestamp: DateTimeWithTimeZone,

    /// One of `ok`, `acknowledged`, `alarm`, `unknown`
    pub alarm_state: String,

    /// Product level of the projected reading, when numeric
    pub primary_value: Option<f64>,

    pub updated_at: DateTimeWithTimeZone,
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
