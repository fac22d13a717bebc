//! Site entity model
//!
//! A physical location owned by exactly one customer for its lifetime.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sites")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Identifier carried in `<SiteID>` (unique across all customers)
    #[sea_orm(unique)]
    pub external_id: String,

    /// Owning customer; never repointed
    pub customer_id: Uuid,

    pub name: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::probe::Entity")]
    Probes,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::probe::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Probes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
