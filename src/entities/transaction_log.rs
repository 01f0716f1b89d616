use sea_orm::entity::prelude::*;

/// Per-unit dispense record tied to a payment track id.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transaction_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub track_id: String,
    pub vending_machine_id: String,
    pub product: String,
    pub status: String,
    pub error: Option<String>,
    pub recorded_at: DateTimeUtc,
    pub sync: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
