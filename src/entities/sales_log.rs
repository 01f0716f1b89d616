use sea_orm::entity::prelude::*;

/// Local sales ledger; `sync` flips to 1 once the row reaches the cloud.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sales_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub vending_machine_id: String,
    pub slot_number: i32,
    pub product_id: String,
    pub quantity: i32,
    pub sold_at: DateTimeUtc,
    pub unit_price: f64,
    pub status: String,
    pub sync: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
