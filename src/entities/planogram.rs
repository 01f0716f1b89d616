use sea_orm::entity::prelude::*;
use serde::Serialize;

/// One machine slot and the product currently loaded in it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "planogram")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub slot_number: i32,
    pub vending_machine_id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_price: f64,
    pub quantity: i32,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
