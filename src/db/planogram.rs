//! Planogram repository: slot-to-product mapping and stock levels.

use sea_orm::sea_query::Expr;
use sea_orm::*;

use crate::entities::{planogram, prelude::*};

/// Replace the whole planogram with a fresh copy from the cloud.
pub async fn replace_all(
    db: &DatabaseConnection,
    rows: Vec<planogram::Model>,
) -> Result<usize, DbErr> {
    let txn = db.begin().await?;
    Planogram::delete_many().exec(&txn).await?;
    let count = rows.len();
    for row in rows {
        planogram::ActiveModel {
            slot_number: Set(row.slot_number),
            vending_machine_id: Set(row.vending_machine_id),
            product_id: Set(row.product_id),
            product_name: Set(row.product_name),
            product_price: Set(row.product_price),
            quantity: Set(row.quantity),
            status: Set(row.status),
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;
    Ok(count)
}

/// Look up the product loaded in a slot.
pub async fn get_by_slot(
    db: &DatabaseConnection,
    slot_number: i32,
) -> Result<Option<planogram::Model>, DbErr> {
    Planogram::find_by_id(slot_number).one(db).await
}

/// All slots, ordered by slot number.
pub async fn list(db: &DatabaseConnection) -> Result<Vec<planogram::Model>, DbErr> {
    Planogram::find()
        .order_by_asc(planogram::Column::SlotNumber)
        .all(db)
        .await
}

/// Decrement local stock for a slot after a dispense. Stock never goes
/// below zero even if the planogram is stale.
pub async fn decrement_stock(
    db: &DatabaseConnection,
    slot_number: i32,
    quantity: i32,
) -> Result<(), DbErr> {
    Planogram::update_many()
        .col_expr(
            planogram::Column::Quantity,
            Expr::col(planogram::Column::Quantity).sub(quantity),
        )
        .filter(planogram::Column::SlotNumber.eq(slot_number))
        .filter(planogram::Column::Quantity.gte(quantity))
        .exec(db)
        .await?;
    Ok(())
}
