//! Sales and transaction log repository.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use uuid::Uuid;

use crate::entities::{prelude::*, sales_log, transaction_log};
use crate::models::{CreateSale, DispenseResult};

/// Insert one sale row, unsynced.
pub async fn insert_sale(
    db: &DatabaseConnection,
    sale: &CreateSale,
) -> Result<sales_log::Model, DbErr> {
    sales_log::ActiveModel {
        id: Set(sale.id.to_string()),
        vending_machine_id: Set(sale.vending_machine_id.clone()),
        slot_number: Set(i32::from(sale.slot_number)),
        product_id: Set(sale.product_id.clone()),
        quantity: Set(sale.quantity as i32),
        sold_at: Set(sale.sold_at),
        unit_price: Set(sale.unit_price),
        status: Set(sale.status.clone()),
        sync: Set(0),
    }
    .insert(db)
    .await
}

/// Sales not yet pushed to the cloud, oldest first.
pub async fn unsynced_sales(db: &DatabaseConnection) -> Result<Vec<sales_log::Model>, DbErr> {
    SalesLog::find()
        .filter(sales_log::Column::Sync.eq(0))
        .order_by_asc(sales_log::Column::SoldAt)
        .all(db)
        .await
}

/// Flag a sale as synced once the cloud accepted it.
pub async fn mark_sale_synced(db: &DatabaseConnection, id: &str) -> Result<(), DbErr> {
    SalesLog::update_many()
        .col_expr(sales_log::Column::Sync, Expr::value(1))
        .filter(sales_log::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

/// Record one per-unit dispense result against its track id.
pub async fn insert_transaction(
    db: &DatabaseConnection,
    machine_id: &str,
    result: &DispenseResult,
) -> Result<transaction_log::Model, DbErr> {
    transaction_log::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        track_id: Set(result.track_id.clone()),
        vending_machine_id: Set(machine_id.to_string()),
        product: Set(result.product.clone()),
        status: Set(result.status.as_str().to_string()),
        error: Set(result.error.clone()),
        recorded_at: Set(Utc::now()),
        sync: Set(0),
    }
    .insert(db)
    .await
}

/// Transaction rows not yet pushed to the cloud.
pub async fn unsynced_transactions(
    db: &DatabaseConnection,
) -> Result<Vec<transaction_log::Model>, DbErr> {
    TransactionLog::find()
        .filter(transaction_log::Column::Sync.eq(0))
        .order_by_asc(transaction_log::Column::RecordedAt)
        .all(db)
        .await
}

pub async fn mark_transaction_synced(db: &DatabaseConnection, id: &str) -> Result<(), DbErr> {
    TransactionLog::update_many()
        .col_expr(transaction_log::Column::Sync, Expr::value(1))
        .filter(transaction_log::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}
