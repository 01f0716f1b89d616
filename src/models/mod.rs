//! Data models for orders, dispense results, and sale records.

pub mod order;
pub mod sale;

pub use order::{DispenseResult, DispenseStatus, LineItem, order_summary};
pub use sale::{CreateSale, TransactionRecord};
