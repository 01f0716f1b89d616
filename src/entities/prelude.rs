pub use super::planogram::Entity as Planogram;
pub use super::sales_log::Entity as SalesLog;
pub use super::transaction_log::Entity as TransactionLog;
