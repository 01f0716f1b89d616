pub mod planogram;
pub mod prelude;
pub mod sales_log;
pub mod transaction_log;
