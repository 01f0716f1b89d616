pub mod board;
pub mod checkout;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod http;
pub mod ledger;
pub mod models;
pub mod pos;
pub mod sync;

pub use error::{AppError, Result};
