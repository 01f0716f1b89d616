pub mod connection;
pub mod planogram;
pub mod sales;

pub use connection::{connect, init_schema};
