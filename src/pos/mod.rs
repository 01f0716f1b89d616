mod client;
pub mod messages;

pub use client::{PosClient, PosError};
pub use messages::{FullResponse, PosRequest, PosResponse, RequestType, ResponseType};
