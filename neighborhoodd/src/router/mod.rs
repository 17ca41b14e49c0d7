pub mod client;
pub mod soap;

pub use client::{RouterClient, RouterError, RouterHost};
