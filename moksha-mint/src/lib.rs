pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod lightning;
pub mod mint;
pub mod model;
pub mod routes;
pub mod server;
pub mod url_serialize;
pub mod verification;

pub use mint::{Mint, MintBuilder};
