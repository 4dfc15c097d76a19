pub mod app;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod tenancy;

pub use app::app;
pub use error::ApiError;
pub use state::{AppState, RequestSettings};

#[cfg(test)]
pub mod testing;
