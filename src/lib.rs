pub mod auth;
pub mod codes;
pub mod config;
pub mod error;
pub mod models;
pub mod openapi;
pub mod rate_limit; // failed-login throttle
pub mod registry;
pub mod repo;
pub mod routes;
pub mod seed;
pub mod storage; // document files
pub mod visibility;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
