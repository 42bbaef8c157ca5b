//! Ripple chat server library
//!
//! Exposes the persistence, service, HTTP and gateway components so
//! integration tests can drive them directly.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod http;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use db::Database;
pub use error::{ChatError, ChatResult};
pub use state::AppState;
