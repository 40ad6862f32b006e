pub mod api;
pub mod config;
pub mod conversation;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod observability;
pub mod operators;
pub mod session;
pub mod state;
pub mod store;
pub mod validation;
