// Public API for integration tests and potential library usage

pub mod abuse;
pub mod api;
pub mod auth;
pub mod catalogue;
pub mod config;
pub mod ledger;
pub mod protocol;
pub mod session;
pub mod state;
pub mod store;
pub mod types;
pub mod window;
pub mod ws;

// Background pollers
pub mod broadcast;
