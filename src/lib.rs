pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod service;
pub mod store;
pub mod trade;
pub mod transfer;
pub mod types;
pub mod utils;
pub mod witness;
