//! Port traits the domain depends on.

pub mod account_store;
pub mod config_port;
