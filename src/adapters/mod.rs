//! Adapters: concrete implementations of the domain ports.

pub mod executors;
pub mod sqlite;
