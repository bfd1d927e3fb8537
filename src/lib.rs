pub mod aggregate;
pub mod config;
pub mod error;
pub mod names;
pub mod persist;
pub mod query;
pub mod record;
pub mod selection;
pub mod stats;
