//! Maintenance for a face recognition index: marker repair, face
//! clustering and matching, and purging of orphaned rows.

pub mod config;
pub mod db;
pub mod faces;
pub mod logging;
pub mod purge;
pub mod tasks;

pub use config::Config;
pub use db::Database;
