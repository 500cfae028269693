pub mod admin;
pub mod backend;
pub mod calendar;
pub mod catalog;
pub mod config;
pub mod error;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
