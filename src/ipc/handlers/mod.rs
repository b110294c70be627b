pub mod assignments;
pub mod config;
pub mod core;
pub mod reports;
pub mod session;
pub mod teachers;
