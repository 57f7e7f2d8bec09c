//! Startup work specific to the Civic application.

pub mod operations;
pub mod tasks;
